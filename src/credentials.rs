use std::fmt;
use std::path::Path;

use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;

use crate::config::{env_bool, env_string};
use crate::error::{CopyError, CopyResult};
use crate::tls::{self, SslSetting, TlsConfig, TlsOverrides};

fn default_port() -> u16 {
    5432
}

/// Connection credentials supplied by the hosting engine.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub ssl: Option<SslSetting>,
    #[serde(default)]
    pub allow_unauthorized_certs: bool,
    #[serde(default)]
    pub ignore_ssl_issues: bool,
    #[serde(default)]
    pub reject_unauthorized: Option<bool>,
}

impl Credentials {
    /// Load credentials from the standard libpq environment variables.
    pub fn from_env() -> CopyResult<Self> {
        let port = match env_string("PGPORT") {
            Some(value) => value
                .parse::<u16>()
                .map_err(|_| CopyError::Config(format!("PGPORT is not a valid port: {value}")))?,
            None => default_port(),
        };
        let ssl = env_string("PGSSL").map(|value| match value.to_ascii_lowercase().as_str() {
            "true" | "1" => SslSetting::Flag(true),
            "false" | "0" => SslSetting::Flag(false),
            _ => SslSetting::Mode(value),
        });
        let reject_unauthorized = env_string("PGSSL_REJECT_UNAUTHORIZED")
            .map(|_| env_bool("PGSSL_REJECT_UNAUTHORIZED", true));

        Ok(Self {
            host: env_string("PGHOST").unwrap_or_else(|| "localhost".into()),
            port,
            database: env_string("PGDATABASE").unwrap_or_else(|| "postgres".into()),
            user: env_string("PGUSER").unwrap_or_else(|| "postgres".into()),
            password: env_string("PGPASSWORD").unwrap_or_default(),
            ssl,
            allow_unauthorized_certs: false,
            ignore_ssl_issues: false,
            reject_unauthorized,
        })
    }

    pub fn from_file(path: &Path) -> CopyResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn tls(&self) -> TlsConfig {
        let overrides = TlsOverrides {
            allow_unauthorized_certs: self.allow_unauthorized_certs,
            ignore_ssl_issues: self.ignore_ssl_issues,
            reject_unauthorized: self.reject_unauthorized,
        };
        tls::normalize(self.ssl.as_ref(), &overrides)
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
            .ssl_mode(self.tls().ssl_mode())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("ssl", &self.ssl)
            .finish()
    }
}
