use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::postgres::PgSslMode;

/// String modes that never force TLS on.
const DISABLED_MODES: [&str; 5] = ["disable", "off", "false", "allow", "prefer"];

/// Raw `ssl` credential value as stored by the hosting engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SslSetting {
    Flag(bool),
    Mode(String),
    Options(Map<String, Value>),
}

/// Credential flags that switch off certificate verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TlsOverrides {
    pub allow_unauthorized_certs: bool,
    pub ignore_ssl_issues: bool,
    pub reject_unauthorized: Option<bool>,
}

impl TlsOverrides {
    fn skips_verification(&self) -> bool {
        self.allow_unauthorized_certs
            || self.ignore_ssl_issues
            || self.reject_unauthorized == Some(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsConfig {
    Disabled,
    Enabled { verify_certificate: bool },
}

impl TlsConfig {
    pub fn ssl_mode(&self) -> PgSslMode {
        match self {
            TlsConfig::Disabled => PgSslMode::Disable,
            TlsConfig::Enabled {
                verify_certificate: true,
            } => PgSslMode::VerifyFull,
            TlsConfig::Enabled {
                verify_certificate: false,
            } => PgSslMode::Require,
        }
    }
}

/// Map a credential `ssl` value plus override flags to a TLS decision.
pub fn normalize(setting: Option<&SslSetting>, overrides: &TlsOverrides) -> TlsConfig {
    let skip = overrides.skips_verification();
    match setting {
        None | Some(SslSetting::Flag(false)) => TlsConfig::Disabled,
        Some(SslSetting::Flag(true)) => TlsConfig::Enabled {
            verify_certificate: !skip,
        },
        Some(SslSetting::Mode(mode)) => {
            let mode = mode.trim().to_ascii_lowercase();
            if DISABLED_MODES.contains(&mode.as_str()) {
                TlsConfig::Disabled
            } else {
                TlsConfig::Enabled {
                    verify_certificate: !skip,
                }
            }
        }
        Some(SslSetting::Options(options)) => {
            let requested = options
                .get("rejectUnauthorized")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            TlsConfig::Enabled {
                verify_certificate: !skip && requested,
            }
        }
    }
}
