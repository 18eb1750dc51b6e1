use std::env;
use std::time::Duration;

/// Default deadline applied to every COPY transfer.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default size of each chunk piped into a COPY FROM stream.
pub const DEFAULT_CHUNK_BYTES: usize = 64 * 1024;

pub(crate) fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

pub(crate) fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

pub(crate) fn env_duration_millis(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

pub(crate) fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

/// Runtime tuning for COPY transfers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyConfig {
    /// Hard deadline for each individual export or import.
    pub timeout: Duration,
    /// Bytes read from the import source per send.
    pub chunk_size: usize,
    /// Verify the import target exists before opening a transaction.
    pub check_table: bool,
}

impl CopyConfig {
    pub fn from_env() -> Self {
        Self {
            timeout: env_duration_millis("PGCOPY_TIMEOUT_MS", DEFAULT_TIMEOUT),
            chunk_size: env_usize("PGCOPY_CHUNK_BYTES", DEFAULT_CHUNK_BYTES),
            check_table: env_bool("PGCOPY_CHECK_TABLE", true),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_table_check(mut self, check_table: bool) -> Self {
        self.check_table = check_table;
        self
    }
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
