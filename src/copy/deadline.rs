use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, timeout_at};

use super::request::Direction;
use crate::error::{CopyError, CopyResult};

/// Wall-clock limit for a single COPY transfer.
///
/// The deadline is fixed when it is created. The transfer and the timer
/// race; whichever loses is dropped. Dropping a transfer future drops the
/// COPY stream or sink it owns. The connection underneath is then in an
/// unknown protocol state and callers must discard it rather than reuse it.
/// Cleanup that follows a failed transfer is bounded by the same expiry
/// through [`Deadline::within`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    direction: Direction,
    duration: Duration,
    expires_at: Instant,
}

impl Deadline {
    pub fn new(direction: Direction, duration: Duration) -> Self {
        Self {
            direction,
            duration,
            expires_at: Instant::now() + duration,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    pub async fn guard<F, T>(&self, transfer: F) -> CopyResult<T>
    where
        F: Future<Output = CopyResult<T>>,
    {
        match timeout_at(self.expires_at, transfer).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!(
                    "copy {}: transfer timed out after {:?}, stream dropped",
                    self.direction,
                    self.duration
                );
                Err(CopyError::Timeout {
                    direction: self.direction,
                    duration: self.duration,
                })
            }
        }
    }

    /// Run `step` until the deadline; `None` when it expires first.
    pub async fn within<F>(&self, step: F) -> Option<F::Output>
    where
        F: Future,
    {
        timeout_at(self.expires_at, step).await.ok()
    }
}
