//! COPY TO: drains a query result into memory.

use std::time::Instant;

use futures_util::StreamExt;

use super::connection::CopyConnection;
use super::deadline::Deadline;
use super::request::{Direction, ExportOutcome, ExportRequest};
use crate::config::CopyConfig;
use crate::error::{CopyError, CopyResult};

/// Completion state of a COPY stream.
///
/// Draining stops at the first error, so nothing observed afterwards (an end
/// signal included) can turn the transfer into a success.
#[derive(Debug, Default)]
enum StreamState {
    #[default]
    Pending,
    Errored(sqlx::Error),
}

impl StreamState {
    fn is_errored(&self) -> bool {
        matches!(self, StreamState::Errored(_))
    }

    fn complete(self) -> Result<(), sqlx::Error> {
        match self {
            StreamState::Pending => Ok(()),
            StreamState::Errored(err) => Err(err),
        }
    }
}

/// Counts newline-terminated records as chunks arrive.
///
/// Quoted fields with embedded newlines count as extra records.
#[derive(Debug, Default, Clone, Copy)]
struct RowCounter {
    newlines: u64,
}

impl RowCounter {
    fn observe(&mut self, chunk: &[u8]) {
        self.newlines += chunk.iter().filter(|byte| **byte == b'\n').count() as u64;
    }

    fn rows(&self, header: bool) -> u64 {
        if header && self.newlines > 0 {
            self.newlines - 1
        } else {
            self.newlines
        }
    }
}

struct Drained {
    payload: Vec<u8>,
    rows: RowCounter,
}

/// Run `COPY (query) TO STDOUT` and collect the output.
pub async fn run_export<C>(
    conn: &mut C,
    request: &ExportRequest,
    config: &CopyConfig,
) -> CopyResult<ExportOutcome>
where
    C: CopyConnection + ?Sized,
{
    let command = request.command();
    log::debug!("copy to: {}", command);

    let started = Instant::now();
    let deadline = Deadline::new(Direction::Export, config.timeout);
    let drained = match deadline.guard(drain(conn, &command)).await {
        Ok(drained) => drained,
        Err(err) => {
            // A failed or abandoned COPY OUT leaves unread protocol messages.
            conn.discard("copy to did not complete");
            return Err(err);
        }
    };

    let row_count = drained.rows.rows(request.dialect.header);
    let outcome = ExportOutcome {
        row_count,
        byte_size: drained.payload.len() as u64,
        elapsed: started.elapsed(),
        payload: drained.payload,
    };

    log::info!(
        "copy to: exported {} rows ({} bytes) in {}ms",
        outcome.row_count,
        outcome.byte_size,
        outcome.elapsed_ms()
    );
    Ok(outcome)
}

async fn drain<C>(conn: &mut C, command: &str) -> CopyResult<Drained>
where
    C: CopyConnection + ?Sized,
{
    let mut stream = conn.copy_out(command).await.map_err(|err| {
        log::warn!("copy to: failed to open stream: {}", err);
        CopyError::export_init(err)
    })?;

    let mut state = StreamState::default();
    let mut payload = Vec::new();
    let mut rows = RowCounter::default();

    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                rows.observe(&chunk);
                payload.extend_from_slice(&chunk);
            }
            Err(err) => {
                state = StreamState::Errored(err);
                break;
            }
        }
    }
    drop(stream);

    if state.is_errored() {
        log::warn!(
            "copy to: stream failed after {} bytes, discarding partial output",
            payload.len()
        );
    }
    state.complete().map_err(CopyError::export_failed)?;

    Ok(Drained { payload, rows })
}
