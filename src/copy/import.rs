//! COPY FROM: streams a byte source into a table inside a transaction.

use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt};

use super::connection::CopyConnection;
use super::deadline::Deadline;
use super::request::{Direction, ImportOutcome, ImportRequest};
use crate::config::CopyConfig;
use crate::error::{CopyError, CopyResult, FailureDetail};

/// Run `COPY table FROM STDIN`, committing unless the request is a dry run.
///
/// The transfer is all-or-nothing: any failure on either side of the pipe
/// rolls the transaction back. On timeout no `ROLLBACK` is queued behind the
/// stalled COPY; the connection is discarded and the server aborts the
/// transaction when the session ends. `rows_imported` is never reported.
pub async fn run_import<C, R>(
    conn: &mut C,
    request: &ImportRequest,
    source: R,
    config: &CopyConfig,
) -> CopyResult<ImportOutcome>
where
    C: CopyConnection + ?Sized,
    R: AsyncRead + Unpin + Send,
{
    let command = request.command();
    log::debug!("copy from: {}", command);

    if config.check_table {
        let exists = conn
            .relation_exists(&request.table)
            .await
            .map_err(CopyError::import_failed)?;
        if !exists {
            log::warn!("copy from: target table {} not found", request.table);
            return Err(CopyError::ImportFailed(FailureDetail::missing_table(
                "COPY FROM",
                &request.table,
            )));
        }
    }

    let started = Instant::now();
    conn.execute("BEGIN")
        .await
        .map_err(CopyError::import_failed)?;

    let deadline = Deadline::new(Direction::Import, config.timeout);
    let byte_size = match deadline
        .guard(pipe(conn, &command, source, config.chunk_size))
        .await
    {
        Ok(sent) => sent,
        Err(err) if err.is_timeout() => {
            conn.discard("copy from timed out");
            return Err(err);
        }
        Err(err) => {
            rollback(conn, &deadline).await;
            return Err(err);
        }
    };

    let committed = if request.dry_run {
        conn.execute("ROLLBACK")
            .await
            .map_err(CopyError::import_failed)?;
        log::info!("copy from: dry run into {} rolled back", request.table);
        false
    } else {
        if let Err(err) = conn.execute("COMMIT").await {
            rollback(conn, &deadline).await;
            return Err(CopyError::import_failed(err));
        }
        true
    };

    let outcome = ImportOutcome {
        rows_imported: None,
        byte_size,
        elapsed: started.elapsed(),
        committed,
    };
    log::info!(
        "copy from: piped {} bytes into {} in {}ms (committed: {})",
        outcome.byte_size,
        request.table,
        outcome.elapsed_ms(),
        outcome.committed
    );
    Ok(outcome)
}

async fn pipe<C, R>(
    conn: &mut C,
    command: &str,
    mut source: R,
    chunk_size: usize,
) -> CopyResult<u64>
where
    C: CopyConnection + ?Sized,
    R: AsyncRead + Unpin + Send,
{
    let mut sink = conn
        .copy_in(command)
        .await
        .map_err(CopyError::import_failed)?;

    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut sent = 0u64;
    loop {
        let read = match source.read(&mut buffer).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) => {
                log::warn!("copy from: source read failed after {} bytes: {}", sent, err);
                if let Err(abort_err) = sink.abort(&err.to_string()).await {
                    log::debug!("copy from: abort after source failure: {}", abort_err);
                }
                return Err(CopyError::import_failed(err));
            }
        };

        sink.send(&buffer[..read]).await.map_err(|err| {
            log::warn!("copy from: destination failed after {} bytes: {}", sent, err);
            CopyError::import_failed(err)
        })?;
        sent += read as u64;
    }

    sink.finish().await.map_err(CopyError::import_failed)?;
    Ok(sent)
}

/// Best-effort `ROLLBACK`, bounded by the transfer deadline.
///
/// A rollback that fails or does not finish in time leaves the session in an
/// unknown state, so the connection is discarded instead.
async fn rollback<C>(conn: &mut C, deadline: &Deadline)
where
    C: CopyConnection + ?Sized,
{
    match deadline.within(conn.execute("ROLLBACK")).await {
        Some(Ok(())) => {}
        Some(Err(err)) => {
            log::warn!("copy from: rollback failed: {}", err);
            conn.discard("rollback failed");
        }
        None => {
            log::warn!("copy from: rollback did not finish before the deadline");
            conn.discard("rollback timed out");
        }
    }
}
