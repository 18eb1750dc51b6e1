use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use pgcopy::copy::{CopyDialect, Format, ImportRequest, run_import};
use pgcopy::test_support::{ScriptedConnection, SinkBehaviour};
use pgcopy::{CopyConfig, CopyError};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::Instant;

const SAMPLE_CSV: &[u8] = b"id,name\n1,Alice\n2,Bob\n";
const COPY_PEOPLE: &str = "COPY people FROM STDIN WITH (FORMAT CSV, DELIMITER ',', HEADER)";

fn config() -> CopyConfig {
    CopyConfig {
        timeout: Duration::from_secs(30),
        chunk_size: 4,
        check_table: true,
    }
}

fn request() -> ImportRequest {
    ImportRequest::new("people", CopyDialect::new(Format::Csv, "").with_header(true))
}

/// Serves a few bytes, then fails like a truncated upload.
struct TruncatedUpload {
    served: bool,
}

impl AsyncRead for TruncatedUpload {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.served {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "upload truncated",
            )));
        }
        self.served = true;
        buf.put_slice(b"id,");
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn commits_successful_import() {
    let mut conn = ScriptedConnection::new();
    let seen = conn.observe();

    let outcome = run_import(&mut conn, &request(), SAMPLE_CSV, &config())
        .await
        .expect("import succeeds");

    assert!(outcome.committed);
    assert_eq!(outcome.rows_imported, None);
    assert_eq!(outcome.byte_size, SAMPLE_CSV.len() as u64);
    assert_eq!(seen.received(), SAMPLE_CSV);
    assert!(seen.sink_finished());
    assert_eq!(
        seen.statements(),
        vec![
            "to_regclass(people)".to_string(),
            "BEGIN".to_string(),
            COPY_PEOPLE.to_string(),
            "COMMIT".to_string(),
        ]
    );
}

#[tokio::test]
async fn dry_run_rolls_back_instead_of_committing() {
    let mut conn = ScriptedConnection::new();
    let seen = conn.observe();

    let outcome = run_import(&mut conn, &request().with_dry_run(true), SAMPLE_CSV, &config())
        .await
        .expect("dry run succeeds");

    assert!(!outcome.committed);
    assert!(seen.executed("ROLLBACK"));
    assert!(!seen.executed("COMMIT"));
    assert_eq!(seen.received(), SAMPLE_CSV);
}

#[tokio::test]
async fn column_list_is_sent_in_mapping_order() {
    let mut conn = ScriptedConnection::new();
    let seen = conn.observe();
    let request = request().with_columns(["name", "", "id"]);

    run_import(&mut conn, &request, SAMPLE_CSV, &config())
        .await
        .expect("import succeeds");

    assert!(seen.executed(
        "COPY people (name, id) FROM STDIN WITH (FORMAT CSV, DELIMITER ',', HEADER)"
    ));
}

#[tokio::test]
async fn destination_failure_mid_pipe_rolls_back() {
    let mut conn = ScriptedConnection::new().with_copy_in(SinkBehaviour::FailAfter {
        bytes: 4,
        message: "extra data after last expected column".to_string(),
    });
    let seen = conn.observe();

    let err = run_import(&mut conn, &request(), SAMPLE_CSV, &config())
        .await
        .expect_err("import must fail");

    assert!(matches!(err, CopyError::ImportFailed(_)));
    assert!(err.to_string().contains("extra data after last expected column"));
    assert!(seen.executed("ROLLBACK"));
    assert!(!seen.executed("COMMIT"));
    assert!(!seen.discarded());
    assert_eq!(seen.received(), b"id,n");
    assert!(seen.sink_dropped());
    assert!(!seen.sink_finished());
}

#[tokio::test]
async fn failure_reported_at_finish_rolls_back() {
    let mut conn = ScriptedConnection::new().with_copy_in(SinkBehaviour::FailOnFinish(
        "invalid input syntax for type integer: \"x\"".to_string(),
    ));
    let seen = conn.observe();

    let err = run_import(&mut conn, &request(), SAMPLE_CSV, &config())
        .await
        .expect_err("import must fail");

    assert!(matches!(err, CopyError::ImportFailed(_)));
    assert!(seen.executed("ROLLBACK"));
    assert!(!seen.executed("COMMIT"));
}

#[tokio::test]
async fn source_failure_aborts_copy_and_rolls_back() {
    let mut conn = ScriptedConnection::new();
    let seen = conn.observe();

    let err = run_import(&mut conn, &request(), TruncatedUpload { served: false }, &config())
        .await
        .expect_err("import must fail");

    assert!(matches!(err, CopyError::ImportFailed(_)));
    assert!(err.to_string().contains("upload truncated"));
    assert!(seen.sink_aborted());
    assert!(seen.executed("ROLLBACK"));
    assert!(!seen.executed("COMMIT"));
}

#[tokio::test]
async fn missing_table_fails_before_transaction() {
    let mut conn = ScriptedConnection::new().with_missing_table();
    let seen = conn.observe();

    let err = run_import(&mut conn, &request(), SAMPLE_CSV, &config())
        .await
        .expect_err("import must fail");

    assert!(err.is_missing_relation());
    assert!(err.to_string().contains("Table does not exist: people"));
    assert_eq!(seen.statements(), vec!["to_regclass(people)".to_string()]);
}

#[tokio::test]
async fn preflight_can_be_disabled() {
    let mut conn = ScriptedConnection::new();
    let seen = conn.observe();

    run_import(
        &mut conn,
        &request(),
        SAMPLE_CSV,
        &config().with_table_check(false),
    )
    .await
    .expect("import succeeds");

    assert_eq!(seen.statements()[0], "BEGIN");
}

#[tokio::test]
async fn missing_column_on_open_is_tagged_and_rolled_back() {
    let mut conn = ScriptedConnection::new()
        .with_copy_in_error("column \"nme\" of relation \"people\" does not exist");
    let seen = conn.observe();

    let err = run_import(&mut conn, &request(), SAMPLE_CSV, &config())
        .await
        .expect_err("import must fail");

    assert!(matches!(err, CopyError::ImportFailed(_)));
    assert!(err.is_missing_relation());
    assert!(seen.executed("ROLLBACK"));
}

#[tokio::test]
async fn rollback_failure_does_not_mask_original_error() {
    let mut conn = ScriptedConnection::new()
        .with_copy_in(SinkBehaviour::FailAfter {
            bytes: 0,
            message: "duplicate key value violates unique constraint".to_string(),
        })
        .failing_statement("ROLLBACK", "server closed the connection unexpectedly");

    let err = run_import(&mut conn, &request(), SAMPLE_CSV, &config())
        .await
        .expect_err("import must fail");

    assert!(err.to_string().contains("duplicate key value"));
    assert!(!err.to_string().contains("server closed"));
}

#[tokio::test]
async fn commit_failure_is_an_import_failure() {
    let mut conn = ScriptedConnection::new()
        .failing_statement("COMMIT", "could not serialize access");
    let seen = conn.observe();

    let err = run_import(&mut conn, &request(), SAMPLE_CSV, &config())
        .await
        .expect_err("commit must fail");

    assert!(matches!(err, CopyError::ImportFailed(_)));
    assert!(err.to_string().contains("could not serialize access"));
    assert!(seen.executed("ROLLBACK"));
}

#[tokio::test(start_paused = true)]
async fn stalled_destination_times_out_and_discards_connection() {
    let mut conn = ScriptedConnection::new().with_copy_in(SinkBehaviour::Hang);
    let seen = conn.observe();

    let err = run_import(&mut conn, &request(), SAMPLE_CSV, &config())
        .await
        .expect_err("import must time out");

    assert!(err.is_timeout());
    assert_eq!(err.to_string(), "COPY FROM timeout after 30s");
    assert!(seen.sink_dropped());
    assert!(seen.discarded());
    assert!(!seen.executed("ROLLBACK"));
    assert!(!seen.executed("COMMIT"));
}

#[tokio::test(start_paused = true)]
async fn timeout_returns_on_time_when_rollback_would_block() {
    let mut conn = ScriptedConnection::new()
        .with_copy_in(SinkBehaviour::Hang)
        .hanging_statement("ROLLBACK");
    let seen = conn.observe();
    let started = Instant::now();

    let result = tokio::time::timeout(
        Duration::from_secs(60),
        run_import(&mut conn, &request(), SAMPLE_CSV, &config()),
    )
    .await
    .expect("import returns within its own deadline");

    assert!(result.expect_err("import must time out").is_timeout());
    assert!(started.elapsed() < Duration::from_secs(31));
    assert!(seen.discarded());
}

#[tokio::test(start_paused = true)]
async fn blocked_rollback_is_bounded_by_the_deadline() {
    let mut conn = ScriptedConnection::new()
        .with_copy_in(SinkBehaviour::FailAfter {
            bytes: 0,
            message: "deadlock detected".to_string(),
        })
        .hanging_statement("ROLLBACK");
    let seen = conn.observe();
    let started = Instant::now();

    let result = tokio::time::timeout(
        Duration::from_secs(60),
        run_import(&mut conn, &request(), SAMPLE_CSV, &config()),
    )
    .await
    .expect("import returns within its own deadline");

    let err = result.expect_err("import must fail");
    assert!(matches!(err, CopyError::ImportFailed(_)));
    assert!(err.to_string().contains("deadlock detected"));
    assert!(started.elapsed() < Duration::from_secs(31));
    assert!(seen.executed("ROLLBACK"));
    assert_eq!(seen.discard_reasons(), vec!["rollback timed out".to_string()]);
}

#[tokio::test]
async fn failed_rollback_discards_connection() {
    let mut conn = ScriptedConnection::new()
        .with_copy_in(SinkBehaviour::FailOnFinish("bad row".to_string()))
        .failing_statement("ROLLBACK", "server closed the connection unexpectedly");
    let seen = conn.observe();

    run_import(&mut conn, &request(), SAMPLE_CSV, &config())
        .await
        .expect_err("import must fail");
    assert_eq!(seen.discard_reasons(), vec!["rollback failed".to_string()]);

    let err = run_import(&mut conn, &request(), SAMPLE_CSV, &config())
        .await
        .expect_err("discarded connection is unusable");
    assert!(err.to_string().contains("connection already released"));
}
