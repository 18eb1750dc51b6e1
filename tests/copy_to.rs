use std::time::Duration;

use pgcopy::copy::{CopyDialect, ExportRequest, Format, run_export};
use pgcopy::test_support::{ScriptedConnection, StreamEvent};
use pgcopy::{CopyConfig, CopyError};

fn config() -> CopyConfig {
    CopyConfig {
        timeout: Duration::from_secs(30),
        chunk_size: 4,
        check_table: true,
    }
}

fn request(header: bool) -> ExportRequest {
    ExportRequest::new(
        "SELECT id, name FROM people",
        CopyDialect::new(Format::Csv, "").with_header(header),
    )
}

#[tokio::test]
async fn exports_payload_and_counts_rows() {
    let mut conn = ScriptedConnection::new()
        .with_copy_out(vec![StreamEvent::chunk("col\n1\n"), StreamEvent::End]);
    let seen = conn.observe();

    let outcome = run_export(&mut conn, &request(true), &config())
        .await
        .expect("export succeeds");

    assert_eq!(outcome.row_count, 1);
    assert_eq!(outcome.payload, b"col\n1\n");
    assert_eq!(outcome.byte_size, 6);
    assert!(!seen.discarded());
    assert_eq!(
        seen.statements(),
        vec![
            "COPY (SELECT id, name FROM people) TO STDOUT WITH (FORMAT CSV, DELIMITER ',', HEADER)"
                .to_string()
        ]
    );
    assert!(seen.stream_dropped());
}

#[tokio::test]
async fn header_row_is_excluded_from_count() {
    let events = vec![
        StreamEvent::chunk("a,b\n1,"),
        StreamEvent::chunk("2\n3,4\n"),
        StreamEvent::End,
    ];

    let mut conn = ScriptedConnection::new().with_copy_out(events.clone());
    let with_header = run_export(&mut conn, &request(true), &config())
        .await
        .expect("export with header");
    assert_eq!(with_header.row_count, 2);

    let mut conn = ScriptedConnection::new().with_copy_out(events);
    let without_header = run_export(&mut conn, &request(false), &config())
        .await
        .expect("export without header");
    assert_eq!(without_header.row_count, 3);
    assert_eq!(without_header.payload, b"a,b\n1,2\n3,4\n");
}

#[tokio::test]
async fn empty_result_reports_zero_rows() {
    let mut conn = ScriptedConnection::new().with_copy_out(vec![StreamEvent::End]);
    let outcome = run_export(&mut conn, &request(true), &config())
        .await
        .expect("export succeeds");
    assert_eq!(outcome.row_count, 0);
    assert!(outcome.payload.is_empty());
}

#[tokio::test]
async fn error_after_partial_data_rejects() {
    let mut conn = ScriptedConnection::new().with_copy_out(vec![
        StreamEvent::chunk("id,name\n"),
        StreamEvent::chunk("1,Alice\n"),
        StreamEvent::error("connection reset by peer"),
    ]);

    let err = run_export(&mut conn, &request(true), &config())
        .await
        .expect_err("export must fail");

    assert!(matches!(err, CopyError::ExportFailed(_)));
    assert!(err.to_string().contains("connection reset by peer"));
    assert!(!err.is_missing_relation());
}

#[tokio::test]
async fn failed_export_discards_connection() {
    let mut conn = ScriptedConnection::new()
        .with_copy_out_error("relation \"transaction\" does not exist");
    let seen = conn.observe();

    run_export(&mut conn, &request(true), &config())
        .await
        .expect_err("export must fail");
    assert_eq!(seen.discard_reasons(), vec!["copy to did not complete".to_string()]);

    let err = run_export(&mut conn, &request(true), &config())
        .await
        .expect_err("discarded connection is unusable");
    assert!(matches!(err, CopyError::ExportInit(_)));
    assert!(err.to_string().contains("connection already released"));
    assert_eq!(seen.statements().len(), 1);
}

#[tokio::test]
async fn error_followed_by_end_still_rejects() {
    let mut conn = ScriptedConnection::new().with_copy_out(vec![
        StreamEvent::error("query failed"),
        StreamEvent::End,
    ]);

    let err = run_export(&mut conn, &request(true), &config())
        .await
        .expect_err("error must win over end");

    assert!(matches!(err, CopyError::ExportFailed(_)));
    assert!(err.to_string().contains("query failed"));
}

#[tokio::test]
async fn stream_error_for_missing_relation_is_tagged() {
    let mut conn = ScriptedConnection::new().with_copy_out(vec![
        StreamEvent::error("relation \"transaction\" does not exist"),
        StreamEvent::End,
    ]);

    let err = run_export(&mut conn, &request(true), &config())
        .await
        .expect_err("export must fail");

    assert!(err.is_missing_relation());
    assert!(err.to_string().starts_with("Table or column does not exist:"));
}

#[tokio::test]
async fn open_failure_is_an_init_error() {
    let mut conn = ScriptedConnection::new()
        .with_copy_out_error("column \"nme\" does not exist");

    let err = run_export(&mut conn, &request(true), &config())
        .await
        .expect_err("open must fail");

    match &err {
        CopyError::ExportInit(detail) => {
            assert!(detail.missing_relation);
            assert!(detail.message.contains("column \"nme\" does not exist"));
        }
        other => panic!("expected init error, got {other:?}"),
    }
}

#[tokio::test]
async fn syntax_error_on_open_is_not_missing_relation() {
    let mut conn =
        ScriptedConnection::new().with_copy_out_error("syntax error at or near \"SELEC\"");

    let err = run_export(&mut conn, &request(false), &config())
        .await
        .expect_err("open must fail");

    assert!(matches!(err, CopyError::ExportInit(_)));
    assert!(!err.is_missing_relation());
    assert!(err.to_string().starts_with("COPY TO query failed:"));
}

#[tokio::test(start_paused = true)]
async fn stalled_stream_times_out_and_is_dropped() {
    let mut conn = ScriptedConnection::new()
        .with_copy_out(vec![StreamEvent::chunk("id\n1\n"), StreamEvent::Hang]);
    let seen = conn.observe();

    let err = run_export(&mut conn, &request(true), &config())
        .await
        .expect_err("export must time out");

    match err {
        CopyError::Timeout { duration, .. } => assert_eq!(duration, Duration::from_secs(30)),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(seen.stream_dropped());
    assert!(seen.discarded());
}

#[tokio::test]
async fn encoding_and_custom_delimiter_reach_the_command() {
    let mut conn = ScriptedConnection::new().with_copy_out(vec![StreamEvent::End]);
    let seen = conn.observe();
    let request = ExportRequest::new(
        "SELECT 1",
        CopyDialect::new(Format::Custom, "")
            .with_quote(Some('"'))
            .with_null(Some(String::new())),
    )
    .with_encoding(Some("LATIN1".to_string()));

    run_export(&mut conn, &request, &config())
        .await
        .expect("export succeeds");

    assert_eq!(
        seen.statements()[0],
        "COPY (SELECT 1) TO STDOUT \
         WITH (FORMAT CSV, DELIMITER '|', QUOTE '\"', NULL '', ENCODING 'LATIN1')"
    );
}
