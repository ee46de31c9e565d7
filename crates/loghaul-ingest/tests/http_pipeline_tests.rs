//! End-to-end tests for HTTP sources
//!
//! These tests run the download manager against a mock HTTP server:
//! - Missing files are skipped without stopping the run
//! - Rows come out in step order, then line order
//! - A follow-up run resumes from the returned cursor
//! - Collected rows land in the CSV table

use chrono::NaiveDateTime;
use loghaul_ingest::source::StepUnit;
use loghaul_ingest::transport::TransportOptions;
use loghaul_ingest::{
    column_names, CsvSink, DownloadManager, Protocol, ResumeCursor, RowSink, Source, SourceConfig,
    StepStatus,
};
use std::sync::Arc;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

fn dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M").unwrap()
}

fn access_source(server: &MockServer) -> Source {
    Source::from_config(&SourceConfig {
        name: "access".to_string(),
        protocol: Protocol::Http,
        address: server.uri(),
        port: None,
        remote_path: "/logs/".to_string(),
        name_pattern: "access-*yyyy-MM-dd-HH*.log".to_string(),
        split_pattern: r"^(\w+) (\w+)$".to_string(),
        step_unit: StepUnit::Hours,
        step_amount: 1,
        login: None,
        password: None,
        strict_host_key_checking: false,
        known_hosts: None,
        table: None,
    })
    .unwrap()
}

async fn serve(server: &MockServer, file: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/logs/{file}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn manager(server: &MockServer, scratch: &std::path::Path, now: &str) -> DownloadManager {
    let now = dt(now);
    DownloadManager::connect(access_source(server), scratch, &TransportOptions::default())
        .await
        .unwrap()
        .with_clock(Arc::new(move || now))
}

#[tokio::test]
async fn test_missing_hour_is_skipped() {
    let server = MockServer::start().await;
    serve(&server, "access-2024-01-01-01.log", "Jan Kowalski\nnot a match here\n").await;
    let scratch = tempfile::tempdir().unwrap();

    let mut manager = manager(&server, scratch.path(), "2024-01-01T02:00").await;
    let outcome = manager.initial_download(dt("2024-01-01T00:00")).await;
    manager.close().await;

    assert_eq!(outcome.rows, vec![vec!["Jan", "Kowalski"]]);
    assert_eq!(outcome.cursor, ResumeCursor::new(dt("2024-01-01T02:00"), 2));
    assert!(matches!(outcome.steps[0].status, StepStatus::FetchFailed(_)));
    assert_eq!(outcome.steps[1].remote_path, "/logs/access-2024-01-01-01.log");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_second_run_resumes_where_first_stopped() {
    let server = MockServer::start().await;
    serve(&server, "access-2024-01-01-05.log", "a b\nc d\ne f\n").await;
    serve(&server, "access-2024-01-01-06.log", "g h\n").await;
    let scratch = tempfile::tempdir().unwrap();

    let mut first = manager(&server, scratch.path(), "2024-01-01T06:00").await;
    let outcome = first.initial_download(dt("2024-01-01T05:00")).await;
    first.close().await;
    assert_eq!(outcome.rows.len(), 3);
    assert_eq!(outcome.cursor, ResumeCursor::new(dt("2024-01-01T06:00"), 3));

    let mut second = manager(&server, scratch.path(), "2024-01-01T07:00").await;
    let resumed = second.download_since_last(&outcome.cursor).await;
    second.close().await;

    // Line cursor 3 is past the end of the single-line 06 file
    assert!(resumed.rows.is_empty());
    assert_eq!(resumed.cursor, ResumeCursor::new(dt("2024-01-01T07:00"), 3));
}

#[tokio::test]
async fn test_rows_reach_csv_table() {
    let server = MockServer::start().await;
    serve(&server, "access-2024-01-01-00.log", "Jan Kowalski\r\nAndrzej Nowak\r\n").await;
    let scratch = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    let mut manager = manager(&server, scratch.path(), "2024-01-01T01:00").await;
    let columns = column_names(manager.source().splitter().field_count());
    let table = manager.source().table().to_string();
    let outcome = manager.initial_download(dt("2024-01-01T00:00")).await;
    manager.close().await;

    let mut sink = CsvSink::new(output.path());
    sink.ensure_table(&table, &columns).unwrap();
    let stored = sink.insert_rows(&table, &columns, &outcome.rows).unwrap();

    assert_eq!(stored, 2);
    let csv = std::fs::read_to_string(sink.table_path("access")).unwrap();
    assert_eq!(csv, "col_1,col_2\nJan,Kowalski\nAndrzej,Nowak\n");
}
