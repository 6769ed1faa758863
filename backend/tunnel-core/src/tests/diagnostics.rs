use crate::diagnostics::{DiagnosticChannel, DiagnosticSink};
use crate::error::lifecycle::LifecycleError;

use tempfile::TempDir;

#[tokio::test]
async fn given_open_channel_when_writing_then_lines_are_timestamped() {
    // GIVEN: A fresh channel
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("stderr.log");
    let channel = DiagnosticChannel::open(&path).await.expect("open");

    // WHEN: Writing two messages
    channel.write("first").await.expect("write");
    channel.write("second").await.expect("write");
    channel.close().await;

    // THEN: Two lines, each prefixed by a bracketed timestamp
    let contents = std::fs::read_to_string(&path).expect("read");
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with('[') && lines[0].ends_with("] first"));
    assert!(lines[1].ends_with("] second"));
}

#[tokio::test]
async fn given_previous_contents_when_opening_then_file_is_truncated() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("stderr.log");
    std::fs::write(&path, "old run\n").expect("seed");

    let channel = DiagnosticChannel::open(&path).await.expect("open");
    channel.close().await;

    assert_eq!(std::fs::read_to_string(&path).expect("read"), "");
}

#[tokio::test]
async fn given_missing_directory_when_opening_then_setup_error() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("absent").join("stderr.log");

    let result = DiagnosticChannel::open(&path).await;

    assert!(matches!(result, Err(LifecycleError::Setup { .. })));
}

#[tokio::test]
async fn given_closed_channel_when_writing_then_returns_error() {
    let dir = TempDir::new().expect("tempdir");
    let channel = DiagnosticChannel::open(&dir.path().join("stderr.log"))
        .await
        .expect("open");
    channel.close().await;

    assert!(channel.write("late").await.is_err());
}

/// **VALUE**: The sink must route to the channel while attached and fall
/// back to the logger otherwise, never panicking either way.
#[tokio::test]
async fn given_sink_when_attaching_and_closing_then_routes_accordingly() {
    // GIVEN: A sink with nothing attached
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("stderr.log");
    let sink = DiagnosticSink::new();
    sink.write("goes to the logger").await;
    assert!(!sink.is_open().await);

    // WHEN: Attaching a channel, writing, then closing
    sink.attach(DiagnosticChannel::open(&path).await.expect("open"))
        .await;
    sink.write("goes to the file").await;
    sink.close().await;
    sink.write("logger again").await;

    // THEN: Only the attached write reached the file
    assert!(!sink.is_open().await);
    let contents = std::fs::read_to_string(&path).expect("read");
    assert_eq!(contents.lines().count(), 1);
    assert!(contents.contains("goes to the file"));
}
