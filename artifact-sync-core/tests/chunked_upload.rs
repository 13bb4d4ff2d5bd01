mod common;

use std::fs;
use std::sync::Arc;

use axum::http::Method;
use futures::TryStreamExt;
use tempfile::tempdir;

use artifact_sync_core::contract::Credential;
use artifact_sync_core::error::TransferError;
use artifact_sync_core::uploader::{chunk_stream, ChunkedStreamUploader, CHUNK_SIZE};

use common::{RecordingSink, TestBucket, TOKEN};

const MIB: usize = 1024 * 1024;

fn write_sized(dir: &std::path::Path, name: &str, len: usize) -> std::path::PathBuf {
    let path = dir.join(name);
    let content: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn two_and_a_half_mib_reads_as_three_chunks() {
    let dir = tempdir().unwrap();
    let path = write_sized(dir.path(), "model.7z", 5 * MIB / 2);
    let sink = Arc::new(RecordingSink::default());

    let (chunks, total) = chunk_stream(&path, CHUNK_SIZE, "model.7z".to_string(), sink.clone())
        .await
        .unwrap();
    let chunks: Vec<Vec<u8>> = chunks.try_collect().await.unwrap();

    assert_eq!(total, (5 * MIB / 2) as u64);
    let lengths: Vec<usize> = chunks.iter().map(Vec::len).collect();
    assert_eq!(lengths, vec![1_048_576, 1_048_576, 524_288]);
    assert_eq!(sink.sent(), vec![1_048_576, 2_097_152, 2_621_440]);
    assert!(sink
        .progress
        .lock()
        .unwrap()
        .iter()
        .all(|(label, _, t)| label == "model.7z" && *t == total));

    let original = fs::read(&path).unwrap();
    assert_eq!(chunks.concat(), original);
}

#[tokio::test]
async fn exact_multiple_has_no_trailing_empty_chunk() {
    let dir = tempdir().unwrap();
    let path = write_sized(dir.path(), "exact.7z", 2 * MIB);
    let sink = Arc::new(RecordingSink::default());

    let (chunks, _) = chunk_stream(&path, CHUNK_SIZE, "exact.7z".to_string(), sink.clone())
        .await
        .unwrap();
    let chunks: Vec<Vec<u8>> = chunks.try_collect().await.unwrap();

    assert_eq!(chunks.len(), 2);
    assert_eq!(sink.sent(), vec![1_048_576, 2_097_152]);
}

#[tokio::test]
async fn empty_file_yields_no_chunks_and_no_progress() {
    let dir = tempdir().unwrap();
    let path = write_sized(dir.path(), "empty.7z", 0);
    let sink = Arc::new(RecordingSink::default());

    let (chunks, total) = chunk_stream(&path, CHUNK_SIZE, "empty.7z".to_string(), sink.clone())
        .await
        .unwrap();
    let chunks: Vec<Vec<u8>> = chunks.try_collect().await.unwrap();

    assert_eq!(total, 0);
    assert!(chunks.is_empty());
    assert!(sink.sent().is_empty());
}

#[tokio::test]
async fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let sink = Arc::new(RecordingSink::default());
    let result = chunk_stream(&dir.path().join("nope.7z"), CHUNK_SIZE, "nope".into(), sink).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn upload_streams_whole_file_with_bearer_token() {
    let bucket = TestBucket::spawn().await;
    let dir = tempdir().unwrap();
    let path = write_sized(dir.path(), "asr.7z", 5 * MIB / 2);
    let sink = Arc::new(RecordingSink::default());
    let uploader = ChunkedStreamUploader::new(sink.clone()).unwrap();

    uploader
        .upload(
            &path,
            &format!("{}/files/asr.7z", bucket.base_url),
            &Credential::new(TOKEN),
        )
        .await
        .expect("201 should count as success");

    let received = bucket.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].method, Method::PUT);
    assert_eq!(received[0].path, "files/asr.7z");
    assert_eq!(received[0].len, 5 * MIB / 2);
    assert_eq!(received[0].authorization.as_deref(), Some("Bearer test-token"));
    assert_eq!(
        received[0].content_type.as_deref(),
        Some("application/octet-stream")
    );
    assert_eq!(sink.sent().last().copied(), Some((5 * MIB / 2) as u64));
}

#[tokio::test]
async fn rejected_upload_surfaces_status_and_body() {
    let bucket = TestBucket::spawn_failing(&["files/bad.7z"]).await;
    let dir = tempdir().unwrap();
    let path = write_sized(dir.path(), "bad.7z", 1024);
    let uploader = ChunkedStreamUploader::new(Arc::new(RecordingSink::default())).unwrap();

    let err = uploader
        .upload(
            &path,
            &format!("{}/files/bad.7z", bucket.base_url),
            &Credential::new(TOKEN),
        )
        .await
        .unwrap_err();

    match err {
        TransferError::Status { status_code, body } => {
            assert_eq!(status_code, 500);
            assert_eq!(body, "bucket unavailable");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn batch_uploads_matching_files_in_name_order() {
    let bucket = TestBucket::spawn().await;
    let dir = tempdir().unwrap();
    write_sized(dir.path(), "b_model.7z", 10);
    write_sized(dir.path(), "a_model.7z", 20);
    write_sized(dir.path(), "notes.txt", 5);
    fs::create_dir(dir.path().join("nested.7z")).unwrap();

    let uploader = ChunkedStreamUploader::new(Arc::new(RecordingSink::default())).unwrap();
    let uploaded = uploader
        .upload_batch(
            dir.path(),
            "7z",
            &format!("{}/bucket/", bucket.base_url),
            &Credential::new(TOKEN),
        )
        .await
        .unwrap();

    assert_eq!(uploaded, vec!["a_model.7z".to_string(), "b_model.7z".to_string()]);
    assert_eq!(
        bucket.paths(Method::PUT),
        vec!["bucket/a_model.7z".to_string(), "bucket/b_model.7z".to_string()]
    );
}

#[tokio::test]
async fn batch_stops_at_first_failure() {
    let bucket = TestBucket::spawn_failing(&["bucket/a_model.7z"]).await;
    let dir = tempdir().unwrap();
    write_sized(dir.path(), "a_model.7z", 10);
    write_sized(dir.path(), "b_model.7z", 10);

    let uploader = ChunkedStreamUploader::new(Arc::new(RecordingSink::default())).unwrap();
    let err = uploader
        .upload_batch(
            dir.path(),
            ".7z",
            &format!("{}/bucket", bucket.base_url),
            &Credential::new(TOKEN),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::Status { status_code: 500, .. }));
    assert_eq!(bucket.paths(Method::PUT), vec!["bucket/a_model.7z".to_string()]);
}

#[tokio::test]
async fn batch_reports_missing_directory_and_empty_selection() {
    let dir = tempdir().unwrap();
    write_sized(dir.path(), "readme.md", 3);
    let uploader = ChunkedStreamUploader::new(Arc::new(RecordingSink::default())).unwrap();
    let credential = Credential::new(TOKEN);

    let missing = dir.path().join("absent");
    let err = uploader
        .upload_batch(&missing, "7z", "http://127.0.0.1:9", &credential)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::MissingDirectory(p) if p == missing));

    let err = uploader
        .upload_batch(dir.path(), "7z", "http://127.0.0.1:9", &credential)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::NoFiles { ref extension, .. } if extension == "7z"));
}
