//! # uploader: chunked streaming upload of single large files
//!
//! A file is read sequentially in fixed-size chunks (1 MiB by default) and the chunks
//! are streamed as the body of one long-lived HTTP `PUT`. Nothing beyond the current
//! chunk is held in memory, so multi-gigabyte artifacts upload with a flat footprint.
//!
//! After each chunk is *read* the byte counter advances by the chunk length and the
//! new value is handed to the [`ProgressSink`]. Acknowledgement is left to the
//! transport.
//!
//! The whole request is bounded by one timeout (an hour by default). There is no
//! retry here: [`crate::publish::RetryingPublisher`] retries when this is used through
//! a publish target, and [`ChunkedStreamUploader::upload_batch`] fails the batch on the
//! first error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Body, Client, StatusCode};
use tokio::io::AsyncReadExt;
use tracing::{error, info};

use crate::contract::{Credential, ProgressSink};
use crate::error::TransferError;
use crate::progress::ProgressState;

/// Default chunk size: 1 MiB.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Default request timeout for a single upload.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Default extension picked up by [`ChunkedStreamUploader::upload_batch`].
pub const BATCH_EXTENSION: &str = "7z";

/// Opens `path` and returns a stream of its chunks together with the file size.
///
/// Every chunk except the last is exactly `chunk_size` bytes. `sink` receives
/// `(label, bytes_sent, total_bytes)` after each chunk is read.
pub async fn chunk_stream(
    path: &Path,
    chunk_size: usize,
    label: String,
    sink: Arc<dyn ProgressSink>,
) -> std::io::Result<(impl Stream<Item = std::io::Result<Vec<u8>>> + Send + 'static, u64)> {
    let file = tokio::fs::File::open(path).await?;
    let total_bytes = file.metadata().await?.len();
    let chunk_size = chunk_size.max(1) as u64;
    let progress = ProgressState::new(total_bytes);

    let chunks = stream::try_unfold(
        (file, progress, label, sink),
        move |(mut file, mut progress, label, sink)| async move {
            let mut buf = Vec::with_capacity(chunk_size as usize);
            (&mut file).take(chunk_size).read_to_end(&mut buf).await?;
            if buf.is_empty() {
                return Ok(None);
            }
            let sent = progress.advance(buf.len() as u64);
            sink.on_progress(&label, sent, progress.total_bytes());
            Ok::<_, std::io::Error>(Some((buf, (file, progress, label, sink))))
        },
    );

    Ok((chunks, total_bytes))
}

/// Streams files to pre-authorised HTTP destinations.
#[derive(Clone)]
pub struct ChunkedStreamUploader {
    client: Client,
    chunk_size: usize,
    sink: Arc<dyn ProgressSink>,
}

impl ChunkedStreamUploader {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Result<Self, TransferError> {
        Self::with_options(sink, CHUNK_SIZE, UPLOAD_TIMEOUT)
    }

    pub fn with_options(
        sink: Arc<dyn ProgressSink>,
        chunk_size: usize,
        timeout: Duration,
    ) -> Result<Self, TransferError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            chunk_size,
            sink,
        })
    }

    /// `PUT` the content of `local_file` to `destination_url` as one streamed request.
    pub async fn upload(
        &self,
        local_file: &Path,
        destination_url: &str,
        credential: &Credential,
    ) -> Result<(), TransferError> {
        let label = local_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| local_file.display().to_string());

        let (chunks, total_bytes) =
            chunk_stream(local_file, self.chunk_size, label.clone(), self.sink.clone()).await?;
        info!(file = %label, total_bytes, url = %destination_url, "[UPLOAD] Streaming file");

        let response = self
            .client
            .put(destination_url)
            .bearer_auth(credential.expose())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(Body::wrap_stream(chunks))
            .send()
            .await
            .map_err(|e| {
                error!(error = ?e, file = %label, url = %destination_url, "[UPLOAD][ERROR] Request failed");
                e
            })?;

        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::CREATED {
            info!(file = %label, status = status.as_u16(), "[UPLOAD] Uploaded file");
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<failed to decode response body>"));
        error!(
            file = %label,
            status = status.as_u16(),
            body = %body,
            "[UPLOAD][ERROR] Remote rejected upload"
        );
        Err(TransferError::Status {
            status_code: status.as_u16(),
            body,
        })
    }

    /// Upload every `*.{extension}` file in `dir` to `{bucket_url}/{file_name}`.
    ///
    /// Files go up one at a time in name order. The first failure aborts the batch.
    pub async fn upload_batch(
        &self,
        dir: &Path,
        extension: &str,
        bucket_url: &str,
        credential: &Credential,
    ) -> Result<Vec<String>, TransferError> {
        let files = batch_files(dir, extension).await?;
        info!(count = files.len(), dir = %dir.display(), "[UPLOAD] Found files to upload");

        let base = bucket_url.trim_end_matches('/');
        let mut uploaded = Vec::with_capacity(files.len());
        for path in files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let url = format!("{base}/{name}");
            self.upload(&path, &url, credential).await?;
            uploaded.push(name);
        }
        info!(count = uploaded.len(), "[UPLOAD] All files uploaded");
        Ok(uploaded)
    }
}

async fn batch_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, TransferError> {
    if !tokio::fs::try_exists(dir).await? {
        return Err(TransferError::MissingDirectory(dir.to_path_buf()));
    }
    let wanted = extension.trim_start_matches('.');
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(wanted));
        if matches && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    if files.is_empty() {
        return Err(TransferError::NoFiles {
            dir: dir.to_path_buf(),
            extension: wanted.to_string(),
        });
    }
    files.sort();
    Ok(files)
}
