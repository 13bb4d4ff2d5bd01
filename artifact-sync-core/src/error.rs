//! Error taxonomy for the synchronisation pipeline.
//!
//! - [`BackendError`]: one source backend failed one snapshot attempt.
//! - [`FetchError`]: every backend for an artifact failed. Fatal to the run.
//! - [`TransferError`]: a single HTTP transfer failed. Callers decide whether to retry.
//! - [`PublishError`]: the publisher exhausted its retry budget.
//! - [`SyncError`]: run-level failure surfaced by the orchestrator.
//!
//! Normalization never fails; its problems are logged as warnings and swallowed.

use std::path::PathBuf;

use crate::contract::FetchAttempt;

/// Failure of a single snapshot download from one backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status_code} from {url}")]
    Status { status_code: u16, url: String },

    #[error("invalid allow pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("no files matched in {locator}")]
    NothingMatched { locator: String },

    #[error("{0}")]
    Other(String),
}

/// All backends for one artifact were exhausted.
#[derive(Debug, thiserror::Error)]
#[error(
    "all {} backend(s) failed for artifact {artifact_name} (last tried: {})",
    .attempts.len(),
    last_tried(.attempts)
)]
pub struct FetchError {
    pub artifact_name: String,
    pub attempts: Vec<FetchAttempt>,
}

impl FetchError {
    /// The last backend that was tried, formatted as `kind:locator`.
    pub fn last_backend(&self) -> Option<String> {
        self.attempts.last().map(describe_attempt)
    }
}

fn describe_attempt(attempt: &FetchAttempt) -> String {
    format!("{}:{}", attempt.backend_kind, attempt.locator)
}

fn last_tried(attempts: &[FetchAttempt]) -> String {
    attempts
        .last()
        .map(describe_attempt)
        .unwrap_or_else(|| "none".to_string())
}

/// A single transfer attempt against a remote store failed.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote responded with status {status_code}: {body}")]
    Status { status_code: u16, body: String },

    #[error("directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("no .{extension} files found in {dir}")]
    NoFiles { dir: PathBuf, extension: String },
}

/// The publisher gave up after `attempts` consecutive failures.
#[derive(Debug, thiserror::Error)]
#[error("publishing {remote_name} failed after {attempts} attempt(s): {last_error}")]
pub struct PublishError {
    pub remote_name: String,
    pub attempts: u32,
    #[source]
    pub last_error: TransferError,
}

/// Run-level failure of the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("artifact {0} appears more than once in the run")]
    DuplicateArtifact(String),

    #[error("artifact name {0:?} does not map to a usable local directory")]
    InvalidArtifactName(String),

    #[error("artifacts {first} and {second} would share the local directory {}", .path.display())]
    LocalPathCollision {
        first: String,
        second: String,
        path: PathBuf,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("{source} (already published: {published:?})")]
    Publish {
        #[source]
        source: PublishError,
        published: Vec<String>,
    },

    #[error("worker for {artifact_name} did not complete: {reason}")]
    Worker {
        artifact_name: String,
        reason: String,
    },
}
