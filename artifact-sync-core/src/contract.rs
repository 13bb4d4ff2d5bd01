//! # contract: data model and collaborator interfaces of the pipeline
//!
//! The pipeline talks to the outside world through three traits:
//! - [`SourceBackend`]: a remote store able to deliver a snapshot of an artifact.
//! - [`PublishTarget`]: the archival store processed artifacts are pushed to.
//! - [`ProgressSink`]: receives byte progress and per-attempt outcomes.
//!
//! All three are annotated for `mockall`, so tests can script backends and targets
//! without touching the network. The mocks are exported behind the
//! `test-export-mocks` feature for use by dependent crates.
//!
//! The plain data types ([`ArtifactSpec`], [`LocalArtifact`], [`TransferJob`], ...)
//! carry no behaviour beyond small helpers.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, TransferError};

/// Role a source backend plays in the fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    PrimaryMirror,
    SecondaryMirror,
    Origin,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::PrimaryMirror => "primary_mirror",
            BackendKind::SecondaryMirror => "secondary_mirror",
            BackendKind::Origin => "origin",
        };
        f.write_str(name)
    }
}

/// One entry in an artifact's ordered list of sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRef {
    pub backend: BackendKind,
    /// Repository or model id understood by the backend.
    pub locator: String,
    /// When set, the backend delivers the artifact nested under this folder and only
    /// files matching `<subfolder>/*` are requested.
    #[serde(default)]
    pub subfolder: Option<String>,
}

impl BackendRef {
    pub fn allow_pattern(&self) -> Option<String> {
        self.subfolder.as_ref().map(|s| format!("{s}/*"))
    }
}

/// A logical artifact and the ordered sources it can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub logical_name: String,
    pub source_backends: Vec<BackendRef>,
}

/// An artifact materialised on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifact {
    pub logical_name: String,
    pub local_path: PathBuf,
    pub size_bytes: u64,
}

/// Outcome of trying one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttempt {
    pub backend_kind: BackendKind,
    pub locator: String,
    /// `None` on success, otherwise the error text.
    pub error: Option<String>,
}

impl FetchAttempt {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a successful fetch, with the per-backend trail that led to it.
#[derive(Debug, Clone)]
pub struct FetchedArtifact {
    pub artifact: LocalArtifact,
    pub attempts: Vec<FetchAttempt>,
    /// True when the canonical directory already existed and no backend was called.
    pub skipped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

/// Lifecycle record for one artifact moving through the pipeline.
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub artifact: ArtifactSpec,
    pub attempt_count: u32,
    pub status: JobStatus,
    pub last_error: Option<String>,
}

impl TransferJob {
    pub fn new(artifact: ArtifactSpec) -> Self {
        Self {
            artifact,
            attempt_count: 0,
            status: JobStatus::Pending,
            last_error: None,
        }
    }
}

/// Opaque bearer token. Never validated or refreshed; `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Everything a backend needs for one snapshot download.
#[derive(Debug, Clone)]
pub struct SnapshotRequest {
    pub locator: String,
    /// Glob over repository paths, e.g. `model_name/*`. `None` means everything.
    pub allow_pattern: Option<String>,
    /// Staging directory the snapshot is written into, preserving repository paths.
    pub destination: PathBuf,
}

/// A remote store capable of providing an artifact snapshot.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SourceBackend: Send + Sync {
    /// Download every file matching the request into `request.destination`.
    async fn snapshot_download(&self, request: &SnapshotRequest) -> Result<(), BackendError>;
}

/// The archival store processed artifacts are pushed to.
///
/// `destination` names the remote namespace (bucket URL, repository, ...) and
/// `remote_path` the logical path inside it.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PublishTarget: Send + Sync {
    /// Remove whatever currently lives at `remote_path`.
    async fn delete_existing(
        &self,
        destination: &str,
        remote_path: &str,
    ) -> Result<(), TransferError>;

    /// Upload a file or a whole directory to `remote_path`.
    async fn upload(
        &self,
        local_path: &Path,
        destination: &str,
        remote_path: &str,
    ) -> Result<(), TransferError>;
}

/// What happened on one publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed { error: String, retry_in: Option<Duration> },
}

/// Fire-and-forget receiver of progress and attempt events.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, label: &str, bytes_sent: u64, total_bytes: u64);

    fn on_attempt(&self, label: &str, attempt: u32, outcome: &AttemptOutcome);
}
