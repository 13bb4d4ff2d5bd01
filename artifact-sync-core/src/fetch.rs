//! Fallback fetching of artifacts from an ordered list of source backends.
//!
//! Backends are tried in the order the artifact lists them. A backend that errors is
//! logged and skipped; falling through to the next one is the only retry there is.
//! Each attempt downloads into its own staging directory next to the canonical path,
//! so a half-finished snapshot never shows up under the artifact's real name.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::contract::{
    ArtifactSpec, BackendKind, BackendRef, FetchAttempt, FetchedArtifact, LocalArtifact,
    SnapshotRequest, SourceBackend,
};
use crate::error::{BackendError, FetchError};

/// Tries an artifact's sources in order until one delivers a non-empty snapshot.
pub struct FallbackFetcher {
    output_dir: PathBuf,
    backends: HashMap<BackendKind, Arc<dyn SourceBackend>>,
}

impl FallbackFetcher {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            backends: HashMap::new(),
        }
    }

    /// Bind a backend implementation to a role.
    pub fn with_backend(mut self, kind: BackendKind, backend: Arc<dyn SourceBackend>) -> Self {
        self.backends.insert(kind, backend);
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Deterministic local directory for an artifact, or `None` when the name has no
    /// usable directory form below `output_dir`.
    pub fn canonical_path(&self, logical_name: &str) -> Option<PathBuf> {
        local_dir_name(logical_name).map(|dir_name| self.output_dir.join(dir_name))
    }

    pub async fn fetch(&self, artifact: &ArtifactSpec) -> Result<FetchedArtifact, FetchError> {
        let name = artifact.logical_name.as_str();
        let Some(canonical) = self.canonical_path(name) else {
            error!(artifact = name, "[FETCH][ERROR] Logical name does not map to a local directory");
            return Err(FetchError {
                artifact_name: name.to_string(),
                attempts: Vec::new(),
            });
        };

        if dir_has_entries(&canonical).await {
            info!(artifact = name, path = %canonical.display(), "[FETCH] Already present, skipping");
            let size_bytes = measure(&canonical).await;
            return Ok(FetchedArtifact {
                artifact: LocalArtifact {
                    logical_name: name.to_string(),
                    local_path: canonical,
                    size_bytes,
                },
                attempts: Vec::new(),
                skipped: true,
            });
        }

        let mut attempts = Vec::with_capacity(artifact.source_backends.len());
        for source in &artifact.source_backends {
            info!(
                artifact = name,
                backend = %source.backend,
                locator = %source.locator,
                "[FETCH] Trying backend"
            );
            match self.try_backend(source, &canonical).await {
                Ok(()) => {
                    attempts.push(FetchAttempt {
                        backend_kind: source.backend,
                        locator: source.locator.clone(),
                        error: None,
                    });
                    let size_bytes = measure(&canonical).await;
                    info!(
                        artifact = name,
                        backend = %source.backend,
                        size_bytes,
                        "[FETCH] Downloaded artifact"
                    );
                    return Ok(FetchedArtifact {
                        artifact: LocalArtifact {
                            logical_name: name.to_string(),
                            local_path: canonical,
                            size_bytes,
                        },
                        attempts,
                        skipped: false,
                    });
                }
                Err(e) => {
                    warn!(
                        artifact = name,
                        backend = %source.backend,
                        locator = %source.locator,
                        error = %e,
                        "[FETCH] Backend failed, falling through"
                    );
                    attempts.push(FetchAttempt {
                        backend_kind: source.backend,
                        locator: source.locator.clone(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        error!(artifact = name, tried = attempts.len(), "[FETCH][ERROR] All backends exhausted");
        Err(FetchError {
            artifact_name: name.to_string(),
            attempts,
        })
    }

    async fn try_backend(&self, source: &BackendRef, canonical: &Path) -> Result<(), BackendError> {
        let backend = self.backends.get(&source.backend).ok_or_else(|| {
            BackendError::Other(format!("no backend configured for {}", source.backend))
        })?;

        let mut staging_name = canonical.as_os_str().to_owned();
        staging_name.push(format!(".staging-{}", uuid::Uuid::new_v4().simple()));
        let staging = PathBuf::from(staging_name);
        tokio::fs::create_dir_all(&staging).await?;

        let request = SnapshotRequest {
            locator: source.locator.clone(),
            allow_pattern: source.allow_pattern(),
            destination: staging.clone(),
        };

        let result = match backend.snapshot_download(&request).await {
            Ok(()) => relocate(&staging, source.subfolder.as_deref(), canonical).await,
            Err(e) => Err(e),
        };

        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(error = ?e, path = %staging.display(), "[FETCH] Failed to discard staging area");
            }
        }
        result
    }
}

/// Single path component an artifact is stored under: separators become `_`.
///
/// The mapping is lossy (`a/b` and `a_b` share a directory), so callers running
/// several artifacts at once must check the mapped names for collisions.
pub fn local_dir_name(logical_name: &str) -> Option<String> {
    let dir_name = logical_name.replace(['/', '\\', ':'], "_");
    match dir_name.trim() {
        "" | "." | ".." => None,
        _ => Some(dir_name),
    }
}

/// Moves the delivered content from the staging area to the canonical path.
async fn relocate(
    staging: &Path,
    subfolder: Option<&str>,
    canonical: &Path,
) -> Result<(), BackendError> {
    let content_root = match subfolder {
        Some(sub) => staging.join(sub),
        None => staging.to_path_buf(),
    };
    if !dir_has_entries(&content_root).await {
        return Err(BackendError::Other(format!(
            "backend delivered no content under {}",
            content_root.display()
        )));
    }

    if tokio::fs::try_exists(canonical).await? {
        debug!(path = %canonical.display(), "[FETCH] Replacing stale canonical directory");
        tokio::fs::remove_dir_all(canonical).await?;
    }
    tokio::fs::rename(&content_root, canonical).await?;
    Ok(())
}

async fn dir_has_entries(path: &Path) -> bool {
    match tokio::fs::read_dir(path).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

async fn measure(path: &Path) -> u64 {
    let owned = path.to_path_buf();
    match tokio::task::spawn_blocking(move || dir_size(&owned)).await {
        Ok(Ok(size)) => size,
        Ok(Err(e)) => {
            warn!(error = ?e, path = %path.display(), "[FETCH] Failed to measure artifact size");
            0
        }
        Err(e) => {
            warn!(error = ?e, path = %path.display(), "[FETCH] Size measurement task failed");
            0
        }
    }
}

/// Total size in bytes of the regular files below `path` (or of `path` itself).
pub fn dir_size(path: &Path) -> io::Result<u64> {
    let meta = fs::symlink_metadata(path)?;
    if !meta.is_dir() {
        return Ok(meta.len());
    }
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        total += dir_size(&entry.path())?;
    }
    Ok(total)
}
