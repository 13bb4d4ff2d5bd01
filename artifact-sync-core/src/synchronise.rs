//! High-level pipeline: parallel fetch → normalize, then sequential publish.
//!
//! Before any work starts the input is checked so that every artifact owns its local
//! directory: duplicated names, names sharing a mapped directory and names with no
//! usable directory are all rejected.
//!
//! # Phases
//! 1. **Prepare** (parallel): one task per artifact, at most `workers` running at once.
//!    Each task fetches through the [`FallbackFetcher`] and then normalizes the tree.
//!    A failing task does not cancel its siblings; every task is awaited before the
//!    phase is judged. Any failure aborts the run before anything is published, and
//!    directories already fetched are left on disk for the next run to reuse.
//! 2. **Publish** (sequential): artifacts are handed to the [`RetryingPublisher`] one at
//!    a time, in input order, so only one writer touches the remote namespace.
//! 3. **Cleanup**: the local copy of an artifact is deleted right after it published.
//!
//! A publish failure stops the remaining publishes. The error lists what was already
//! published; those artifacts are not re-attempted.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::contract::{ArtifactSpec, FetchedArtifact, JobStatus, TransferJob};
use crate::error::{FetchError, SyncError};
use crate::fetch::{dir_size, FallbackFetcher};
use crate::normalize::normalize;
use crate::publish::RetryingPublisher;

pub const DEFAULT_WORKERS: usize = 3;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub workers: usize,
    pub allowed_extensions: Vec<String>,
    pub destination: String,
}

impl SyncOptions {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            allowed_extensions: crate::normalize::ESSENTIAL_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            destination: destination.into(),
        }
    }
}

/// Entrypoint output: what happened to every artifact of a successful run.
#[derive(Debug)]
pub struct SyncReport {
    pub jobs: Vec<TransferJob>,
    pub fetched: Vec<FetchedArtifact>,
    pub published: Vec<PublishedArtifactReport>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedArtifactReport {
    pub logical_name: String,
    pub size_bytes: u64,
    pub attempts: u32,
}

pub struct SyncOrchestrator {
    fetcher: Arc<FallbackFetcher>,
    publisher: RetryingPublisher,
    options: SyncOptions,
}

impl SyncOrchestrator {
    pub fn new(fetcher: FallbackFetcher, publisher: RetryingPublisher, options: SyncOptions) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            publisher,
            options,
        }
    }

    pub async fn run(&self, artifacts: &[ArtifactSpec]) -> Result<SyncReport, SyncError> {
        info!(
            artifacts = artifacts.len(),
            workers = self.options.workers,
            "[SYNC] Starting synchronisation pipeline"
        );

        self.check_exclusive_paths(artifacts)?;

        let mut jobs: Vec<TransferJob> = artifacts.iter().cloned().map(TransferJob::new).collect();

        // --- Phase 1: fetch + normalize, bounded parallelism ---
        let permits = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let allowed = Arc::new(self.options.allowed_extensions.clone());
        let handles: Vec<_> = artifacts
            .iter()
            .cloned()
            .map(|spec| {
                let fetcher = Arc::clone(&self.fetcher);
                let permits = Arc::clone(&permits);
                let allowed = Arc::clone(&allowed);
                tokio::spawn(async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return Err(SyncError::Worker {
                            artifact_name: spec.logical_name.clone(),
                            reason: "worker pool closed".to_string(),
                        });
                    };
                    prepare(&fetcher, &spec, &allowed).await
                })
            })
            .collect();
        for job in &mut jobs {
            job.status = JobStatus::InProgress;
        }
        let outcomes = join_all(handles).await;

        let mut prepared = Vec::with_capacity(artifacts.len());
        let mut first_failure: Option<SyncError> = None;
        for (job, outcome) in jobs.iter_mut().zip(outcomes) {
            let outcome = outcome.unwrap_or_else(|e| {
                Err(SyncError::Worker {
                    artifact_name: job.artifact.logical_name.clone(),
                    reason: e.to_string(),
                })
            });
            match outcome {
                Ok(fetched) => {
                    job.attempt_count += fetched.attempts.len() as u32;
                    prepared.push(fetched);
                }
                Err(e) => {
                    if let SyncError::Fetch(FetchError { attempts, .. }) = &e {
                        job.attempt_count += attempts.len() as u32;
                    }
                    job.status = JobStatus::Failed;
                    job.last_error = Some(e.to_string());
                    error!(artifact = %job.artifact.logical_name, error = %e, "[SYNC][ERROR] Prepare failed");
                    first_failure.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_failure {
            error!(error = %e, "[SYNC][ERROR] Aborting before publish");
            return Err(e);
        }
        info!(prepared = prepared.len(), "[SYNC] All artifacts prepared");

        // --- Phase 2: sequential publish in input order, Phase 3: local cleanup ---
        let mut published: Vec<PublishedArtifactReport> = Vec::with_capacity(prepared.len());
        for (job, fetched) in jobs.iter_mut().zip(&prepared) {
            let local = &fetched.artifact;
            match self
                .publisher
                .publish(&local.local_path, &local.logical_name, &self.options.destination)
                .await
            {
                Ok(outcome) => {
                    job.attempt_count += outcome.attempts;
                    job.status = JobStatus::Succeeded;
                    if let Err(e) = tokio::fs::remove_dir_all(&local.local_path).await {
                        warn!(error = ?e, path = %local.local_path.display(), "[SYNC] Failed to remove local copy");
                    }
                    info!(artifact = %local.logical_name, attempts = outcome.attempts, "[SYNC] Published and cleaned up");
                    published.push(PublishedArtifactReport {
                        logical_name: local.logical_name.clone(),
                        size_bytes: local.size_bytes,
                        attempts: outcome.attempts,
                    });
                }
                Err(e) => {
                    job.attempt_count += e.attempts;
                    job.status = JobStatus::Failed;
                    job.last_error = Some(e.to_string());
                    error!(artifact = %local.logical_name, error = %e, "[SYNC][ERROR] Publish failed, stopping");
                    return Err(SyncError::Publish {
                        source: e,
                        published: published.into_iter().map(|p| p.logical_name).collect(),
                    });
                }
            }
        }

        info!(published = published.len(), "[SYNC] Synchronisation complete");
        Ok(SyncReport {
            jobs,
            fetched: prepared,
            published,
        })
    }

    /// Every artifact must own its local directory for the whole run.
    fn check_exclusive_paths(&self, artifacts: &[ArtifactSpec]) -> Result<(), SyncError> {
        let mut seen = HashSet::new();
        let mut owners: HashMap<PathBuf, &str> = HashMap::new();
        for artifact in artifacts {
            let name = artifact.logical_name.as_str();
            if !seen.insert(name) {
                error!(artifact = name, "[SYNC][ERROR] Duplicate artifact in input");
                return Err(SyncError::DuplicateArtifact(name.to_string()));
            }
            let Some(path) = self.fetcher.canonical_path(name) else {
                error!(artifact = name, "[SYNC][ERROR] Artifact name has no local directory");
                return Err(SyncError::InvalidArtifactName(name.to_string()));
            };
            if let Some(first) = owners.get(&path) {
                error!(first = *first, second = name, path = %path.display(), "[SYNC][ERROR] Local directory collision");
                return Err(SyncError::LocalPathCollision {
                    first: first.to_string(),
                    second: name.to_string(),
                    path,
                });
            }
            owners.insert(path, name);
        }
        Ok(())
    }
}

async fn prepare(
    fetcher: &FallbackFetcher,
    spec: &ArtifactSpec,
    allowed: &Arc<Vec<String>>,
) -> Result<FetchedArtifact, SyncError> {
    let mut fetched = fetcher.fetch(spec).await?;

    let path = fetched.artifact.local_path.clone();
    let allowed = Arc::clone(allowed);
    let size = tokio::task::spawn_blocking(move || {
        let refs: Vec<&str> = allowed.iter().map(String::as_str).collect();
        normalize(&path, &refs);
        dir_size(&path)
    })
    .await
    .map_err(|e| SyncError::Worker {
        artifact_name: spec.logical_name.clone(),
        reason: format!("normalization did not complete: {e}"),
    })?;

    match size {
        Ok(size) => fetched.artifact.size_bytes = size,
        Err(e) => warn!(error = ?e, artifact = %spec.logical_name, "[SYNC] Failed to measure normalized artifact"),
    }
    Ok(fetched)
}
