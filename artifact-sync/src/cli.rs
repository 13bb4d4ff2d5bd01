//! Command-line interface for artifact-sync.
//!
//! All pipeline logic lives in `artifact-sync-core`; this module parses arguments,
//! loads configuration and hands off to the core.
//!
//! - `sync --config <file>`: fetch, normalize and publish every configured artifact.
//! - `upload --dir <dir> --bucket-url <url>`: stream pre-packed archives to a bucket.
//! - `publish --file <path> --destination <url>`: replace one packaged release file,
//!   with the same delete-then-retried-upload policy `sync` uses.
//!
//! [`run`] is the async entrypoint used by `main` and by the integration tests.
use crate::clients::{build_orchestrator, build_publisher, build_uploader};
use crate::load_config::{load_config, publish_token_from_env};
use anyhow::{anyhow, Result};
use artifact_sync_core::config::PublishSection;
use artifact_sync_core::contract::ProgressSink;
use artifact_sync_core::progress::TracingSink;
use artifact_sync_core::publish::DEFAULT_MAX_ATTEMPTS;
use artifact_sync_core::retry::LinearBackoff;
use artifact_sync_core::uploader::BATCH_EXTENSION;
use std::sync::Arc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Mirror model artifacts from public hubs into an archival bucket.
#[derive(Parser)]
#[clap(
    name = "artifact-sync",
    version,
    about = "Fetch model artifacts with mirror fallback, strip them down and publish them to a bucket"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronise every artifact listed in the config file
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Upload every matching archive in a directory to a bucket
    Upload {
        /// Directory holding the archives
        #[clap(long)]
        dir: PathBuf,
        /// File extension to pick up, without the dot
        #[clap(long, default_value = BATCH_EXTENSION)]
        extension: String,
        /// Bucket base URL; files land at `{bucket_url}/{file_name}`
        #[clap(long, env = "BUCKET_URL")]
        bucket_url: String,
    },
    /// Replace a single release file at a destination, retrying the upload
    Publish {
        /// Packaged release file to publish
        #[clap(long)]
        file: PathBuf,
        /// Base URL the file is published under
        #[clap(long, env = "PUBLISH_DESTINATION")]
        destination: String,
        /// Remote name; defaults to the file name
        #[clap(long)]
        remote_name: Option<String>,
        #[clap(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
        max_attempts: u32,
        /// Backoff unit; failed attempt i waits `backoff_secs * (i + 1)`
        #[clap(long, default_value_t = LinearBackoff::DEFAULT_UNIT.as_secs())]
        backoff_secs: u64,
    },
}

pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync { config } => {
            let cli_config = load_config(config)?;
            cli_config.config.trace_loaded();
            tracing::info!(command = "sync", "Starting synchronisation process");

            let orchestrator = build_orchestrator(&cli_config)?;
            match orchestrator.run(&cli_config.config.artifacts).await {
                Ok(report) => {
                    for published in &report.published {
                        tracing::info!(
                            artifact = %published.logical_name,
                            size_bytes = published.size_bytes,
                            attempts = published.attempts,
                            "Artifact published"
                        );
                    }
                    let skipped = report.fetched.iter().filter(|f| f.skipped).count();
                    tracing::info!(
                        command = "sync",
                        published = report.published.len(),
                        reused_local = skipped,
                        "Synchronisation complete"
                    );
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "sync", error = %e, "Synchronisation failed");
                    Err(anyhow::Error::new(e).context("Synchronisation failed"))
                }
            }
        }
        Commands::Upload {
            dir,
            extension,
            bucket_url,
        } => {
            tracing::info!(command = "upload", dir = %dir.display(), %extension, "Starting batch upload");
            let credential = publish_token_from_env()?;
            let uploader = build_uploader()?;
            match uploader
                .upload_batch(&dir, &extension, &bucket_url, &credential)
                .await
            {
                Ok(uploaded) => {
                    tracing::info!(command = "upload", count = uploaded.len(), files = ?uploaded, "Upload complete");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "upload", error = %e, "Upload failed");
                    Err(anyhow::Error::new(e).context("Upload failed"))
                }
            }
        }
        Commands::Publish {
            file,
            destination,
            remote_name,
            max_attempts,
            backoff_secs,
        } => {
            if !file.is_file() {
                tracing::error!(command = "publish", file = %file.display(), "Release file not found");
                return Err(anyhow!("file not found: {}", file.display()));
            }
            let remote_name = match remote_name {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| anyhow!("cannot derive a remote name from {}", file.display()))?,
            };
            tracing::info!(command = "publish", file = %file.display(), %remote_name, %destination, "Starting release publish");

            let credential = publish_token_from_env()?;
            let policy = PublishSection {
                max_attempts,
                backoff_secs,
            };
            let sink: Arc<dyn ProgressSink> = Arc::new(TracingSink::default());
            let publisher = build_publisher(&policy, credential, sink)?;
            match publisher.publish(&file, &remote_name, &destination).await {
                Ok(outcome) => {
                    tracing::info!(command = "publish", remote_name = %outcome.remote_name, attempts = outcome.attempts, "Publish complete");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "publish", error = %e, "Publish failed");
                    Err(anyhow::Error::new(e).context("Publish failed"))
                }
            }
        }
    }
}
