//! Wires configuration and secrets into concrete backends, target and orchestrator.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use artifact_sync_core::backends::{HubMirrorBackend, ModelScopeBackend};
use artifact_sync_core::config::{BackendConfig, Config, PublishSection};
use artifact_sync_core::contract::{Credential, ProgressSink, SourceBackend};
use artifact_sync_core::fetch::FallbackFetcher;
use artifact_sync_core::progress::TracingSink;
use artifact_sync_core::publish::RetryingPublisher;
use artifact_sync_core::retry::LinearBackoff;
use artifact_sync_core::synchronise::{SyncOptions, SyncOrchestrator};
use artifact_sync_core::target::BucketTarget;
use artifact_sync_core::uploader::ChunkedStreamUploader;
use tracing::info;

use crate::load_config::{CliConfig, Secrets};

pub fn build_backend(cfg: &BackendConfig, secrets: &Secrets) -> Result<Arc<dyn SourceBackend>> {
    let backend: Arc<dyn SourceBackend> = match cfg {
        BackendConfig::Hub { endpoint, revision } => {
            let endpoint = endpoint
                .as_deref()
                .unwrap_or(HubMirrorBackend::DEFAULT_ENDPOINT);
            let mut backend = HubMirrorBackend::new(endpoint, secrets.hub_token.clone())
                .context("Failed to build hub backend")?;
            if let Some(rev) = revision {
                backend = backend.with_revision(rev);
            }
            Arc::new(backend)
        }
        BackendConfig::Modelscope { endpoint, revision } => {
            let endpoint = endpoint
                .as_deref()
                .unwrap_or(ModelScopeBackend::DEFAULT_ENDPOINT);
            let mut backend = ModelScopeBackend::new(endpoint, secrets.modelscope_token.clone())
                .context("Failed to build ModelScope backend")?;
            if let Some(rev) = revision {
                backend = backend.with_revision(rev);
            }
            Arc::new(backend)
        }
    };
    Ok(backend)
}

pub fn build_fetcher(config: &Config, secrets: &Secrets) -> Result<FallbackFetcher> {
    let mut fetcher = FallbackFetcher::new(&config.sync.output_dir);
    for (kind, cfg) in config.backends.iter() {
        info!(backend = %kind, config = ?cfg, "Binding source backend");
        fetcher = fetcher.with_backend(kind, build_backend(cfg, secrets)?);
    }
    Ok(fetcher)
}

pub fn build_publisher(
    policy: &PublishSection,
    publish_token: Credential,
    sink: Arc<dyn ProgressSink>,
) -> Result<RetryingPublisher> {
    let uploader = ChunkedStreamUploader::new(Arc::clone(&sink))
        .context("Failed to build upload client")?;
    let target =
        BucketTarget::new(uploader, publish_token).context("Failed to build bucket target")?;
    Ok(RetryingPublisher::new(Arc::new(target), sink)
        .with_max_attempts(policy.max_attempts)
        .with_backoff(Arc::new(LinearBackoff::new(Duration::from_secs(
            policy.backoff_secs,
        )))))
}

pub fn build_orchestrator(cli_config: &CliConfig) -> Result<SyncOrchestrator> {
    let config = &cli_config.config;
    let sink: Arc<dyn ProgressSink> = Arc::new(TracingSink::default());
    let fetcher = build_fetcher(config, &cli_config.secrets)?;
    let publisher = build_publisher(
        &config.publish,
        cli_config.secrets.publish_token.clone(),
        sink,
    )?;

    let mut options = SyncOptions::new(config.sync.destination.clone());
    options.workers = config.sync.workers;
    options.allowed_extensions = config.sync.allowed_extensions.clone();

    Ok(SyncOrchestrator::new(fetcher, publisher, options))
}

pub fn build_uploader() -> Result<ChunkedStreamUploader> {
    ChunkedStreamUploader::new(Arc::new(TracingSink::default()))
        .context("Failed to build upload client")
}
