use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::contract::{ArtifactSpec, BackendKind};
use crate::normalize::ESSENTIAL_EXTENSIONS;
use crate::publish::DEFAULT_MAX_ATTEMPTS;
use crate::retry::LinearBackoff;
use crate::synchronise::DEFAULT_WORKERS;

/// Static pipeline configuration. Secrets are never part of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub sync: SyncSection,
    #[serde(default)]
    pub publish: PublishSection,
    #[serde(default)]
    pub backends: BackendsSection,
    #[serde(default)]
    pub artifacts: Vec<ArtifactSpec>,
}

impl Config {
    pub fn trace_loaded(&self) {
        info!(
            output_dir = %self.sync.output_dir.display(),
            destination = %self.sync.destination,
            workers = self.sync.workers,
            artifacts_count = self.artifacts.len(),
            "Loaded Config"
        );
        debug!(?self, "Config loaded (full debug)");
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSection {
    pub output_dir: PathBuf,
    /// Base URL (or namespace) artifacts are published to.
    pub destination: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
}

impl Default for PublishSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_secs: default_backoff_secs(),
        }
    }
}

/// Concrete implementation bound to each backend role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendsSection {
    pub primary_mirror: Option<BackendConfig>,
    pub secondary_mirror: Option<BackendConfig>,
    pub origin: Option<BackendConfig>,
}

impl BackendsSection {
    pub fn iter(&self) -> impl Iterator<Item = (BackendKind, &BackendConfig)> {
        [
            (BackendKind::PrimaryMirror, self.primary_mirror.as_ref()),
            (BackendKind::SecondaryMirror, self.secondary_mirror.as_ref()),
            (BackendKind::Origin, self.origin.as_ref()),
        ]
        .into_iter()
        .filter_map(|(kind, cfg)| cfg.map(|c| (kind, c)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Hub {
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        revision: Option<String>,
    },
    Modelscope {
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        revision: Option<String>,
    },
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_allowed_extensions() -> Vec<String> {
    ESSENTIAL_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_backoff_secs() -> u64 {
    LinearBackoff::DEFAULT_UNIT.as_secs()
}
