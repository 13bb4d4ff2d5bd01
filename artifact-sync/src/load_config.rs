//! Loads the static YAML config and injects secrets from the environment.
//!
//! The YAML file never carries tokens. `PUBLISH_TOKEN` is required; `HF_TOKEN` and
//! `MS_TOKEN` are passed to the hub and ModelScope backends when set.
//!
//! Besides parsing, the loader rejects configurations the pipeline could only fail on
//! later: artifacts without sources and sources naming a backend role that has no
//! implementation configured.
use anyhow::Result;
use artifact_sync_core::config::Config;
use artifact_sync_core::contract::Credential;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

pub const PUBLISH_TOKEN_ENV: &str = "PUBLISH_TOKEN";
pub const HUB_TOKEN_ENV: &str = "HF_TOKEN";
pub const MODELSCOPE_TOKEN_ENV: &str = "MS_TOKEN";

#[derive(Debug, Clone)]
pub struct Secrets {
    pub publish_token: Credential,
    pub hub_token: Option<Credential>,
    pub modelscope_token: Option<Credential>,
}

impl Secrets {
    pub fn from_env() -> Result<Self> {
        let publish_token = publish_token_from_env()?;
        Ok(Self {
            publish_token,
            hub_token: optional_token(HUB_TOKEN_ENV),
            modelscope_token: optional_token(MODELSCOPE_TOKEN_ENV),
        })
    }
}

/// Everything the `sync` command needs.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub config: Config,
    pub secrets: Secrets,
}

pub fn publish_token_from_env() -> Result<Credential> {
    match env::var(PUBLISH_TOKEN_ENV) {
        Ok(token) if !token.trim().is_empty() => Ok(Credential::new(token)),
        Ok(_) => {
            error!(var = PUBLISH_TOKEN_ENV, "Publish token is empty");
            Err(anyhow::anyhow!("{PUBLISH_TOKEN_ENV} is set but empty"))
        }
        Err(e) => {
            error!(error = ?e, var = PUBLISH_TOKEN_ENV, "Publish token missing in environment");
            Err(anyhow::anyhow!("{PUBLISH_TOKEN_ENV} must be set: {e}"))
        }
    }
}

fn optional_token(var: &str) -> Option<Credential> {
    env::var(var)
        .ok()
        .filter(|t| !t.trim().is_empty())
        .map(Credential::new)
}

/// Parse and check a YAML config file without touching the environment.
pub fn parse_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let config: Config = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.sync.workers == 0 {
        return Err(anyhow::anyhow!("sync.workers must be at least 1"));
    }
    if config.artifacts.is_empty() {
        warn!("Config lists no artifacts; nothing will be synchronised");
    }
    for artifact in &config.artifacts {
        if artifact.source_backends.is_empty() {
            return Err(anyhow::anyhow!(
                "artifact {} has no source backends",
                artifact.logical_name
            ));
        }
        for source in &artifact.source_backends {
            if !config.backends.iter().any(|(kind, _)| kind == source.backend) {
                return Err(anyhow::anyhow!(
                    "artifact {} uses backend {} which is not configured under `backends`",
                    artifact.logical_name,
                    source.backend
                ));
            }
        }
    }
    Ok(())
}

/// Loads the YAML config and the secrets the `sync` command needs.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let config = parse_config(path)?;
    let secrets = Secrets::from_env()?;
    info!(
        hub_token = secrets.hub_token.is_some(),
        modelscope_token = secrets.modelscope_token.is_some(),
        "Injected secrets from environment"
    );
    Ok(CliConfig { config, secrets })
}
