//! HTTP source backends.
//!
//! Both backends list a repository, keep the files matching the request's allow
//! pattern and stream each one to disk below the staging directory, preserving the
//! repository layout. Listing or download errors abort the snapshot; the fetcher then
//! falls through to the next backend.
//!
//! - [`HubMirrorBackend`]: HuggingFace-style hub (`/api/models/{repo}/tree/...`,
//!   `/{repo}/resolve/...`). Used for the mirrors, where artifacts live in sub-folders
//!   of one shared repository.
//! - [`ModelScopeBackend`]: ModelScope-style origin (`/api/v1/models/{id}/repo/files`,
//!   `/api/v1/models/{id}/repo?FilePath=...`), one repository per artifact.

use std::path::{Component, Path};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::contract::{Credential, SnapshotRequest, SourceBackend};
use crate::error::BackendError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Translate a shell-style glob (`*`, `?`) into an anchored regex. `*` crosses `/`.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, BackendError> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|source| BackendError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Literal directory prefix of a glob, e.g. `models/vad` for `models/vad/*`.
fn literal_dir_prefix(pattern: &str) -> Option<&str> {
    let literal_end = pattern.find(['*', '?']).unwrap_or(pattern.len());
    let literal = &pattern[..literal_end];
    literal.rfind('/').map(|idx| &literal[..idx]).filter(|p| !p.is_empty())
}

fn select_files(
    paths: impl IntoIterator<Item = String>,
    allow_pattern: Option<&str>,
) -> Result<Vec<String>, BackendError> {
    let matcher = allow_pattern.map(glob_to_regex).transpose()?;
    Ok(paths
        .into_iter()
        .filter(|p| matcher.as_ref().map_or(true, |m| m.is_match(p)))
        .collect())
}

fn with_token(builder: RequestBuilder, token: Option<&Credential>) -> RequestBuilder {
    match token {
        Some(token) => builder.bearer_auth(token.expose()),
        None => builder,
    }
}

fn build_client() -> Result<Client, BackendError> {
    Ok(Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?)
}

/// Stream one response body into `destination/repo_path`.
async fn download_file(
    request: RequestBuilder,
    destination: &Path,
    repo_path: &str,
) -> Result<u64, BackendError> {
    let relative = Path::new(repo_path);
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(BackendError::Other(format!(
            "refusing unsafe repository path {repo_path:?}"
        )));
    }
    let target = destination.join(relative);
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(BackendError::Status {
            status_code: status.as_u16(),
            url: response.url().to_string(),
        });
    }

    let mut file = tokio::fs::File::create(&target).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    debug!(path = %target.display(), bytes = written, "[FETCH] Wrote file");
    Ok(written)
}

#[derive(Debug, Deserialize)]
struct HubTreeEntry {
    #[serde(rename = "type")]
    kind: String,
    path: String,
}

/// HuggingFace-style hub mirror.
pub struct HubMirrorBackend {
    client: Client,
    endpoint: String,
    revision: String,
    token: Option<Credential>,
}

impl HubMirrorBackend {
    pub const DEFAULT_ENDPOINT: &'static str = "https://huggingface.co";

    pub fn new(endpoint: impl Into<String>, token: Option<Credential>) -> Result<Self, BackendError> {
        Ok(Self {
            client: build_client()?,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            revision: "main".to_string(),
            token,
        })
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    async fn list_files(&self, repo: &str, allow_pattern: Option<&str>) -> Result<Vec<String>, BackendError> {
        let mut url = format!("{}/api/models/{}/tree/{}", self.endpoint, repo, self.revision);
        if let Some(prefix) = allow_pattern.and_then(literal_dir_prefix) {
            url.push('/');
            url.push_str(prefix);
        }
        let response = with_token(self.client.get(&url), self.token.as_ref())
            .query(&[("recursive", "true")])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                status_code: status.as_u16(),
                url,
            });
        }
        let entries: Vec<HubTreeEntry> = response.json().await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.kind == "file")
            .map(|e| e.path)
            .collect())
    }
}

#[async_trait]
impl SourceBackend for HubMirrorBackend {
    async fn snapshot_download(&self, request: &SnapshotRequest) -> Result<(), BackendError> {
        let pattern = request.allow_pattern.as_deref();
        let listed = self.list_files(&request.locator, pattern).await?;
        let files = select_files(listed, pattern)?;
        if files.is_empty() {
            return Err(BackendError::NothingMatched {
                locator: request.locator.clone(),
            });
        }
        info!(repo = %request.locator, files = files.len(), "[FETCH] Hub snapshot listing");

        for path in &files {
            let url = format!(
                "{}/{}/resolve/{}/{}",
                self.endpoint, request.locator, self.revision, path
            );
            let get = with_token(self.client.get(&url), self.token.as_ref());
            download_file(get, &request.destination, path).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ModelScopeListing {
    data: ModelScopeData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ModelScopeData {
    #[serde(default)]
    files: Vec<ModelScopeFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ModelScopeFile {
    path: String,
    #[serde(rename = "Type")]
    kind: String,
}

/// ModelScope-style origin.
pub struct ModelScopeBackend {
    client: Client,
    endpoint: String,
    revision: String,
    token: Option<Credential>,
}

impl ModelScopeBackend {
    pub const DEFAULT_ENDPOINT: &'static str = "https://modelscope.cn";

    pub fn new(endpoint: impl Into<String>, token: Option<Credential>) -> Result<Self, BackendError> {
        Ok(Self {
            client: build_client()?,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            revision: "master".to_string(),
            token,
        })
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    async fn list_files(&self, model_id: &str) -> Result<Vec<String>, BackendError> {
        let url = format!("{}/api/v1/models/{}/repo/files", self.endpoint, model_id);
        let response = with_token(self.client.get(&url), self.token.as_ref())
            .query(&[("Revision", self.revision.as_str()), ("Recursive", "true")])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                status_code: status.as_u16(),
                url,
            });
        }
        let listing: ModelScopeListing = response.json().await?;
        Ok(listing
            .data
            .files
            .into_iter()
            .filter(|f| f.kind != "tree")
            .map(|f| f.path)
            .collect())
    }
}

#[async_trait]
impl SourceBackend for ModelScopeBackend {
    async fn snapshot_download(&self, request: &SnapshotRequest) -> Result<(), BackendError> {
        let listed = self.list_files(&request.locator).await?;
        let files = select_files(listed, request.allow_pattern.as_deref())?;
        if files.is_empty() {
            return Err(BackendError::NothingMatched {
                locator: request.locator.clone(),
            });
        }
        info!(model = %request.locator, files = files.len(), "[FETCH] ModelScope snapshot listing");

        let url = format!("{}/api/v1/models/{}/repo", self.endpoint, request.locator);
        for path in &files {
            let get = with_token(self.client.get(&url), self.token.as_ref()).query(&[
                ("Revision", self.revision.as_str()),
                ("FilePath", path.as_str()),
            ]);
            download_file(get, &request.destination, path).await?;
        }
        Ok(())
    }
}
