//! HTTP bucket publish target.
//!
//! `destination` is the bucket base URL. A single file is `PUT` to
//! `{destination}/{remote_path}`; a directory is walked in sorted order and every file
//! is `PUT` to `{destination}/{remote_path}/{relative/path}`. All transfers go through
//! the [`ChunkedStreamUploader`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::contract::{Credential, PublishTarget};
use crate::error::TransferError;
use crate::uploader::ChunkedStreamUploader;

pub struct BucketTarget {
    client: Client,
    uploader: ChunkedStreamUploader,
    credential: Credential,
}

impl BucketTarget {
    pub fn new(uploader: ChunkedStreamUploader, credential: Credential) -> Result<Self, TransferError> {
        Ok(Self {
            client: Client::builder().build()?,
            uploader,
            credential,
        })
    }
}

fn object_url(destination: &str, remote_path: &str) -> String {
    format!(
        "{}/{}",
        destination.trim_end_matches('/'),
        remote_path.trim_matches('/')
    )
}

/// Files below `root`, sorted, paired with their `/`-joined relative path.
fn collect_files(root: &Path) -> std::io::Result<Vec<(PathBuf, String)>> {
    fn visit(dir: &Path, root: &Path, out: &mut Vec<(PathBuf, String)>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                visit(&path, root, out)?;
            } else if path.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .map_err(|e| std::io::Error::other(e.to_string()))?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push((path, relative));
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    visit(root, root, &mut files)?;
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

#[async_trait]
impl PublishTarget for BucketTarget {
    async fn delete_existing(&self, destination: &str, remote_path: &str) -> Result<(), TransferError> {
        let url = object_url(destination, remote_path);
        let response = self
            .client
            .delete(&url)
            .bearer_auth(self.credential.expose())
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            info!(url = %url, "[PUBLISH] Deleted remote object");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransferError::Status {
            status_code: status.as_u16(),
            body,
        })
    }

    async fn upload(
        &self,
        local_path: &Path,
        destination: &str,
        remote_path: &str,
    ) -> Result<(), TransferError> {
        let meta = tokio::fs::metadata(local_path).await?;
        if !meta.is_dir() {
            let url = object_url(destination, remote_path);
            return self.uploader.upload(local_path, &url, &self.credential).await;
        }

        let root = local_path.to_path_buf();
        let files = tokio::task::spawn_blocking(move || collect_files(&root))
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))??;
        debug!(dir = %local_path.display(), files = files.len(), "[PUBLISH] Uploading directory");

        let prefix = object_url(destination, remote_path);
        for (path, relative) in files {
            let url = format!("{prefix}/{relative}");
            self.uploader.upload(&path, &url, &self.credential).await?;
        }
        Ok(())
    }
}
