//! Resource fetching with size-based caching.
//!
//! A resource whose local file already has the byte size announced by the
//! server is treated as cached and is not transferred again. This is a size
//! heuristic only: a remote file replaced by different content of the same
//! length is still considered cached.

pub mod progress;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::{Client, Response};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::descriptor::ResourceRef;
use crate::error::{LaunchError, LaunchResult};

pub use progress::{DownloadProgress, LogProgress, NoProgress};

/// A resource available on local disk for the duration of one launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    pub name: String,
    pub local_path: PathBuf,
    pub byte_length: u64,
    pub from_cache: bool,
}

/// Downloads resources into a target directory.
///
/// All transfers observe the cancellation token handed in at construction;
/// once it fires, in-flight requests are dropped and fail with
/// [`LaunchError::Aborted`].
pub struct ResourceFetcher {
    client: Client,
    cancel: CancellationToken,
    progress: Arc<dyn DownloadProgress>,
}

impl ResourceFetcher {
    pub fn new(client: Client, cancel: CancellationToken) -> Self {
        Self {
            client,
            cancel,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn DownloadProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Fetch a single resource to `target_dir/<name>`.
    pub async fn fetch(
        &self,
        resource: &ResourceRef,
        target_dir: &Path,
    ) -> LaunchResult<CachedArtifact> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("Fetch of {} cancelled", resource.name);
                Err(LaunchError::Aborted)
            }
            result = self.transfer(resource, target_dir) => result,
        }
    }

    /// Fetch every resource concurrently.
    ///
    /// All transfers run to completion even when one of them fails, so siblings
    /// that succeeded stay on disk for the next attempt. The first failure to
    /// occur is returned. On success the artifacts are in declaration order.
    pub async fn fetch_all(
        &self,
        resources: &[ResourceRef],
        target_dir: &Path,
    ) -> LaunchResult<Vec<CachedArtifact>> {
        let mut pending: FuturesUnordered<_> = resources
            .iter()
            .enumerate()
            .map(|(index, resource)| async move { (index, self.fetch(resource, target_dir).await) })
            .collect();

        let mut artifacts: Vec<Option<CachedArtifact>> =
            (0..resources.len()).map(|_| None).collect();
        let mut first_error = None;

        while let Some((index, result)) = pending.next().await {
            match result {
                Ok(artifact) => artifacts[index] = Some(artifact),
                Err(e) if first_error.is_none() => {
                    warn!("Fetching {} failed: {}", resources[index].name, e);
                    first_error = Some(e);
                }
                Err(e) => debug!("Fetching {} also failed: {}", resources[index].name, e),
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        artifacts
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| LaunchError::Internal("fetch finished without an artifact".to_string()))
    }

    async fn transfer(
        &self,
        resource: &ResourceRef,
        target_dir: &Path,
    ) -> LaunchResult<CachedArtifact> {
        let target = target_dir.join(&resource.name);
        let cached_len = cached_length(&target).await;

        if resource.url.scheme() == "file" {
            return self.copy_local(resource, target, cached_len).await;
        }

        let response = self
            .client
            .get(resource.url.clone())
            .send()
            .await
            .map_err(|e| LaunchError::download(&resource.name, e))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(LaunchError::download(
                &resource.name,
                format!("HTTP {} from {}", status, resource.url),
            ));
        }

        let content_length = response.content_length();
        if content_length.is_some() && content_length == cached_len {
            debug!(
                "Cached version of {} found at {}, skipping download",
                resource.name,
                target.display()
            );
            // Dropping the response aborts the transfer.
            drop(response);
            self.progress.finished(&resource.name, true);
            return Ok(CachedArtifact {
                name: resource.name.clone(),
                local_path: target,
                byte_length: content_length.unwrap_or_default(),
                from_cache: true,
            });
        }

        ensure_parent(&resource.name, &target).await?;
        let mut file = File::create(&target).await.map_err(|e| {
            LaunchError::download(
                &resource.name,
                format!("cannot create {}: {}", target.display(), e),
            )
        })?;

        self.progress.started(&resource.name, content_length);
        let streamed = self
            .stream_body(&resource.name, response, &mut file, content_length)
            .await;
        drop(file);
        let byte_length = streamed?;

        self.progress.finished(&resource.name, false);
        Ok(CachedArtifact {
            name: resource.name.clone(),
            local_path: target,
            byte_length,
            from_cache: false,
        })
    }

    async fn stream_body(
        &self,
        name: &str,
        mut response: Response,
        file: &mut File,
        expected: Option<u64>,
    ) -> LaunchResult<u64> {
        let mut downloaded: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| LaunchError::download(name, e))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| LaunchError::download(name, format!("write failed: {}", e)))?;
            downloaded += chunk.len() as u64;
            self.progress.advanced(name, downloaded);
        }

        file.flush()
            .await
            .map_err(|e| LaunchError::download(name, format!("write failed: {}", e)))?;

        match expected {
            Some(expected) if expected != downloaded => Err(LaunchError::download(
                name,
                format!("received {} of {} bytes", downloaded, expected),
            )),
            _ => Ok(downloaded),
        }
    }

    /// `file://` resources are copied, with the same size check as downloads.
    async fn copy_local(
        &self,
        resource: &ResourceRef,
        target: PathBuf,
        cached_len: Option<u64>,
    ) -> LaunchResult<CachedArtifact> {
        let source = resource.url.to_file_path().map_err(|_| {
            LaunchError::download(&resource.name, format!("invalid file location {}", resource.url))
        })?;
        let source_len = tokio::fs::metadata(&source)
            .await
            .map_err(|e| LaunchError::download(&resource.name, e))?
            .len();

        let same_file = match (
            tokio::fs::canonicalize(&source).await,
            tokio::fs::canonicalize(&target).await,
        ) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };

        if same_file || cached_len == Some(source_len) {
            debug!("Using {} from {}", resource.name, target.display());
            self.progress.finished(&resource.name, true);
            return Ok(CachedArtifact {
                name: resource.name.clone(),
                local_path: target,
                byte_length: source_len,
                from_cache: true,
            });
        }

        ensure_parent(&resource.name, &target).await?;
        self.progress.started(&resource.name, Some(source_len));
        let copied = tokio::fs::copy(&source, &target)
            .await
            .map_err(|e| LaunchError::download(&resource.name, e))?;
        self.progress.advanced(&resource.name, copied);
        self.progress.finished(&resource.name, false);

        Ok(CachedArtifact {
            name: resource.name.clone(),
            local_path: target,
            byte_length: copied,
            from_cache: false,
        })
    }
}

/// Size of an existing, non-empty regular file at `path`.
async fn cached_length(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .filter(|meta| meta.is_file() && meta.len() > 0)
        .map(|meta| meta.len())
}

async fn ensure_parent(name: &str, target: &Path) -> LaunchResult<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            LaunchError::download(name, format!("cannot create {}: {}", parent.display(), e))
        })?;
    }
    Ok(())
}
