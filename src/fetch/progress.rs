use tracing::{debug, info};

/// Observer for resource transfers.
///
/// The fetcher only reports byte counts; rendering them is up to the
/// implementation. Calls for different resources may interleave.
pub trait DownloadProgress: Send + Sync {
    /// A transfer is starting. `total` is the announced content length, if any.
    fn started(&self, _resource: &str, _total: Option<u64>) {}

    /// `downloaded` bytes of the resource have been written so far.
    fn advanced(&self, _resource: &str, _downloaded: u64) {}

    /// The resource is available locally.
    fn finished(&self, _resource: &str, _from_cache: bool) {}
}

/// Ignores all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl DownloadProgress for NoProgress {}

/// Reports transfers through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl DownloadProgress for LogProgress {
    fn started(&self, resource: &str, total: Option<u64>) {
        match total {
            Some(total) => info!("Downloading {} ({} bytes)...", resource, total),
            None => info!("Downloading {}...", resource),
        }
    }

    fn finished(&self, resource: &str, from_cache: bool) {
        if from_cache {
            debug!("{} served from cache", resource);
        } else {
            debug!("{} downloaded", resource);
        }
    }
}
