use reqwest::Client;
use tracing::debug;
use url::Url;

use super::{DescriptorReader, LaunchDescriptor};
use crate::error::{LaunchError, LaunchResult};

/// Load a raw descriptor document from a `file://` or `http(s)://` location.
///
/// HTTP documents are collected in full before they are handed to a reader.
pub async fn load_document(client: &Client, location: &Url) -> LaunchResult<String> {
    match location.scheme() {
        "file" => {
            let path = location.to_file_path().map_err(|_| {
                LaunchError::Descriptor(format!("Invalid file location: {}", location))
            })?;
            debug!("Reading descriptor from {}", path.display());
            tokio::fs::read_to_string(&path).await.map_err(|e| {
                LaunchError::Descriptor(format!("Cannot read {}: {}", path.display(), e))
            })
        }
        "http" | "https" => {
            debug!("Fetching descriptor from {}", location);
            let response = client
                .get(location.clone())
                .send()
                .await
                .map_err(|e| LaunchError::Descriptor(format!("Cannot fetch {}: {}", location, e)))?;

            if !response.status().is_success() {
                return Err(LaunchError::Descriptor(format!(
                    "HTTP {} from {}",
                    response.status(),
                    location
                )));
            }

            response.text().await.map_err(|e| {
                LaunchError::Descriptor(format!("Cannot read body of {}: {}", location, e))
            })
        }
        other => Err(LaunchError::Descriptor(format!(
            "Unsupported descriptor scheme `{}`",
            other
        ))),
    }
}

/// Load and parse a descriptor, resolving relative resources against its location.
pub async fn read_descriptor(
    reader: &dyn DescriptorReader,
    client: &Client,
    location: &Url,
) -> LaunchResult<LaunchDescriptor> {
    let raw = load_document(client, location).await?;
    reader.parse(&raw, Some(location))
}
