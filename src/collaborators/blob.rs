//! Replay blob stores.
//!
//! Locators ending in `.zip` point at an archive whose first entry is the
//! replay; anything else is stored as plain text.

use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::BlobStore;

const ARCHIVE_SUFFIX: &str = ".zip";

fn is_archive(locator: &str) -> bool {
    locator.ends_with(ARCHIVE_SUFFIX)
}

/// First entry of a zip archive, as text.
pub fn unpack_archive(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).context("open replay archive")?;
    if archive.len() == 0 {
        anyhow::bail!("replay archive is empty");
    }
    let mut entry = archive.by_index(0).context("read replay archive entry")?;
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .context("replay archive entry is not text")?;
    Ok(content)
}

fn into_text(locator: &str, bytes: Vec<u8>) -> Result<String> {
    if is_archive(locator) {
        unpack_archive(&bytes)
    } else {
        String::from_utf8(bytes).with_context(|| format!("replay {} is not UTF-8", locator))
    }
}

/// Replays laid out under a local directory, one file per locator.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    async fn read(&self, locator: &str) -> Result<Option<String>> {
        let path = self.root.join(locator.trim_start_matches('/'));
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "replay not on disk");
                return Ok(None);
            }
            Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
        };
        into_text(locator, bytes).map(Some)
    }
}

/// Replays served over HTTP (an S3 bucket website or a CDN in front of it).
pub struct HttpBlobStore {
    client: Client,
    base_url: String,
}

impl HttpBlobStore {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build blob store HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl BlobStore for HttpBlobStore {
    async fn read(&self, locator: &str) -> Result<Option<String>> {
        let url = format!("{}/{}", self.base_url, locator.trim_start_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => {
                // S3 answers 403 for missing keys on buckets without list access
                debug!(url = %url, status = %response.status(), "replay not available");
                Ok(None)
            }
            status if !status.is_success() => {
                anyhow::bail!("blob store returned {} for {}", status, url)
            }
            _ => {
                let bytes = response.bytes().await.context("read replay body")?;
                into_text(locator, bytes.to_vec()).map(Some)
            }
        }
    }
}
