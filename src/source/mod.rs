//! Document acquisition: http(s) URLs or local files.
//!
//! The source guarantees the full document is in memory before the staging
//! pipeline sees any of it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;
use url::Url;

/// Supplies raw document bytes for a location identifier.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>>;
}

/// Fetches http(s) URLs with reqwest and anything else from the filesystem.
pub struct FetchSource {
    client: reqwest::Client,
}

impl FetchSource {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for FetchSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentSource for FetchSource {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        match Url::parse(uri) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                debug!("fetching {}", url);
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .with_context(|| format!("requesting {url}"))?
                    .error_for_status()
                    .with_context(|| format!("requesting {url}"))?;
                let body = response
                    .bytes()
                    .await
                    .with_context(|| format!("reading response body of {url}"))?;
                Ok(body.to_vec())
            }
            _ => {
                debug!("reading local document {}", uri);
                std::fs::read(uri).with_context(|| format!("reading document {uri}"))
            }
        }
    }
}

/// Logical name of a document: the basename of its URI.
pub fn document_name(uri: &str) -> String {
    let trimmed = uri.trim_end_matches('/');
    let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
    if name.is_empty() {
        "document".to_string()
    } else {
        name.to_string()
    }
}
