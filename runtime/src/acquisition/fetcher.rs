//! Document fetching seam used by the crawler and the analyzer.

use super::http_client::HttpClient;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A successfully fetched HTML document.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub body: String,
    pub elapsed_ms: u64,
}

/// Fetches documents. Any error means "skip this page".
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument>;
}

/// Fetcher over the reqwest-backed [`HttpClient`].
pub struct HttpFetcher {
    client: HttpClient,
    timeout_ms: u64,
}

impl HttpFetcher {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            client: HttpClient::new(timeout_ms),
            timeout_ms,
        }
    }

    pub fn with_client(client: HttpClient, timeout_ms: u64) -> Self {
        Self { client, timeout_ms }
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument> {
        let resp = self.client.get(url, self.timeout_ms).await?;
        if !resp.is_success() {
            bail!("{url} returned HTTP {}", resp.status);
        }
        if !resp.looks_like_html() {
            bail!(
                "{url} is not an HTML document ({})",
                resp.content_type.as_deref().unwrap_or("unknown type")
            );
        }
        Ok(FetchedDocument {
            url: resp.url,
            final_url: resp.final_url,
            status: resp.status,
            body: resp.body,
            elapsed_ms: resp.elapsed_ms,
        })
    }
}

/// Serves documents from memory. Unknown URLs fail like a 404.
///
/// Keys are matched exactly, so register normalized URLs
/// (`https://example.com/`, `https://example.com/about`).
#[derive(Default)]
pub struct MemoryFetcher {
    pages: HashMap<String, String>,
    requests: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    /// Total number of fetch calls, successful or not.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DocumentFetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        match self.pages.get(url) {
            Some(body) => Ok(FetchedDocument {
                url: url.to_string(),
                final_url: url.to_string(),
                status: 200,
                body: body.clone(),
                elapsed_ms: 1,
            }),
            None => bail!("{url} returned HTTP 404"),
        }
    }
}
