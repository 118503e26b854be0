//! Plain HTTP document retrieval over reqwest.
//!
//! Server errors are retried and 429 responses back off before the next
//! attempt.

use anyhow::Result;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use std::time::{Duration, Instant};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Funnelscope/0.1";
const MAX_REDIRECTS: usize = 5;
const BASE_DELAY_MS: u64 = 500;
const DEFAULT_RETRY_AFTER_SECS: u64 = 2;
const MAX_RETRY_AFTER_SECS: u64 = 10;

/// One completed GET.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// URL as requested.
    pub url: String,
    /// URL after redirects.
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
    /// Wall time of the attempt that produced this response.
    pub elapsed_ms: u64,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True when the server did not say it is something other than HTML.
    pub fn looks_like_html(&self) -> bool {
        self.content_type.as_deref().map_or(true, |ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("html") || ct.contains("xml") || ct.starts_with("text/plain")
        })
    }
}

/// How long to wait before retrying a response, or `None` to keep it.
fn retry_delay(status: u16, attempt: u32, retry_after: Option<&str>) -> Option<Duration> {
    match status {
        429 => {
            let secs = retry_after
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            Some(Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)))
        }
        500..=599 => Some(exponential(attempt)),
        _ => None,
    }
}

fn exponential(attempt: u32) -> Duration {
    Duration::from_millis(BASE_DELAY_MS << attempt.min(6))
}

/// Errors that suggest the server mishandled HTTP/2.
fn is_protocol_error(e: &anyhow::Error) -> bool {
    let text = e.to_string();
    ["http2", "protocol", "connection closed"]
        .iter()
        .any(|needle| text.contains(needle))
}

/// HTTP client used by the fetcher.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    /// HTTP/1.1-only client for hosts that reject HTTP/2.
    fallback: reqwest::Client,
    max_retries: u32,
}

impl HttpClient {
    pub fn new(timeout_ms: u64) -> Self {
        let builder = || {
            reqwest::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
                .user_agent(USER_AGENT)
        };
        Self {
            client: builder().build().unwrap_or_default(),
            fallback: builder().http1_only().build().unwrap_or_default(),
            max_retries: 2,
        }
    }

    /// Disable retries; used where the caller has its own deadline.
    pub fn without_retries(mut self) -> Self {
        self.max_retries = 0;
        self
    }

    /// GET `url`, retrying server errors and rate limits, then once more
    /// over HTTP/1.1 if the first client failed at the protocol level.
    pub async fn get(&self, url: &str, timeout_ms: u64) -> Result<HttpResponse> {
        let timeout = Duration::from_millis(timeout_ms);
        match self.get_with(&self.client, url, timeout).await {
            Err(e) if is_protocol_error(&e) => {
                tracing::debug!(url, "retrying over HTTP/1.1");
                self.get_with(&self.fallback, url, timeout).await
            }
            other => other,
        }
    }

    async fn get_with(
        &self,
        client: &reqwest::Client,
        url: &str,
        timeout: Duration,
    ) -> Result<HttpResponse> {
        let mut attempt = 0u32;
        loop {
            let started = Instant::now();
            let response = match client.get(url).timeout(timeout).send().await {
                Ok(response) => response,
                Err(e) if attempt < self.max_retries && !e.is_builder() => {
                    tokio::time::sleep(exponential(attempt)).await;
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status().as_u16();
            if attempt < self.max_retries {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok());
                if let Some(delay) = retry_delay(status, attempt, retry_after) {
                    tracing::debug!(url, status, attempt, "retrying request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let final_url = response.url().to_string();
            let body = response.text().await.unwrap_or_default();

            return Ok(HttpResponse {
                url: url.to_string(),
                final_url,
                status,
                content_type,
                body,
                elapsed_ms: started.elapsed().as_millis() as u64,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, content_type: Option<&str>) -> HttpResponse {
        HttpResponse {
            url: "https://example.com".to_string(),
            final_url: "https://example.com/".to_string(),
            status,
            content_type: content_type.map(String::from),
            body: String::new(),
            elapsed_ms: 0,
        }
    }

    #[test]
    fn test_success_range() {
        assert!(response(200, None).is_success());
        assert!(response(204, None).is_success());
        assert!(!response(301, None).is_success());
        assert!(!response(404, None).is_success());
    }

    #[test]
    fn test_looks_like_html() {
        assert!(response(200, Some("text/html; charset=utf-8")).looks_like_html());
        assert!(response(200, None).looks_like_html());
        assert!(!response(200, Some("application/pdf")).looks_like_html());
        assert!(!response(200, Some("image/png")).looks_like_html());
    }

    #[test]
    fn test_retry_delay() {
        assert_eq!(retry_delay(200, 0, None), None);
        assert_eq!(retry_delay(404, 0, None), None);
        assert_eq!(retry_delay(503, 0, None), Some(Duration::from_millis(500)));
        assert_eq!(retry_delay(503, 1, None), Some(Duration::from_millis(1000)));
        assert_eq!(retry_delay(429, 0, Some("3")), Some(Duration::from_secs(3)));
        assert_eq!(retry_delay(429, 0, Some("600")), Some(Duration::from_secs(10)));
        assert_eq!(retry_delay(429, 0, Some("soon")), Some(Duration::from_secs(2)));
    }
}
