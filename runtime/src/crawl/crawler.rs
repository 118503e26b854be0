//! Bounded breadth-first site discovery.

use super::backlinks::{self, LinkSet};
use super::{classifier, links, urls};
use crate::acquisition::{extract_snapshot, DocumentFetcher};
use crate::error::AuditResult;
use crate::model::{CrawlMetadata, PageType};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// One page found by [`Crawler::discover`].
#[derive(Debug, Clone, Serialize)]
pub struct CrawledPage {
    pub url: String,
    pub page_type: PageType,
    pub metadata: CrawlMetadata,
    /// Normalized same-site outbound links.
    pub links: Vec<String>,
}

impl CrawledPage {
    pub fn link_set(&self) -> LinkSet {
        LinkSet {
            url: self.url.clone(),
            links: self.links.clone(),
        }
    }
}

pub struct Crawler {
    fetcher: Arc<dyn DocumentFetcher>,
    concurrency: usize,
}

impl Crawler {
    pub fn new(fetcher: Arc<dyn DocumentFetcher>, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Discover up to `max_pages` pages reachable from `seed` within
    /// `max_depth` link hops, in discovery order.
    ///
    /// The worklist is processed one depth level at a time. A URL enters the
    /// visited set when it is enqueued, so a page that later fails to fetch
    /// still uses up one slot of `max_pages`. Failed fetches are logged and
    /// skipped.
    pub async fn discover(
        &self,
        seed: &str,
        max_depth: u32,
        max_pages: usize,
    ) -> AuditResult<Vec<CrawledPage>> {
        let start = Instant::now();
        let seed = urls::normalize_seed(seed)?;
        info!(seed = %seed, max_depth, max_pages, "crawl started");

        let mut pages = Vec::new();
        if max_pages == 0 {
            return Ok(pages);
        }

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(seed.to_string());
        let mut frontier = vec![seed.to_string()];
        let mut depth = 0u32;

        while !frontier.is_empty() && depth <= max_depth {
            let level = std::mem::take(&mut frontier);
            debug!(depth, pages = level.len(), "crawling level");

            let fetched: Vec<Option<CrawledPage>> = stream::iter(level)
                .map(|url| self.visit(url, depth))
                .buffered(self.concurrency)
                .collect()
                .await;

            for page in fetched.into_iter().flatten() {
                if depth < max_depth {
                    for link in &page.links {
                        if visited.len() >= max_pages {
                            break;
                        }
                        if visited.insert(link.clone()) {
                            frontier.push(link.clone());
                        }
                    }
                }
                pages.push(page);
            }
            depth += 1;
        }

        info!(
            pages = pages.len(),
            visited = visited.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "crawl finished"
        );
        Ok(pages)
    }

    /// Re-fetch every page and rebuild its link set. A page that fails keeps
    /// an empty set, so it still receives inbound counts.
    pub async fn refetch_link_sets(&self, pages: &[CrawledPage]) -> Vec<LinkSet> {
        stream::iter(pages.iter().map(|p| p.url.clone()))
            .map(|url| async move {
                match self.fetcher.fetch(&url).await {
                    Ok(doc) => {
                        let links = link_targets(&url, &doc.final_url, &doc.body);
                        LinkSet { url, links }
                    }
                    Err(e) => {
                        warn!(url = %url, error = %e, "backlink refetch failed");
                        LinkSet {
                            url,
                            links: Vec::new(),
                        }
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn visit(&self, url: String, depth: u32) -> Option<CrawledPage> {
        match self.fetcher.fetch(&url).await {
            Ok(doc) => inspect(&url, &doc.final_url, &doc.body, depth),
            Err(e) => {
                warn!(url = %url, error = %e, "skipping page");
                None
            }
        }
    }
}

/// Fill in inbound-link counts from the crawl's own link sets.
pub fn apply_backlinks(pages: &mut [CrawledPage], sets: &[LinkSet]) {
    let counts = backlinks::calculate_backlinks(sets);
    for page in pages.iter_mut() {
        page.metadata.inbound_links = counts.get(&page.url).copied().unwrap_or(0);
    }
}

/// Classify and summarize a fetched body. Links resolve against the final
/// URL so redirects do not break relative paths.
fn inspect(url: &str, final_url: &str, body: &str, depth: u32) -> Option<CrawledPage> {
    let page_url = Url::parse(url).ok()?;
    let base = Url::parse(final_url).unwrap_or_else(|_| page_url.clone());
    let snapshot = extract_snapshot(body);

    let page_type = classifier::classify(&page_url, &snapshot);
    let links = links::outbound_links(&snapshot.links, &base, &page_url)
        .into_iter()
        .filter(|l| l != url)
        .collect();

    Some(CrawledPage {
        url: url.to_string(),
        page_type,
        metadata: CrawlMetadata {
            depth,
            title: snapshot.title.clone(),
            heading_count: snapshot.headings.len() as u32,
            form_count: snapshot.forms.len() as u32,
            button_count: snapshot.buttons.len() as u32,
            inbound_links: 0,
            word_count: snapshot.word_count,
            has_navigation: snapshot.has_navigation,
        },
        links,
    })
}

fn link_targets(url: &str, final_url: &str, body: &str) -> Vec<String> {
    let Ok(page_url) = Url::parse(url) else {
        return Vec::new();
    };
    let base = Url::parse(final_url).unwrap_or_else(|_| page_url.clone());
    let snapshot = extract_snapshot(body);
    links::outbound_links(&snapshot.links, &base, &page_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::MemoryFetcher;

    fn site() -> MemoryFetcher {
        MemoryFetcher::new()
            .with_page(
                "https://example.com/",
                r#"<a href="/a">A</a><a href="/b">B</a><a href="/c">C</a>"#,
            )
            .with_page("https://example.com/a", r#"<a href="/a/deep">deep</a>"#)
            .with_page("https://example.com/b", r#"<a href="/">home</a>"#)
            .with_page("https://example.com/a/deep", "<p>deep</p>")
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let crawler = Crawler::new(Arc::new(site()), 2);
        let pages = crawler.discover("example.com", 0, 10).await.unwrap();
        assert_eq!(pages.len(), 1);

        let pages = crawler.discover("example.com", 1, 10).await.unwrap();
        let urls: Vec<&str> = pages.iter().map(|p| p.url.as_str()).collect();
        // /c is not served and is skipped
        assert_eq!(
            urls,
            vec![
                "https://example.com/",
                "https://example.com/a",
                "https://example.com/b"
            ]
        );
        assert!(pages.iter().all(|p| p.metadata.depth <= 1));
    }

    #[tokio::test]
    async fn test_page_limit_and_no_duplicates() {
        let fetcher = Arc::new(site());
        let crawler = Crawler::new(fetcher.clone(), 2);
        let pages = crawler.discover("https://example.com", 5, 2).await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(fetcher.request_count(), 2);

        let pages = crawler.discover("https://example.com", 5, 50).await.unwrap();
        let unique: HashSet<&str> = pages.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(unique.len(), pages.len());
        assert_eq!(pages.len(), 4);
    }

    #[tokio::test]
    async fn test_www_variant_is_one_page() {
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .with_page(
                    "https://example.com/",
                    r#"<a href="/a">A</a><a href="https://www.example.com/a">A again</a>"#,
                )
                .with_page(
                    "https://example.com/a",
                    r#"<a href="https://www.example.com/">home</a>"#,
                ),
        );
        let crawler = Crawler::new(fetcher.clone(), 2);
        let mut pages = crawler.discover("example.com", 2, 10).await.unwrap();
        let urls: Vec<&str> = pages.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/", "https://example.com/a"]);
        assert_eq!(fetcher.request_count(), 2);

        let sets: Vec<LinkSet> = pages.iter().map(CrawledPage::link_set).collect();
        apply_backlinks(&mut pages, &sets);
        assert_eq!(pages[0].metadata.inbound_links, 1);
        assert_eq!(pages[1].metadata.inbound_links, 1);
    }

    #[tokio::test]
    async fn test_unreachable_seed_yields_nothing() {
        let crawler = Crawler::new(Arc::new(MemoryFetcher::new()), 2);
        let pages = crawler.discover("example.com", 2, 10).await.unwrap();
        assert!(pages.is_empty());
    }

    #[tokio::test]
    async fn test_refetch_matches_reused_link_sets() {
        let fetcher = Arc::new(site());
        let crawler = Crawler::new(fetcher, 2);
        let mut pages = crawler.discover("example.com", 2, 10).await.unwrap();

        let reused: Vec<LinkSet> = pages.iter().map(CrawledPage::link_set).collect();
        let refetched = crawler.refetch_link_sets(&pages).await;
        assert_eq!(
            backlinks::calculate_backlinks(&reused),
            backlinks::calculate_backlinks(&refetched)
        );

        apply_backlinks(&mut pages, &reused);
        let home = &pages[0];
        assert_eq!(home.metadata.inbound_links, 1);
    }
}
