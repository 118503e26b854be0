//! Per-page analysis: data collection, metrics, micro-tests, adaptive tests,
//! summary, and catalog evaluation.
//!
//! Parsing happens in [`parse_page`], a synchronous function that drops the
//! `scraper::Html` before any await point. Everything after that works on
//! owned data.

pub mod adaptive;
pub mod catalog;
pub mod contrast;
pub mod cta;
pub mod metrics;
pub mod summary;

use crate::acquisition::structured::snapshot_from_document;
use crate::acquisition::{DocumentFetcher, PageSnapshot};
use crate::capture::{capture_devices, ScreenshotCapture};
use crate::crawl::links::is_skipped_href;
use crate::llm::Assistant;
use crate::model::{
    CollectionStatus, DiscoveredPage, MicroTestOutcome, NewAdaptiveTest, PageData, PageType,
    PerformanceMetrics, TestDefinition,
};
use adaptive::AdaptiveFindings;
use anyhow::{Context, Result};
use metrics::PageMetrics;
use scraper::Html;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

pub use catalog::CatalogOutcome;

/// Everything produced for one page.
#[derive(Debug, Clone)]
pub struct PageAnalysis {
    pub data: PageData,
    pub collection_status: CollectionStatus,
    pub tests: Vec<NewAdaptiveTest>,
    pub catalog: Vec<CatalogOutcome>,
}

/// Owned results of parsing one document.
pub struct ParsedPage {
    pub snapshot: PageSnapshot,
    pub metrics: PageMetrics,
    pub micro_tests: Vec<MicroTestOutcome>,
    pub findings: AdaptiveFindings,
}

/// Parse once and run every pure check.
pub fn parse_page(url: &Url, html: &str) -> ParsedPage {
    let document = Html::parse_document(html);
    let snapshot = snapshot_from_document(&document);
    let findings = AdaptiveFindings::collect(&document, &snapshot);
    let metrics = metrics::collect_metrics(url, html, &snapshot, None);
    let micro_tests = micro_tests::run_micro_tests(url, &snapshot);
    ParsedPage {
        snapshot,
        metrics,
        micro_tests,
        findings,
    }
}

pub struct Analyzer {
    fetcher: Arc<dyn DocumentFetcher>,
    capture: Arc<dyn ScreenshotCapture>,
    assistant: Assistant,
    capture_timeout: Duration,
}

impl Analyzer {
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        capture: Arc<dyn ScreenshotCapture>,
        assistant: Assistant,
        capture_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            capture,
            assistant,
            capture_timeout,
        }
    }

    /// Analyze one page. Only a failed fetch is an error.
    ///
    /// `owner_context` holds the site owner's answers for this page and is
    /// passed to every AI prompt.
    pub async fn analyze(
        &self,
        page: &DiscoveredPage,
        owner_context: &[String],
        catalog: &[TestDefinition],
    ) -> Result<PageAnalysis> {
        let doc = self
            .fetcher
            .fetch(&page.url)
            .await
            .with_context(|| format!("failed to fetch {}", page.url))?;
        let url = Url::parse(&page.url).with_context(|| format!("invalid url {}", page.url))?;

        let parsed = parse_page(&url, &doc.body);
        let snap = &parsed.snapshot;

        let plan = adaptive::select_tests(&self.assistant, page.page_type, snap, owner_context).await;
        let tests = adaptive::execute(&plan, &parsed.findings);

        let screenshots = capture_devices(&*self.capture, &page.url, self.capture_timeout).await;
        let summary = summary::summarize(&self.assistant, page.page_type, snap, owner_context).await;

        let data = PageData {
            page_id: page.id,
            fonts: parsed.metrics.visual.fonts.clone(),
            colors: parsed.metrics.visual.colors.clone(),
            images: snap.images.clone(),
            scripts: snap.scripts.clone(),
            headings: snap.headings.clone(),
            links: absolute_links(&url, snap),
            meta_tags: snap.meta.clone(),
            performance: Some(PerformanceMetrics {
                response_time_ms: doc.elapsed_ms,
                html_bytes: doc.body.len(),
                script_count: snap.scripts.len() + snap.inline_script_count,
                stylesheet_count: snap.stylesheets.len(),
                image_count: snap.images.len(),
            }),
            metrics: serde_json::to_value(&parsed.metrics).ok(),
            micro_tests: parsed.micro_tests.clone(),
            summary: Some(summary),
            screenshots,
            raw_html: doc.body,
        };

        let catalog = catalog::evaluate_catalog(&self.assistant, catalog, &data, snap).await;
        let collection_status = if data.is_complete() {
            CollectionStatus::Complete
        } else {
            CollectionStatus::Partial
        };

        info!(
            url = %page.url,
            tests = tests.len(),
            status = %collection_status,
            "page analyzed"
        );

        Ok(PageAnalysis {
            data,
            collection_status,
            tests,
            catalog,
        })
    }
}

/// Pages to analyze: the homepage plus the `limit - 1` other pages with the
/// most inbound links. Ties go to the higher priority score, then the URL.
pub fn select_analysis_pages(pages: &[DiscoveredPage], limit: usize) -> Vec<&DiscoveredPage> {
    if limit == 0 {
        return Vec::new();
    }
    let mut selected: Vec<&DiscoveredPage> = pages
        .iter()
        .filter(|p| p.page_type == PageType::Homepage)
        .take(1)
        .collect();

    let mut others: Vec<&DiscoveredPage> = pages
        .iter()
        .filter(|p| !selected.iter().any(|s| s.id == p.id))
        .collect();
    others.sort_by(|a, b| {
        b.metadata
            .inbound_links
            .cmp(&a.metadata.inbound_links)
            .then_with(|| b.score().cmp(&a.score()))
            .then_with(|| a.url.cmp(&b.url))
    });

    let room = limit - selected.len();
    selected.extend(others.into_iter().take(room));
    selected
}

/// Every navigable link on the page, resolved against the page URL.
fn absolute_links(url: &Url, snap: &PageSnapshot) -> Vec<String> {
    snap.links
        .iter()
        .filter(|l| !is_skipped_href(&l.href))
        .filter_map(|l| url.join(&l.href).ok())
        .map(|u| u.to_string())
        .collect()
}
