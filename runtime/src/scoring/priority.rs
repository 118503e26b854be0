//! Page priority scoring: fixed for the homepage, AI when available,
//! heuristic otherwise.

use crate::llm::Assistant;
use crate::model::{CrawlMetadata, DiscoveredPage, PageType, ScoreSource, Scored};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;
use tracing::debug;

pub const SCORE_SYSTEM_PROMPT: &str = "You rate how important a web page is for a site's \
conversion funnel. Reply with a JSON object {\"score\": n} where n is an integer from 0 to 100.";

pub const REASONING_SYSTEM_PROMPT: &str = "You explain, in two or three sentences, why a set of \
pages was prioritized for a conversion audit.";

/// Base score per page type before adjustments.
pub fn base_score(page_type: PageType) -> i32 {
    match page_type {
        PageType::Homepage => 100,
        PageType::Pricing | PageType::Checkout => 95,
        PageType::Product => 90,
        PageType::Landing => 85,
        PageType::Contact => 70,
        PageType::About => 50,
        PageType::Blog => 40,
        PageType::Other => 30,
    }
}

/// Deterministic fallback score.
///
/// `base − 10·depth + 5·forms + 2·buttons + 10·has_navigation`, clamped to
/// 0..=100. The weights are a documented default, not a tuned model.
pub fn heuristic_score(page_type: PageType, meta: &CrawlMetadata) -> u8 {
    let raw = base_score(page_type) as i64 - 10 * meta.depth as i64
        + 5 * meta.form_count as i64
        + 2 * meta.button_count as i64
        + if meta.has_navigation { 10 } else { 0 };
    raw.clamp(0, 100) as u8
}

#[derive(Deserialize)]
struct ScoreReply {
    score: serde_json::Number,
}

impl ScoreReply {
    fn valid(&self) -> Option<u8> {
        let value = match self.score.as_i64() {
            Some(v) => v as f64,
            None => self.score.as_f64()?.round(),
        };
        (0.0..=100.0).contains(&value).then_some(value as u8)
    }
}

pub struct PriorityScorer {
    assistant: Assistant,
}

impl PriorityScorer {
    pub fn new(assistant: Assistant) -> Self {
        Self { assistant }
    }

    /// Score one page. The homepage is always `Fixed(100)` without an AI call.
    pub async fn score(&self, page: &DiscoveredPage) -> Scored {
        if page.page_type == PageType::Homepage {
            return Scored {
                source: ScoreSource::Fixed,
                value: 100,
            };
        }

        let meta = &page.metadata;
        let prompt = json!({
            "url": page.url,
            "page_type": page.page_type,
            "depth": meta.depth,
            "form_count": meta.form_count,
            "button_count": meta.button_count,
            "word_count": meta.word_count,
            "has_navigation": meta.has_navigation,
        })
        .to_string();

        let ai = self
            .assistant
            .ask_json::<ScoreReply>(SCORE_SYSTEM_PROMPT, &prompt)
            .await
            .and_then(|r| r.valid());

        match ai {
            Some(value) => Scored {
                source: ScoreSource::Ai,
                value,
            },
            None => {
                let value = heuristic_score(page.page_type, meta);
                debug!(url = %page.url, value, "heuristic priority score");
                Scored {
                    source: ScoreSource::Heuristic,
                    value,
                }
            }
        }
    }

    /// Narrative over the `top_n` best-scored pages.
    ///
    /// Returned to the caller; the scorer keeps no state between calls.
    pub async fn reasoning(&self, pages: &[DiscoveredPage], top_n: usize) -> String {
        let top = top_pages(pages, top_n);
        if top.is_empty() {
            return "No pages were prioritized.".to_string();
        }

        let listing: Vec<_> = top
            .iter()
            .map(|p| {
                json!({
                    "url": p.url,
                    "page_type": p.page_type,
                    "score": p.score(),
                    "inbound_links": p.metadata.inbound_links,
                })
            })
            .collect();
        let prompt = serde_json::Value::Array(listing).to_string();

        match self.assistant.ask_text(REASONING_SYSTEM_PROMPT, &prompt).await {
            Some(text) => text,
            None => fallback_reasoning(&top),
        }
    }
}

/// Pages sorted by score descending, ties by URL.
pub fn top_pages(pages: &[DiscoveredPage], top_n: usize) -> Vec<&DiscoveredPage> {
    let mut sorted: Vec<&DiscoveredPage> = pages.iter().filter(|p| p.priority.is_some()).collect();
    sorted.sort_by(|a, b| b.score().cmp(&a.score()).then_with(|| a.url.cmp(&b.url)));
    sorted.truncate(top_n);
    sorted
}

pub fn fallback_reasoning(top: &[&DiscoveredPage]) -> String {
    let types: BTreeSet<PageType> = top.iter().map(|p| p.page_type).collect();
    let names: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
    format!(
        "Prioritized {} pages spanning {} page types: {}.",
        top.len(),
        types.len(),
        names.join(", ")
    )
}
