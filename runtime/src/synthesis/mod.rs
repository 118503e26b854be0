//! Results synthesis: turn adaptive test results into prioritized insights,
//! an executive summary, and an overall health score.

pub mod insights;

use crate::llm::Assistant;
use crate::model::{AdaptiveTest, PageType, Priority};
use insights::{dedupe, fallback_insights, overall_score};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

pub use insights::Insight;

pub const INSIGHT_SYSTEM_PROMPT: &str = "You are a conversion-rate consultant turning automated \
test results into findings. Reply with JSON {\"insights\": [{\"issue\": short title, \
\"impact\": effect on conversions, \"recommendation\": concrete fix, \"priority\": \
\"critical\" | \"high\" | \"medium\"}]}.";

pub const EXECUTIVE_SYSTEM_PROMPT: &str = "You write the executive summary of a website \
conversion audit for a busy site owner. Use at most four sentences and name the most \
important fixes first.";

/// Issues named in the fallback executive summary.
const TOP_ISSUES: usize = 3;

/// What synthesis needs to know about one priority page.
#[derive(Debug, Clone)]
pub struct PageFindings {
    pub page_id: i64,
    pub url: String,
    pub page_type: PageType,
    pub summary: Option<String>,
    pub tests: Vec<AdaptiveTest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInsights {
    pub page_id: i64,
    pub url: String,
    pub page_type: PageType,
    pub insights: Vec<Insight>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub executive_summary: String,
    pub overall_score: u8,
    pub pages: Vec<PageInsights>,
}

impl Report {
    pub fn insights(&self) -> impl Iterator<Item = &Insight> {
        self.pages.iter().flat_map(|p| p.insights.iter())
    }

    pub fn count(&self, priority: Priority) -> usize {
        self.insights().filter(|i| i.priority == priority).count()
    }
}

#[derive(Deserialize)]
struct InsightReply {
    #[serde(default)]
    insights: Vec<RawInsight>,
}

#[derive(Deserialize)]
struct RawInsight {
    issue: String,
    #[serde(default)]
    impact: String,
    #[serde(default)]
    recommendation: String,
    priority: String,
}

pub struct Synthesizer {
    assistant: Assistant,
}

impl Synthesizer {
    pub fn new(assistant: Assistant) -> Self {
        Self { assistant }
    }

    pub async fn synthesize(&self, pages: &[PageFindings]) -> Report {
        let mut out = Vec::with_capacity(pages.len());
        for page in pages {
            let insights = match self.ai_insights(page).await {
                Some(list) => list,
                None => {
                    debug!(url = %page.url, "using rule-based insights");
                    fallback_insights(&page.tests)
                }
            };
            out.push(PageInsights {
                page_id: page.page_id,
                url: page.url.clone(),
                page_type: page.page_type,
                insights: dedupe(insights),
            });
        }

        let overall_score = overall_score(out.iter().flat_map(|p| p.insights.iter()));
        let mut report = Report {
            executive_summary: String::new(),
            overall_score,
            pages: out,
        };
        report.executive_summary = self.executive_summary(&report).await;
        report
    }

    async fn ai_insights(&self, page: &PageFindings) -> Option<Vec<Insight>> {
        let tests: Vec<_> = page
            .tests
            .iter()
            .map(|t| json!({"type": t.test_type, "impact_score": t.impact_score, "result": t.result}))
            .collect();
        let prompt = json!({
            "url": page.url,
            "page_type": page.page_type,
            "summary": page.summary,
            "tests": tests,
        })
        .to_string();

        let reply: InsightReply = self.assistant.ask_json(INSIGHT_SYSTEM_PROMPT, &prompt).await?;
        let insights: Vec<Insight> = reply
            .insights
            .into_iter()
            .filter(|raw| !raw.issue.trim().is_empty())
            .filter_map(|raw| {
                let priority = match raw.priority.trim().to_lowercase().as_str() {
                    "critical" => Priority::Critical,
                    "high" => Priority::High,
                    "medium" => Priority::Medium,
                    _ => return None,
                };
                Some(Insight {
                    issue: raw.issue.trim().to_string(),
                    impact: raw.impact,
                    recommendation: raw.recommendation,
                    priority,
                })
            })
            .collect();
        (!insights.is_empty()).then_some(insights)
    }

    async fn executive_summary(&self, report: &Report) -> String {
        let prompt = json!({
            "overall_score": report.overall_score,
            "pages": report.pages,
        })
        .to_string();
        match self.assistant.ask_text(EXECUTIVE_SYSTEM_PROMPT, &prompt).await {
            Some(text) => text,
            None => fallback_executive_summary(report),
        }
    }
}

pub fn fallback_executive_summary(report: &Report) -> String {
    let total = report.insights().count();
    if total == 0 {
        return format!(
            "Analyzed {} priority pages and found no issues.",
            report.pages.len()
        );
    }
    let mut ranked: Vec<&Insight> = report.insights().collect();
    ranked.sort_by_key(|i| i.priority);
    let top: Vec<&str> = ranked
        .iter()
        .take(TOP_ISSUES)
        .map(|i| i.issue.as_str())
        .collect();
    format!(
        "Analyzed {} priority pages and found {} issues: {} critical and {} high priority. Top issues: {}.",
        report.pages.len(),
        total,
        report.count(Priority::Critical),
        report.count(Priority::High),
        top.join("; ")
    )
}
