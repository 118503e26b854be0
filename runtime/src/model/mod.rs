//! Audit data model: the aggregate root, its pages, and everything hanging off them.
//!
//! Every enum here is stored as a lowercase label in SQLite and serialized the
//! same way in JSON, so the label table is the single source of truth.

pub mod catalog;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub use catalog::*;

/// A label that does not name any variant of the target enum.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} '{label}'")]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub label: String,
}

macro_rules! labelled_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident => $label:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $label)] $variant),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownLabel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($name::$variant),)+
                    other => Err(UnknownLabel {
                        kind: stringify!($name),
                        label: other.to_string(),
                    }),
                }
            }
        }
    };
}

labelled_enum! {
    /// Workflow phase. Declaration order is the only legal forward order.
    pub enum Phase {
        Crawling => "crawling",
        Prioritizing => "prioritizing",
        Questioning => "questioning",
        Analyzing => "analyzing",
        Synthesizing => "synthesizing",
    }
}

impl Phase {
    /// The phase that follows this one, if any.
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Crawling => Some(Phase::Prioritizing),
            Phase::Prioritizing => Some(Phase::Questioning),
            Phase::Questioning => Some(Phase::Analyzing),
            Phase::Analyzing => Some(Phase::Synthesizing),
            Phase::Synthesizing => None,
        }
    }

    /// Coarse lifecycle status while this phase is running.
    pub fn status(self) -> AuditStatus {
        match self {
            Phase::Crawling => AuditStatus::Crawling,
            Phase::Prioritizing | Phase::Questioning => AuditStatus::Collecting,
            Phase::Analyzing | Phase::Synthesizing => AuditStatus::Testing,
        }
    }
}

labelled_enum! {
    pub enum AuditStatus {
        Pending => "pending",
        Crawling => "crawling",
        Collecting => "collecting",
        Testing => "testing",
        Complete => "complete",
        Failed => "failed",
    }
}

impl AuditStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, AuditStatus::Complete | AuditStatus::Failed)
    }
}

labelled_enum! {
    pub enum AuditMode {
        SinglePage => "single_page",
        FullCrawl => "full_crawl",
    }
}

labelled_enum! {
    pub enum PageType {
        Homepage => "homepage",
        Product => "product",
        Pricing => "pricing",
        Checkout => "checkout",
        Contact => "contact",
        About => "about",
        Blog => "blog",
        Landing => "landing",
        Other => "other",
    }
}

labelled_enum! {
    /// Where a priority score came from.
    pub enum ScoreSource {
        Fixed => "fixed",
        Ai => "ai",
        Heuristic => "heuristic",
    }
}

labelled_enum! {
    pub enum CollectionStatus {
        Pending => "pending",
        Collecting => "collecting",
        Complete => "complete",
        Partial => "partial",
        Failed => "failed",
    }
}

labelled_enum! {
    pub enum TestingStatus {
        Pending => "pending",
        Running => "running",
        Complete => "complete",
        Failed => "failed",
    }
}

labelled_enum! {
    pub enum QuestionType {
        CtaIdentification => "cta_identification",
        PagePurpose => "page_purpose",
        TargetAudience => "target_audience",
        ConversionGoal => "conversion_goal",
        ValueProposition => "value_proposition",
        TrustConcerns => "trust_concerns",
    }
}

labelled_enum! {
    pub enum QuestionStatus {
        Pending => "pending",
        Answered => "answered",
        Skipped => "skipped",
    }
}

labelled_enum! {
    /// Adaptive tests the analyzer knows how to execute.
    pub enum AdaptiveTestKind {
        Contrast => "contrast",
        Cta => "cta",
        Trust => "trust",
        Density => "density",
        Form => "form",
    }
}

labelled_enum! {
    /// Insight priority. Declaration order is the sort order.
    pub enum Priority {
        Critical => "critical",
        High => "high",
        Medium => "medium",
        Low => "low",
    }
}

labelled_enum! {
    pub enum Severity {
        High => "high",
        Medium => "medium",
        Low => "low",
    }
}

/// A priority score tagged with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scored {
    pub source: ScoreSource,
    pub value: u8,
}

/// Crawl and capture parameters fixed when an audit is created, so a
/// resumed or retried audit runs with the limits it started with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSettings {
    pub max_depth: u32,
    pub max_pages: usize,
    pub refetch_backlinks: bool,
    pub screenshots: bool,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_pages: 20,
            refetch_backlinks: false,
            screenshots: true,
        }
    }
}

/// Root aggregate for one audit run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Audit {
    pub id: String,
    pub seed_url: String,
    pub mode: AuditMode,
    pub settings: AuditSettings,
    pub phase: Phase,
    pub status: AuditStatus,
    /// Phase that was running when the audit failed.
    pub failed_phase: Option<Phase>,
    pub failure_message: Option<String>,
    pub last_completed_phase: Option<Phase>,
    pub priority_reasoning: Option<String>,
    pub executive_summary: Option<String>,
    pub overall_score: Option<u8>,
    pub created_at: String,
    pub updated_at: String,
}

/// Signals captured for a page while crawling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlMetadata {
    pub depth: u32,
    pub title: Option<String>,
    pub heading_count: u32,
    pub form_count: u32,
    pub button_count: u32,
    /// Number of other discovered pages linking here.
    pub inbound_links: u32,
    pub word_count: u32,
    pub has_navigation: bool,
}

/// One unique URL discovered during an audit's crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredPage {
    pub id: i64,
    pub audit_id: String,
    pub url: String,
    pub page_type: PageType,
    /// `None` until the prioritizing phase has run.
    pub priority: Option<Scored>,
    pub metadata: CrawlMetadata,
    pub collection_status: CollectionStatus,
    pub testing_status: TestingStatus,
    pub is_priority: bool,
}

impl DiscoveredPage {
    pub fn score(&self) -> Option<u8> {
        self.priority.map(|s| s.value)
    }
}

/// A screenshot for one device. A missing path marks a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screenshot {
    pub device: String,
    pub path: Option<String>,
    pub error: Option<String>,
}

impl Screenshot {
    pub fn placeholder(device: &str, error: impl Into<String>) -> Self {
        Self {
            device: device.to_string(),
            path: None,
            error: Some(error.into()),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.path.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub response_time_ms: u64,
    pub html_bytes: usize,
    pub script_count: usize,
    pub stylesheet_count: usize,
    pub image_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub src: String,
    pub alt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// Outcome of one deterministic micro-test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroTestOutcome {
    pub test: String,
    pub passed: bool,
    pub message: String,
    pub severity: Option<Severity>,
}

/// Detailed extraction for one page, created during data collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageData {
    pub page_id: i64,
    pub fonts: Vec<String>,
    pub colors: Vec<String>,
    pub images: Vec<ImageAsset>,
    pub scripts: Vec<String>,
    pub headings: Vec<Heading>,
    pub links: Vec<String>,
    pub meta_tags: BTreeMap<String, String>,
    pub raw_html: String,
    pub screenshots: Vec<Screenshot>,
    pub performance: Option<PerformanceMetrics>,
    /// Metric groups, serialized as collected.
    pub metrics: Option<Value>,
    pub micro_tests: Vec<MicroTestOutcome>,
    pub summary: Option<String>,
}

impl PageData {
    /// Raw content, at least one real screenshot, and performance numbers.
    pub fn is_complete(&self) -> bool {
        !self.raw_html.trim().is_empty()
            && self.screenshots.iter().any(|s| !s.is_placeholder())
            && self.performance.is_some()
    }
}

/// A question to be put to the site owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditQuestion {
    pub id: i64,
    pub audit_id: String,
    pub page_id: Option<i64>,
    pub question_type: QuestionType,
    pub text: String,
    pub options: Option<Vec<String>>,
    pub response: Option<String>,
    pub status: QuestionStatus,
}

/// A question before it has been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuestion {
    pub page_id: Option<i64>,
    pub question_type: QuestionType,
    pub text: String,
    pub options: Option<Vec<String>>,
}

/// A persisted adaptive test execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveTest {
    pub id: i64,
    pub page_id: i64,
    pub test_type: String,
    pub decision_reason: String,
    pub result: Value,
    pub impact_score: u8,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAdaptiveTest {
    pub test_type: String,
    pub decision_reason: String,
    pub result: Value,
    pub impact_score: u8,
}

/// One row of the phase/status journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub audit_id: String,
    pub phase: Phase,
    pub status: AuditStatus,
    pub note: Option<String>,
    pub at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_is_monotonic() {
        let mut phase = Phase::Crawling;
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            assert!(next > phase);
            seen.push(next);
            phase = next;
        }
        assert_eq!(seen, Phase::ALL);
    }

    #[test]
    fn test_labels_parse_back() {
        for t in PageType::ALL {
            assert_eq!(t.as_str().parse::<PageType>().unwrap(), *t);
        }
        assert_eq!(
            "single_page".parse::<AuditMode>().unwrap(),
            AuditMode::SinglePage
        );
        let err = "frontpage".parse::<PageType>().unwrap_err();
        assert_eq!(err.kind, "PageType");
    }

    #[test]
    fn test_priority_sort_order() {
        let mut p = vec![Priority::Low, Priority::Critical, Priority::Medium, Priority::High];
        p.sort();
        assert_eq!(
            p,
            vec![Priority::Critical, Priority::High, Priority::Medium, Priority::Low]
        );
    }

    #[test]
    fn test_phase_status_mapping() {
        assert_eq!(Phase::Crawling.status(), AuditStatus::Crawling);
        assert_eq!(Phase::Questioning.status(), AuditStatus::Collecting);
        assert_eq!(Phase::Synthesizing.status(), AuditStatus::Testing);
    }

    #[test]
    fn test_page_data_completeness() {
        let mut data = PageData {
            raw_html: "<html></html>".into(),
            performance: Some(PerformanceMetrics::default()),
            screenshots: vec![Screenshot::placeholder("desktop", "no browser")],
            ..Default::default()
        };
        assert!(!data.is_complete());

        data.screenshots.push(Screenshot {
            device: "mobile".into(),
            path: Some("/tmp/shot.png".into()),
            error: None,
        });
        assert!(data.is_complete());

        data.raw_html.clear();
        assert!(!data.is_complete());
    }

    #[test]
    fn test_labels_serialize_as_snake_case() {
        let json = serde_json::to_string(&QuestionType::CtaIdentification).unwrap();
        assert_eq!(json, "\"cta_identification\"");
    }
}
