//! Extensible test catalog: groups, test definitions, and per-page results.

use crate::error::{AuditError, AuditResult};
use serde::{Deserialize, Serialize};

/// The only data-source identifiers a test definition may declare.
pub const DATA_SOURCES: &[&str] = &[
    "html",
    "headings",
    "links",
    "images",
    "forms",
    "buttons",
    "meta_tags",
    "fonts",
    "colors",
    "scripts",
    "screenshots",
    "performance",
    "metrics",
    "micro_tests",
];

/// Reject any data source outside [`DATA_SOURCES`], listing every offender.
pub fn validate_data_sources(sources: &[String]) -> AuditResult<()> {
    let invalid: Vec<String> = sources
        .iter()
        .filter(|s| !DATA_SOURCES.contains(&s.as_str()))
        .cloned()
        .collect();
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(AuditError::InvalidDataSources { invalid })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestGroup {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// A catalog test. `key` is globally unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDefinition {
    pub id: i64,
    pub group_id: i64,
    pub key: String,
    pub name: String,
    pub prompt: String,
    pub data_sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTestDefinition {
    pub key: String,
    pub name: String,
    pub prompt: String,
    pub data_sources: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Pass,
    Fail,
    NotApplicable,
}

impl TestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Pass => "pass",
            TestStatus::Fail => "fail",
            TestStatus::NotApplicable => "not_applicable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pass" | "passed" => Some(TestStatus::Pass),
            "fail" | "failed" => Some(TestStatus::Fail),
            "not_applicable" | "n/a" | "na" => Some(TestStatus::NotApplicable),
            _ => None,
        }
    }
}

/// Outcome of a catalog test for one page of one audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub id: i64,
    pub audit_id: String,
    pub page_id: i64,
    pub test_key: String,
    pub status: TestStatus,
    pub note: Option<String>,
}

/// Groups seeded into a fresh store.
///
/// Keys matching a micro-test name are scored from that micro-test; the rest
/// are evaluated by the AI backend over their declared sources.
pub fn builtin_catalog() -> Vec<(&'static str, &'static str, Vec<NewTestDefinition>)> {
    fn def(key: &str, name: &str, prompt: &str, sources: &[&str]) -> NewTestDefinition {
        NewTestDefinition {
            key: key.to_string(),
            name: name.to_string(),
            prompt: prompt.to_string(),
            data_sources: sources.iter().map(|s| s.to_string()).collect(),
        }
    }

    vec![
        (
            "seo_basics",
            "Search visibility fundamentals",
            vec![
                def(
                    "title_present",
                    "Page title",
                    "Does the page declare a non-empty <title>?",
                    &["meta_tags", "micro_tests"],
                ),
                def(
                    "meta_description_length",
                    "Meta description length",
                    "Is the meta description between 120 and 160 characters?",
                    &["meta_tags", "micro_tests"],
                ),
                def(
                    "h1_unique",
                    "Single H1",
                    "Does the page have exactly one H1 heading?",
                    &["headings", "micro_tests"],
                ),
            ],
        ),
        (
            "conversion_clarity",
            "Conversion clarity",
            vec![
                def(
                    "value_proposition_clear",
                    "Clear value proposition",
                    "Do the top headings state what the visitor gets and why it matters?",
                    &["headings", "meta_tags"],
                ),
                def(
                    "cta_copy_specific",
                    "Specific CTA copy",
                    "Do the primary buttons use specific, action-oriented copy instead of generic labels like 'Submit' or 'Click here'?",
                    &["buttons", "forms"],
                ),
            ],
        ),
    ]
}
