//! Evaluate catalog tests against one analyzed page.

use super::micro_tests::MICRO_TESTS;
use crate::acquisition::PageSnapshot;
use crate::llm::Assistant;
use crate::model::{PageData, TestDefinition, TestStatus};
use serde::Deserialize;
use serde_json::{json, Map, Value};

pub const CATALOG_SYSTEM_PROMPT: &str = "You evaluate one check of a website audit using only \
the page data provided. Reply with JSON {\"status\": \"pass\" | \"fail\" | \"not_applicable\", \
\"note\": short explanation}.";

/// Raw HTML sent to the model is cut to this many characters.
const HTML_EXCERPT_CHARS: usize = 12_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogOutcome {
    pub test_key: String,
    pub status: TestStatus,
    pub note: Option<String>,
}

#[derive(Deserialize)]
struct EvaluationReply {
    status: String,
    #[serde(default)]
    note: Option<String>,
}

/// Micro-test keys reuse the micro-test outcome; every other key asks the
/// AI over its declared data sources and is `not_applicable` without an answer.
pub async fn evaluate_catalog(
    assistant: &Assistant,
    tests: &[TestDefinition],
    data: &PageData,
    snap: &PageSnapshot,
) -> Vec<CatalogOutcome> {
    let mut outcomes = Vec::with_capacity(tests.len());
    for test in tests {
        if MICRO_TESTS.contains(&test.key.as_str()) {
            if let Some(micro) = data.micro_tests.iter().find(|m| m.test == test.key) {
                outcomes.push(CatalogOutcome {
                    test_key: test.key.clone(),
                    status: if micro.passed {
                        TestStatus::Pass
                    } else {
                        TestStatus::Fail
                    },
                    note: Some(micro.message.clone()),
                });
                continue;
            }
        }

        let prompt = json!({
            "check": test.name,
            "question": test.prompt,
            "data": source_payload(&test.data_sources, data, snap),
        })
        .to_string();

        let outcome = assistant
            .ask_json::<EvaluationReply>(CATALOG_SYSTEM_PROMPT, &prompt)
            .await
            .and_then(|reply| {
                let status = TestStatus::parse(&reply.status)?;
                Some(CatalogOutcome {
                    test_key: test.key.clone(),
                    status,
                    note: reply.note.filter(|n| !n.trim().is_empty()),
                })
            })
            .unwrap_or_else(|| CatalogOutcome {
                test_key: test.key.clone(),
                status: TestStatus::NotApplicable,
                note: Some("No evaluation available".to_string()),
            });
        outcomes.push(outcome);
    }
    outcomes
}

/// The page data named by each source identifier.
pub fn source_payload(sources: &[String], data: &PageData, snap: &PageSnapshot) -> Value {
    let mut payload = Map::new();
    for source in sources {
        let value = match source.as_str() {
            "html" => json!(data.raw_html.chars().take(HTML_EXCERPT_CHARS).collect::<String>()),
            "headings" => json!(data.headings),
            "links" => json!(data.links),
            "images" => json!(data.images),
            "forms" => json!(snap.forms),
            "buttons" => json!(snap.buttons),
            "meta_tags" => json!(data.meta_tags),
            "fonts" => json!(data.fonts),
            "colors" => json!(data.colors),
            "scripts" => json!(data.scripts),
            "screenshots" => json!(data.screenshots),
            "performance" => json!(data.performance),
            "metrics" => data.metrics.clone().unwrap_or(Value::Null),
            "micro_tests" => json!(data.micro_tests),
            _ => continue,
        };
        payload.insert(source.clone(), value);
    }
    Value::Object(payload)
}
