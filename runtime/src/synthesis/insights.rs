//! Deterministic insight rules and insight bookkeeping.

use crate::model::{AdaptiveTest, Priority};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Fallback insights kept per page.
pub const MAX_FALLBACK_INSIGHTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    pub issue: String,
    pub impact: String,
    pub recommendation: String,
    pub priority: Priority,
}

impl Insight {
    fn new(priority: Priority, issue: &str, impact: String, recommendation: &str) -> Self {
        Self {
            issue: issue.to_string(),
            impact,
            recommendation: recommendation.to_string(),
            priority,
        }
    }
}

/// Derive insights from known test types with fixed thresholds, highest
/// priority first, at most [`MAX_FALLBACK_INSIGHTS`].
pub fn fallback_insights(tests: &[AdaptiveTest]) -> Vec<Insight> {
    let mut out = Vec::new();
    for test in tests {
        let r = &test.result;
        match test.test_type.as_str() {
            "contrast" => {
                let count = int(r, "low_contrast_count");
                if count > 0 {
                    out.push(Insight::new(
                        Priority::High,
                        "Low-contrast calls to action",
                        format!("{count} interactive element(s) fall below a 4.5:1 contrast ratio"),
                        "Adjust text and background colors until every button and link reaches 4.5:1.",
                    ));
                }
            }
            "cta" => {
                if !flag(r, "has_prominent_cta") {
                    out.push(Insight::new(
                        Priority::Critical,
                        "No prominent call to action",
                        "Visitors have no obvious next step on this page".to_string(),
                        "Add one large, specific primary button near the top of the page.",
                    ));
                } else if flag(r, "competing") {
                    out.push(Insight::new(
                        Priority::Medium,
                        "Competing calls to action",
                        format!(
                            "{} prominent actions compete above the fold",
                            int(r, "above_fold_prominent")
                        ),
                        "Pick one primary action and demote the others to secondary styling.",
                    ));
                }
            }
            "trust" => {
                let missing: Vec<String> = r
                    .get("missing")
                    .and_then(Value::as_array)
                    .map(|a| {
                        a.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                if !missing.is_empty() {
                    let priority = if missing.iter().any(|m| m == "phone") {
                        Priority::High
                    } else {
                        Priority::Medium
                    };
                    out.push(Insight::new(
                        priority,
                        "Missing trust signals",
                        format!("No {} found on the page", missing.join(", ")),
                        "Show contact details, security and payment badges, and customer reviews near the conversion point.",
                    ));
                }
            }
            "density" => {
                if flag(r, "excessive") {
                    out.push(Insight::new(
                        Priority::Medium,
                        "Overly dense page structure",
                        format!(
                            "{} elements nested up to {} levels deep",
                            int(r, "element_count"),
                            int(r, "max_depth")
                        ),
                        "Simplify the layout and remove wrapper elements that add no content.",
                    ));
                }
            }
            "form" => {
                if flag(r, "excessive") {
                    out.push(Insight::new(
                        Priority::High,
                        "Form asks for too much",
                        format!("A form on this page has {} fields", int(r, "max_fields")),
                        "Cut the form to the fields you need to follow up, ideally five or fewer.",
                    ));
                }
            }
            _ => {}
        }
    }
    out.sort_by_key(|i| i.priority);
    out.truncate(MAX_FALLBACK_INSIGHTS);
    out
}

/// Drop insights whose normalized issue text was already seen.
pub fn dedupe(insights: Vec<Insight>) -> Vec<Insight> {
    let mut seen = HashSet::new();
    insights
        .into_iter()
        .filter(|i| seen.insert(normalize_issue(&i.issue)))
        .collect()
}

/// Lowercase alphanumerics with single spaces.
pub fn normalize_issue(issue: &str) -> String {
    issue
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `100 − 20·critical − 10·high − 5·other`, floored at 0.
pub fn overall_score<'a>(insights: impl IntoIterator<Item = &'a Insight>) -> u8 {
    let penalty: u32 = insights
        .into_iter()
        .map(|i| match i.priority {
            Priority::Critical => 20,
            Priority::High => 10,
            Priority::Medium | Priority::Low => 5,
        })
        .sum();
    100u32.saturating_sub(penalty) as u8
}

fn int(v: &Value, key: &str) -> u64 {
    v.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn flag(v: &Value, key: &str) -> bool {
    v.get(key).and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test(test_type: &str, result: Value) -> AdaptiveTest {
        AdaptiveTest {
            id: 0,
            page_id: 1,
            test_type: test_type.to_string(),
            decision_reason: String::new(),
            result,
            impact_score: 50,
            created_at: String::new(),
        }
    }

    fn insight(priority: Priority, issue: &str) -> Insight {
        Insight::new(priority, issue, String::new(), "")
    }

    #[test]
    fn test_score_properties() {
        assert_eq!(overall_score(&[]), 100);
        let two = [
            insight(Priority::Critical, "a"),
            insight(Priority::High, "b"),
        ];
        assert_eq!(overall_score(&two), 70);
        let many: Vec<Insight> = (0..6).map(|i| insight(Priority::Critical, &i.to_string())).collect();
        assert_eq!(overall_score(&many), 0);
        assert_eq!(overall_score(&[insight(Priority::Medium, "m")]), 95);
    }

    #[test]
    fn test_fallback_rules() {
        let tests = vec![
            test("density", json!({"element_count": 2000, "max_depth": 12, "excessive": true})),
            test("contrast", json!({"low_contrast_count": 2})),
            test("cta", json!({"has_prominent_cta": false, "competing": false})),
            test("trust", json!({"missing": ["email", "reviews"]})),
            test("form", json!({"max_fields": 9, "excessive": true})),
            test("mystery", json!({})),
        ];
        let insights = fallback_insights(&tests);
        let priorities: Vec<Priority> = insights.iter().map(|i| i.priority).collect();
        assert_eq!(
            priorities,
            vec![
                Priority::Critical,
                Priority::High,
                Priority::High,
                Priority::Medium,
                Priority::Medium
            ]
        );
        assert_eq!(insights[0].issue, "No prominent call to action");
    }

    #[test]
    fn test_missing_phone_is_high_and_truncation() {
        let tests = vec![test("trust", json!({"missing": ["phone"]}))];
        assert_eq!(fallback_insights(&tests)[0].priority, Priority::High);

        let mut tests = Vec::new();
        for _ in 0..4 {
            tests.push(test("contrast", json!({"low_contrast_count": 1})));
            tests.push(test("cta", json!({"has_prominent_cta": true, "competing": true})));
        }
        let insights = fallback_insights(&tests);
        assert_eq!(insights.len(), MAX_FALLBACK_INSIGHTS);
        assert!(insights[..4].iter().all(|i| i.priority == Priority::High));
    }

    #[test]
    fn test_dedupe_by_normalized_issue() {
        let insights = vec![
            insight(Priority::High, "Low-contrast CTAs"),
            insight(Priority::Medium, "  low contrast ctas!"),
            insight(Priority::Medium, "Other"),
        ];
        let kept = dedupe(insights);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].priority, Priority::High);
    }
}
