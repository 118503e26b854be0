//! Clarifying questions for high-priority pages.
//!
//! The AI proposes up to three questions per page. When it has nothing
//! usable, a static CTA question (plus a purpose question for ambiguous
//! pages) takes its place.

use crate::llm::Assistant;
use crate::model::{DiscoveredPage, NewQuestion, PageType, QuestionType};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::debug;

pub const QUESTION_SYSTEM_PROMPT: &str = "You help audit a website for conversion problems. \
Propose 2 or 3 short questions for the site owner about one page. Reply with JSON \
{\"questions\": [{\"type\": t, \"text\": s, \"options\": [..]}]} where t is one of \
cta_identification, page_purpose, target_audience, conversion_goal, value_proposition, \
trust_concerns.";

/// Questions kept per page.
pub const MAX_QUESTIONS_PER_PAGE: usize = 3;

#[derive(Deserialize)]
struct QuestionsReply {
    #[serde(default)]
    questions: Vec<ProposedQuestion>,
}

#[derive(Deserialize)]
struct ProposedQuestion {
    #[serde(rename = "type", alias = "question_type")]
    kind: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    options: Option<Vec<String>>,
}

pub struct QuestionGenerator {
    assistant: Assistant,
}

impl QuestionGenerator {
    pub fn new(assistant: Assistant) -> Self {
        Self { assistant }
    }

    /// Questions for one page, AI first, static fallback when the AI
    /// yields nothing usable.
    pub async fn generate(&self, page: &DiscoveredPage) -> Vec<NewQuestion> {
        let prompt = json!({
            "url": page.url,
            "page_type": page.page_type,
            "title": page.metadata.title,
            "form_count": page.metadata.form_count,
            "button_count": page.metadata.button_count,
            "word_count": page.metadata.word_count,
        })
        .to_string();

        let proposed = self
            .assistant
            .ask_json::<QuestionsReply>(QUESTION_SYSTEM_PROMPT, &prompt)
            .await
            .map(|reply| accept_proposals(page.id, reply.questions))
            .unwrap_or_default();

        if proposed.is_empty() {
            debug!(url = %page.url, "using fallback questions");
            fallback_questions(page)
        } else {
            proposed
        }
    }
}

/// Pages whose score reaches `threshold`.
pub fn pages_needing_questions(pages: &[DiscoveredPage], threshold: u8) -> Vec<&DiscoveredPage> {
    pages
        .iter()
        .filter(|p| p.score().is_some_and(|s| s >= threshold))
        .collect()
}

/// Drop unknown types, blank text, and repeated types; keep at most three.
fn accept_proposals(page_id: i64, proposals: Vec<ProposedQuestion>) -> Vec<NewQuestion> {
    let mut seen = HashSet::new();
    proposals
        .into_iter()
        .filter_map(|p| {
            let question_type = p.kind.trim().parse::<QuestionType>().ok()?;
            let text = p.text.trim().to_string();
            if text.is_empty() || !seen.insert(question_type) {
                return None;
            }
            let options = p
                .options
                .map(|opts| {
                    opts.into_iter()
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect::<Vec<_>>()
                })
                .filter(|opts| !opts.is_empty());
            Some(NewQuestion {
                page_id: Some(page_id),
                question_type,
                text,
                options,
            })
        })
        .take(MAX_QUESTIONS_PER_PAGE)
        .collect()
}

/// One CTA question, plus a purpose question when the page type says little.
pub fn fallback_questions(page: &DiscoveredPage) -> Vec<NewQuestion> {
    let meta = &page.metadata;
    let mut options = Vec::new();
    if meta.button_count > 0 {
        options.push("Click the main call-to-action button".to_string());
    }
    if meta.form_count > 0 {
        options.push("Submit the form on this page".to_string());
    }
    options.push("Call us by phone".to_string());
    options.push("Something else".to_string());

    let mut questions = vec![NewQuestion {
        page_id: Some(page.id),
        question_type: QuestionType::CtaIdentification,
        text: format!(
            "What is the main action you want visitors to take on {}?",
            page.url
        ),
        options: Some(options),
    }];

    let ambiguous = page.page_type == PageType::Other
        || (page.page_type == PageType::Product && meta.form_count == 0);
    if ambiguous {
        questions.push(NewQuestion {
            page_id: Some(page.id),
            question_type: QuestionType::PagePurpose,
            text: format!("What is the primary purpose of {}?", page.url),
            options: Some(
                [
                    "Inform visitors",
                    "Generate leads",
                    "Sell a product",
                    "Support existing customers",
                    "Other",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ),
        });
    }
    questions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedBackend;
    use crate::model::{CollectionStatus, CrawlMetadata, ScoreSource, Scored, TestingStatus};
    use std::sync::Arc;
    use std::time::Duration;

    fn page(page_type: PageType, forms: u32, buttons: u32, score: u8) -> DiscoveredPage {
        DiscoveredPage {
            id: 7,
            audit_id: "a".into(),
            url: "https://example.com/x".into(),
            page_type,
            priority: Some(Scored {
                source: ScoreSource::Heuristic,
                value: score,
            }),
            metadata: CrawlMetadata {
                form_count: forms,
                button_count: buttons,
                ..Default::default()
            },
            collection_status: CollectionStatus::Pending,
            testing_status: TestingStatus::Pending,
            is_priority: false,
        }
    }

    #[test]
    fn test_threshold_selection() {
        let pages = vec![
            page(PageType::Pricing, 0, 0, 95),
            page(PageType::Contact, 0, 0, 70),
            page(PageType::About, 0, 0, 69),
        ];
        assert_eq!(pages_needing_questions(&pages, 70).len(), 2);
    }

    #[test]
    fn test_fallback_for_ambiguous_product() {
        let qs = fallback_questions(&page(PageType::Product, 0, 2, 90));
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[0].question_type, QuestionType::CtaIdentification);
        let opts = qs[0].options.as_ref().unwrap();
        assert_eq!(opts[0], "Click the main call-to-action button");
        assert!(!opts.iter().any(|o| o.contains("form")));
        assert_eq!(qs[1].question_type, QuestionType::PagePurpose);

        let qs = fallback_questions(&page(PageType::Product, 1, 0, 90));
        assert_eq!(qs.len(), 1);
        assert_eq!(
            qs[0].options.as_ref().unwrap()[0],
            "Submit the form on this page"
        );
    }

    #[tokio::test]
    async fn test_ai_questions_filtered_and_truncated() {
        let reply = json!({"questions": [
            {"type": "target_audience", "text": "Who buys?"},
            {"type": "made_up", "text": "??"},
            {"type": "target_audience", "text": "Again?"},
            {"type": "conversion_goal", "text": "What converts?", "options": ["Signup", " "]},
            {"type": "trust_concerns", "text": "Why trust?"},
            {"type": "value_proposition", "text": "Why you?"}
        ]});
        let backend = Arc::new(ScriptedBackend::new().with_json("site owner", reply));
        let generator = QuestionGenerator::new(Assistant::new(backend, Duration::from_secs(1)));

        let qs = generator.generate(&page(PageType::Pricing, 0, 0, 95)).await;
        let types: Vec<_> = qs.iter().map(|q| q.question_type).collect();
        assert_eq!(
            types,
            vec![
                QuestionType::TargetAudience,
                QuestionType::ConversionGoal,
                QuestionType::TrustConcerns
            ]
        );
        assert_eq!(qs[1].options, Some(vec!["Signup".to_string()]));
    }

    #[tokio::test]
    async fn test_empty_ai_reply_uses_fallback() {
        let backend = Arc::new(ScriptedBackend::new().with_json("site owner", json!({"questions": []})));
        let generator = QuestionGenerator::new(Assistant::new(backend, Duration::from_secs(1)));
        let qs = generator.generate(&page(PageType::Other, 0, 0, 80)).await;
        assert_eq!(qs.len(), 2);
    }
}
