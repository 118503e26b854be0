//! Natural-language page summaries.

use crate::acquisition::PageSnapshot;
use crate::llm::Assistant;
use crate::model::PageType;
use serde_json::json;

pub const SUMMARY_SYSTEM_PROMPT: &str = "You summarize a web page for a conversion audit in \
three sentences: what the page offers, who it is for, and what it asks the visitor to do.";

pub async fn summarize(
    assistant: &Assistant,
    page_type: PageType,
    snap: &PageSnapshot,
    owner_context: &[String],
) -> String {
    let headings: Vec<&str> = snap.headings.iter().take(8).map(|h| h.text.as_str()).collect();
    let prompt = json!({
        "page_type": page_type,
        "title": snap.title,
        "description": snap.meta_description(),
        "headings": headings,
        "calls_to_action": snap.buttons.iter().take(5).collect::<Vec<_>>(),
        "word_count": snap.word_count,
        "form_count": snap.forms.len(),
        "owner_answers": owner_context,
    })
    .to_string();

    match assistant.ask_text(SUMMARY_SYSTEM_PROMPT, &prompt).await {
        Some(text) => text,
        None => fallback_summary(page_type, snap),
    }
}

pub fn fallback_summary(page_type: PageType, snap: &PageSnapshot) -> String {
    let title = snap.title.as_deref().unwrap_or("Untitled");
    let ctas: Vec<&str> = snap.buttons.iter().take(3).map(String::as_str).collect();
    let cta_sentence = if ctas.is_empty() {
        "No clear calls to action were found.".to_string()
    } else {
        format!("Top calls to action: {}.", ctas.join(", "))
    };
    format!(
        "{} page \"{}\" with {} words and {} form(s). {}",
        capitalize(page_type.as_str()),
        title,
        snap.word_count,
        snap.forms.len(),
        cta_sentence
    )
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::extract_snapshot;

    #[test]
    fn test_fallback_template() {
        let snap = extract_snapshot(
            r#"<title>Plans</title><p>Pick a plan</p><button>Start free trial</button>"#,
        );
        assert_eq!(
            fallback_summary(PageType::Pricing, &snap),
            "Pricing page \"Plans\" with 6 words and 0 form(s). Top calls to action: Start free trial."
        );
    }

    #[tokio::test]
    async fn test_disabled_assistant_uses_template() {
        let snap = extract_snapshot("<p>hi</p>");
        let text = summarize(&Assistant::disabled(), PageType::Other, &snap, &[]).await;
        assert!(text.starts_with("Other page \"Untitled\""));
        assert!(text.ends_with("No clear calls to action were found."));
    }
}
