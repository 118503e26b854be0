//! Call-to-action prominence.
//!
//! Without layout information, "above the fold" is approximated by document
//! order: the first [`FOLD_ELEMENTS`] interactive elements.

use super::contrast::style_declarations;
use crate::acquisition::structured::{control_label, query, INTERACTIVE_SELECTOR};
use scraper::Html;
use serde::Serialize;

pub const FOLD_ELEMENTS: usize = 10;
/// More prominent elements than this above the fold compete for attention.
pub const COMPETING_THRESHOLD: usize = 3;
const MIN_WIDTH_PX: f64 = 120.0;
const MIN_HEIGHT_PX: f64 = 40.0;
const MIN_TEXT_CHARS: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct CtaReport {
    pub interactive_count: usize,
    pub prominent_count: usize,
    pub above_fold_prominent: usize,
    pub competing: bool,
    pub has_prominent_cta: bool,
    /// Labels of prominent elements, in document order.
    pub cta_texts: Vec<String>,
}

/// Leading number of a CSS length such as `140px`.
fn css_length(value: &str) -> Option<f64> {
    let numeric: String = value
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    numeric.parse().ok()
}

/// Inline width > 120, inline height > 40, or label longer than 10 chars.
pub fn is_prominent(style: Option<&str>, text: &str) -> bool {
    let sized = style_declarations(style.unwrap_or(""))
        .into_iter()
        .any(|(prop, value)| match prop.as_str() {
            "width" | "min-width" => css_length(&value).is_some_and(|w| w > MIN_WIDTH_PX),
            "height" | "min-height" => css_length(&value).is_some_and(|h| h > MIN_HEIGHT_PX),
            _ => false,
        });
    sized || text.trim().chars().count() > MIN_TEXT_CHARS
}

pub fn check_cta(document: &Html) -> CtaReport {
    let elements = query(document, INTERACTIVE_SELECTOR);
    let mut prominent = Vec::new();
    let mut above_fold_prominent = 0;

    for (index, el) in elements.iter().enumerate() {
        let label = control_label(*el);
        if is_prominent(el.value().attr("style"), &label) {
            if index < FOLD_ELEMENTS {
                above_fold_prominent += 1;
            }
            prominent.push(label);
        }
    }

    CtaReport {
        interactive_count: elements.len(),
        prominent_count: prominent.len(),
        above_fold_prominent,
        competing: above_fold_prominent > COMPETING_THRESHOLD,
        has_prominent_cta: !prominent.is_empty(),
        cta_texts: prominent.into_iter().filter(|t| !t.is_empty()).take(5).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prominence_rules() {
        assert!(is_prominent(Some("width: 140px"), "Go"));
        assert!(!is_prominent(Some("width: 120px"), "Go"));
        assert!(is_prominent(Some("height:44px"), "Go"));
        assert!(!is_prominent(Some("height: 40px"), "Go"));
        assert!(is_prominent(None, "Start free trial"));
        assert!(!is_prominent(None, "   Buy now   "));
    }

    #[test]
    fn test_competing_ctas_above_fold() {
        let html = r#"
            <button>Start free trial</button>
            <button>Book a demo today</button>
            <a href="/p">See pricing plans</a>
            <a href="/c">Contact our sales team</a>
            <a href="/x">Home</a>
        "#;
        let report = check_cta(&Html::parse_document(html));
        assert_eq!(report.interactive_count, 5);
        assert_eq!(report.prominent_count, 4);
        assert_eq!(report.above_fold_prominent, 4);
        assert!(report.competing);
        assert!(report.has_prominent_cta);
        assert_eq!(report.cta_texts[0], "Start free trial");
    }

    #[test]
    fn test_prominent_below_fold_only() {
        let mut html: String = (0..10).map(|i| format!(r#"<a href="/{i}">Nav</a>"#)).collect();
        html.push_str(r#"<button style="width:200px">Buy</button>"#);
        let report = check_cta(&Html::parse_document(&html));
        assert_eq!(report.above_fold_prominent, 0);
        assert!(!report.competing);
        assert!(report.has_prominent_cta);
    }

    #[test]
    fn test_no_cta() {
        let report = check_cta(&Html::parse_document("<p>Just text</p>"));
        assert!(!report.has_prominent_cta);
        assert_eq!(report.interactive_count, 0);
    }
}
