//! Page-type classification from URL path, title, and page structure.
//!
//! Rules run in a fixed order and the first match wins. Accuracy is not the
//! goal; the label only steers scoring and test selection.

use crate::acquisition::structured::PageSnapshot;
use crate::model::PageType;
use url::Url;

/// Substring rules, checked in order against lowercased path + title.
const KEYWORD_RULES: &[(PageType, &[&str])] = &[
    (PageType::Pricing, &["pricing", "plans", "price"]),
    (
        PageType::Product,
        &["product", "shop", "store", "item", "collections"],
    ),
    (PageType::Checkout, &["checkout", "cart", "basket", "payment"]),
    (PageType::Contact, &["contact", "get-in-touch", "support"]),
    (PageType::About, &["about", "team", "company", "our-story"]),
    (
        PageType::Blog,
        &["blog", "news", "article", "post", "insights"],
    ),
];

/// Heading verbs that mark a landing page when a form is present.
const ACTION_VERBS: &[&str] = &[
    "get", "start", "try", "join", "sign up", "download", "book", "request", "claim", "free",
];

/// Label one fetched page.
pub fn classify(url: &Url, snapshot: &PageSnapshot) -> PageType {
    let path = url.path().to_ascii_lowercase();
    if matches!(path.as_str(), "/" | "" | "/index.html" | "/index.php") {
        return PageType::Homepage;
    }

    let haystack = format!(
        "{} {}",
        path,
        snapshot.title.as_deref().unwrap_or("").to_lowercase()
    );
    for (page_type, keywords) in KEYWORD_RULES {
        if keywords.iter().any(|k| haystack.contains(k)) {
            return *page_type;
        }
    }

    if !snapshot.forms.is_empty() && has_action_heading(snapshot) {
        return PageType::Landing;
    }
    PageType::Other
}

fn has_action_heading(snapshot: &PageSnapshot) -> bool {
    snapshot
        .headings
        .iter()
        .filter(|h| h.level <= 2)
        .any(|h| {
            let text = h.text.to_lowercase();
            ACTION_VERBS.iter().any(|verb| contains_word(&text, verb))
        })
}

/// Whole-word (or whole-phrase) match.
fn contains_word(text: &str, needle: &str) -> bool {
    text.match_indices(needle).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::extract_snapshot;

    fn classify_html(url: &str, html: &str) -> PageType {
        classify(&Url::parse(url).unwrap(), &extract_snapshot(html))
    }

    #[test]
    fn test_root_is_homepage() {
        assert_eq!(
            classify_html("https://example.com/", "<title>Pricing</title>"),
            PageType::Homepage
        );
    }

    #[test]
    fn test_keyword_order() {
        assert_eq!(
            classify_html("https://example.com/pricing", ""),
            PageType::Pricing
        );
        // pricing beats product when both match
        assert_eq!(
            classify_html("https://example.com/shop/plans", ""),
            PageType::Pricing
        );
        assert_eq!(
            classify_html("https://example.com/cart", ""),
            PageType::Checkout
        );
        assert_eq!(
            classify_html("https://example.com/x", "<title>About us</title>"),
            PageType::About
        );
        assert_eq!(
            classify_html("https://example.com/blog/hello", ""),
            PageType::Blog
        );
    }

    #[test]
    fn test_landing_needs_form_and_verb() {
        let html = r#"<h1>Start your trial today</h1><form><input name="email"></form>"#;
        assert_eq!(
            classify_html("https://example.com/welcome", html),
            PageType::Landing
        );

        let no_form = "<h1>Start your trial today</h1>";
        assert_eq!(
            classify_html("https://example.com/welcome", no_form),
            PageType::Other
        );

        // "together" must not count as "get"
        let no_verb = r#"<h1>Better together</h1><form><input name="q"></form>"#;
        assert_eq!(
            classify_html("https://example.com/welcome", no_verb),
            PageType::Other
        );
    }
}
