//! Adaptive tests: which checks a page gets, how they run, and what they
//! are worth.

use super::contrast::{check_contrast, ContrastReport};
use super::cta::{check_cta, CtaReport};
use crate::acquisition::structured::query;
use crate::acquisition::PageSnapshot;
use crate::llm::Assistant;
use crate::model::{AdaptiveTestKind, NewAdaptiveTest, PageType};
use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::debug;

pub const SELECTION_SYSTEM_PROMPT: &str = "You choose which conversion tests to run on a web \
page. Available tests: contrast, cta, trust, density, form. Reply with JSON \
{\"tests\": [{\"type\": t, \"reason\": s}]}.";

/// DOM size above which a page counts as dense.
pub const MAX_ELEMENTS: usize = 1500;
pub const MAX_DEPTH: usize = 32;
/// Visible fields above which a form counts as too long.
pub const MAX_FORM_FIELDS: usize = 7;

/// Base impact per test type; unknown types get 50.
pub fn impact_score(test_type: &str) -> u8 {
    match test_type.parse::<AdaptiveTestKind>() {
        Ok(AdaptiveTestKind::Contrast) => 85,
        Ok(AdaptiveTestKind::Cta) => 95,
        Ok(AdaptiveTestKind::Trust) => 90,
        Ok(AdaptiveTestKind::Density) => 70,
        Ok(AdaptiveTestKind::Form) => 88,
        Err(_) => 50,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrustReport {
    pub phone: bool,
    pub email: bool,
    pub ssl_badge: bool,
    pub payment_badges: bool,
    pub reviews: bool,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DensityReport {
    pub element_count: usize,
    pub max_depth: usize,
    pub excessive: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormReport {
    pub form_count: usize,
    pub field_counts: Vec<usize>,
    pub max_fields: usize,
    pub unlabeled_inputs: usize,
    pub excessive: bool,
}

/// Every adaptive check, computed once per parsed document.
#[derive(Debug, Clone)]
pub struct AdaptiveFindings {
    pub contrast: ContrastReport,
    pub cta: CtaReport,
    pub trust: TrustReport,
    pub density: DensityReport,
    pub form: FormReport,
}

impl AdaptiveFindings {
    pub fn collect(document: &Html, snap: &PageSnapshot) -> Self {
        Self {
            contrast: check_contrast(document),
            cta: check_cta(document),
            trust: check_trust(document, snap),
            density: check_density(document),
            form: check_forms(snap),
        }
    }

    pub fn result(&self, kind: AdaptiveTestKind) -> Value {
        let value = match kind {
            AdaptiveTestKind::Contrast => serde_json::to_value(&self.contrast),
            AdaptiveTestKind::Cta => serde_json::to_value(&self.cta),
            AdaptiveTestKind::Trust => serde_json::to_value(&self.trust),
            AdaptiveTestKind::Density => serde_json::to_value(&self.density),
            AdaptiveTestKind::Form => serde_json::to_value(&self.form),
        };
        value.unwrap_or(Value::Null)
    }
}

/// A test chosen for a page, with why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub kind: AdaptiveTestKind,
    pub reason: String,
}

/// Deterministic test plan.
pub fn fallback_selection(page_type: PageType, form_count: usize) -> Vec<Selection> {
    let mut plan = vec![
        Selection {
            kind: AdaptiveTestKind::Contrast,
            reason: "Every page needs readable calls to action".to_string(),
        },
        Selection {
            kind: AdaptiveTestKind::Cta,
            reason: "Every page should lead the visitor to one clear next step".to_string(),
        },
        Selection {
            kind: AdaptiveTestKind::Density,
            reason: "Heavy pages slow visitors down".to_string(),
        },
    ];
    if matches!(
        page_type,
        PageType::Homepage
            | PageType::Pricing
            | PageType::Checkout
            | PageType::Product
            | PageType::Landing
    ) {
        plan.push(Selection {
            kind: AdaptiveTestKind::Trust,
            reason: format!("{page_type} pages ask visitors for commitment"),
        });
    }
    if form_count > 0 {
        plan.push(Selection {
            kind: AdaptiveTestKind::Form,
            reason: format!("Page has {form_count} form(s)"),
        });
    }
    plan
}

#[derive(Deserialize)]
struct SelectionReply {
    #[serde(default)]
    tests: Vec<ProposedTest>,
}

#[derive(Deserialize)]
struct ProposedTest {
    #[serde(rename = "type", alias = "test_type")]
    kind: String,
    #[serde(default)]
    reason: String,
}

/// Ask the AI for a test plan; fall back to [`fallback_selection`].
pub async fn select_tests(
    assistant: &Assistant,
    page_type: PageType,
    snap: &PageSnapshot,
    owner_context: &[String],
) -> Vec<Selection> {
    let prompt = json!({
        "page_type": page_type,
        "title": snap.title,
        "form_count": snap.forms.len(),
        "button_count": snap.buttons.len(),
        "word_count": snap.word_count,
        "owner_answers": owner_context,
    })
    .to_string();

    let mut seen = HashSet::new();
    let chosen: Vec<Selection> = assistant
        .ask_json::<SelectionReply>(SELECTION_SYSTEM_PROMPT, &prompt)
        .await
        .map(|reply| {
            reply
                .tests
                .into_iter()
                .filter_map(|t| {
                    let kind = t.kind.trim().parse::<AdaptiveTestKind>().ok()?;
                    seen.insert(kind).then(|| Selection {
                        kind,
                        reason: if t.reason.trim().is_empty() {
                            "Selected by AI".to_string()
                        } else {
                            t.reason.trim().to_string()
                        },
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if chosen.is_empty() {
        debug!(%page_type, "using fallback test plan");
        fallback_selection(page_type, snap.forms.len())
    } else {
        chosen
    }
}

/// Turn a plan into persistable test rows.
pub fn execute(plan: &[Selection], findings: &AdaptiveFindings) -> Vec<NewAdaptiveTest> {
    plan.iter()
        .map(|s| NewAdaptiveTest {
            test_type: s.kind.to_string(),
            decision_reason: s.reason.clone(),
            result: findings.result(s.kind),
            impact_score: impact_score(s.kind.as_str()),
        })
        .collect()
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:\+\d{1,3}[\s.-]?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}\b")
            .expect("valid regex")
    })
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid regex")
    })
}

const SSL_KEYWORDS: &[&str] = &[
    "ssl",
    "secure checkout",
    "secured by",
    "256-bit",
    "norton",
    "mcafee",
    "trustwave",
    "comodo",
];
const PAYMENT_KEYWORDS: &[&str] = &[
    "visa",
    "mastercard",
    "paypal",
    "american express",
    "amex",
    "apple pay",
    "google pay",
    "stripe",
    "klarna",
];
const REVIEW_KEYWORDS: &[&str] = &[
    "review",
    "testimonial",
    "rating",
    "trustpilot",
    "stars",
    "★",
];

pub fn check_trust(document: &Html, snap: &PageSnapshot) -> TrustReport {
    let text = snap.visible_text.to_lowercase();
    // badges are usually images, so look at alt text and file names too
    let mut badge_text = text.clone();
    for img in &snap.images {
        badge_text.push(' ');
        badge_text.push_str(&img.src.to_lowercase());
        if let Some(alt) = &img.alt {
            badge_text.push(' ');
            badge_text.push_str(&alt.to_lowercase());
        }
    }
    let has_any = |keywords: &[&str]| keywords.iter().any(|k| badge_text.contains(k));

    let phone = !query(document, r#"a[href^="tel:"]"#).is_empty()
        || phone_re().is_match(&snap.visible_text);
    let email = !query(document, r#"a[href^="mailto:"]"#).is_empty()
        || email_re().is_match(&snap.visible_text);
    let ssl_badge = has_any(SSL_KEYWORDS);
    let payment_badges = has_any(PAYMENT_KEYWORDS);
    let reviews = has_any(REVIEW_KEYWORDS)
        || !query(document, r#"[itemprop="review"], [itemprop="aggregateRating"]"#).is_empty();

    let missing = [
        ("phone", phone),
        ("email", email),
        ("ssl_badge", ssl_badge),
        ("payment_badges", payment_badges),
        ("reviews", reviews),
    ]
    .iter()
    .filter(|(_, found)| !found)
    .map(|(name, _)| name.to_string())
    .collect();

    TrustReport {
        phone,
        email,
        ssl_badge,
        payment_badges,
        reviews,
        missing,
    }
}

/// Element count and deepest element nesting below `<html>`.
pub fn check_density(document: &Html) -> DensityReport {
    let root = document.root_element();
    let mut element_count = 0usize;
    let mut max_depth = 0usize;
    let mut stack = vec![(*root, 1usize)];

    while let Some((node, depth)) = stack.pop() {
        if !node.value().is_element() {
            continue;
        }
        element_count += 1;
        max_depth = max_depth.max(depth);
        for child in node.children() {
            stack.push((child, depth + 1));
        }
    }

    DensityReport {
        element_count,
        max_depth,
        excessive: element_count > MAX_ELEMENTS || max_depth > MAX_DEPTH,
    }
}

pub fn check_forms(snap: &PageSnapshot) -> FormReport {
    let field_counts: Vec<usize> = snap
        .forms
        .iter()
        .map(|f| f.visible_fields().count())
        .collect();
    let unlabeled_inputs = snap
        .forms
        .iter()
        .flat_map(|f| f.visible_fields())
        .filter(|f| !f.has_label)
        .count();
    let max_fields = field_counts.iter().copied().max().unwrap_or(0);
    FormReport {
        form_count: snap.forms.len(),
        field_counts,
        max_fields,
        unlabeled_inputs,
        excessive: max_fields > MAX_FORM_FIELDS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::extract_snapshot;
    use crate::llm::ScriptedBackend;
    use std::sync::Arc;
    use std::time::Duration;

    fn findings(html: &str) -> AdaptiveFindings {
        let doc = Html::parse_document(html);
        let snap = extract_snapshot(html);
        AdaptiveFindings::collect(&doc, &snap)
    }

    #[test]
    fn test_impact_table() {
        assert_eq!(impact_score("contrast"), 85);
        assert_eq!(impact_score("cta"), 95);
        assert_eq!(impact_score("trust"), 90);
        assert_eq!(impact_score("density"), 70);
        assert_eq!(impact_score("form"), 88);
        assert_eq!(impact_score("seo"), 50);
    }

    #[test]
    fn test_fallback_plan_by_page_type() {
        let kinds = |plan: Vec<Selection>| plan.into_iter().map(|s| s.kind).collect::<Vec<_>>();
        assert_eq!(
            kinds(fallback_selection(PageType::Blog, 0)),
            vec![
                AdaptiveTestKind::Contrast,
                AdaptiveTestKind::Cta,
                AdaptiveTestKind::Density
            ]
        );
        assert_eq!(
            kinds(fallback_selection(PageType::Pricing, 2)),
            vec![
                AdaptiveTestKind::Contrast,
                AdaptiveTestKind::Cta,
                AdaptiveTestKind::Density,
                AdaptiveTestKind::Trust,
                AdaptiveTestKind::Form
            ]
        );
    }

    #[test]
    fn test_trust_signals() {
        let f = findings(
            r#"<p>Call us at (555) 123-4567</p><a href="mailto:hi@acme.com">Email</a>
               <img src="/img/visa.svg" alt="Visa"><p>Read our customer reviews</p>"#,
        );
        assert!(f.trust.phone);
        assert!(f.trust.email);
        assert!(f.trust.payment_badges);
        assert!(f.trust.reviews);
        assert!(!f.trust.ssl_badge);
        assert_eq!(f.trust.missing, vec!["ssl_badge"]);

        let bare = findings("<p>Nothing here</p>");
        assert_eq!(bare.trust.missing.len(), 5);
    }

    #[test]
    fn test_density_counts_and_depth() {
        let f = findings("<html><body><div><p>a</p><p>b</p></div></body></html>");
        // html, head, body, div, p, p
        assert_eq!(f.density.element_count, 6);
        assert_eq!(f.density.max_depth, 4);
        assert!(!f.density.excessive);

        let deep = format!("{}x{}", "<div>".repeat(40), "</div>".repeat(40));
        assert!(findings(&deep).density.excessive);
    }

    #[test]
    fn test_form_report() {
        let fields: String = (0..8).map(|i| format!(r#"<input name="f{i}">"#)).collect();
        let f = findings(&format!(
            r#"<form><label>Email <input name="e"></label></form><form>{fields}</form>"#
        ));
        assert_eq!(f.form.form_count, 2);
        assert_eq!(f.form.field_counts, vec![1, 8]);
        assert_eq!(f.form.unlabeled_inputs, 8);
        assert!(f.form.excessive);
    }

    #[tokio::test]
    async fn test_ai_selection_dedupes_and_drops_unknown() {
        let reply = json!({"tests": [
            {"type": "cta", "reason": "Pricing page lives or dies by its CTA"},
            {"type": "seo", "reason": "?"},
            {"type": "cta", "reason": "again"},
            {"type": "form"}
        ]});
        let backend = Arc::new(ScriptedBackend::new().with_json("conversion tests", reply));
        let assistant = Assistant::new(backend, Duration::from_secs(1));
        let snap = extract_snapshot("<h1>Plans</h1>");

        let plan = select_tests(&assistant, PageType::Pricing, &snap, &[]).await;
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].kind, AdaptiveTestKind::Cta);
        assert_eq!(plan[1].reason, "Selected by AI");

        let disabled = select_tests(&Assistant::disabled(), PageType::Blog, &snap, &[]).await;
        assert_eq!(disabled.len(), 3);
    }

    #[test]
    fn test_execute_attaches_impact() {
        let f = findings("<button>Go</button>");
        let rows = execute(&fallback_selection(PageType::Other, 0), &f);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].test_type, "cta");
        assert_eq!(rows[1].impact_score, 95);
        assert_eq!(rows[1].result["has_prominent_cta"], json!(false));
    }
}
