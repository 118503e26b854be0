//! Parse page structure from raw HTML without DOM rendering.
//!
//! Extracts title, meta tags, headings, links, forms, buttons, images,
//! scripts, stylesheets, and visible text with `scraper` CSS selectors.
//! `scraper::Html` is not `Send`, so everything here is synchronous and
//! returns owned data.

use crate::model::{Heading, ImageAsset};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::BTreeMap;

/// Elements treated as calls to action: buttons and button-styled links.
pub const CTA_SELECTOR: &str = "button, input[type=\"submit\"], input[type=\"button\"], \
     a[class*=\"btn\"], a[class*=\"button\"], a[class*=\"cta\"], [role=\"button\"]";

/// Elements a visitor can click, in document order.
pub const INTERACTIVE_SELECTOR: &str = "a[href], button, input[type=\"submit\"], \
     input[type=\"button\"], [role=\"button\"]";

/// Everything the engine reads from one HTML document.
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub title: Option<String>,
    /// `name`/`property` → `content` for every `<meta>` that has both.
    pub meta: BTreeMap<String, String>,
    pub lang: Option<String>,
    pub canonical: Option<String>,
    pub has_viewport: bool,
    pub has_favicon: bool,
    pub has_navigation: bool,
    pub headings: Vec<Heading>,
    pub links: Vec<ExtractedLink>,
    pub forms: Vec<ExtractedForm>,
    /// Visible labels of CTA-like elements, in document order.
    pub buttons: Vec<String>,
    pub images: Vec<ImageAsset>,
    /// External script sources.
    pub scripts: Vec<String>,
    pub inline_script_count: usize,
    pub stylesheets: Vec<String>,
    /// Concatenated `<style>` blocks.
    pub inline_css: String,
    /// Every `style="..."` attribute value.
    pub inline_styles: Vec<String>,
    pub paragraph_count: usize,
    pub word_count: u32,
    pub visible_text: String,
}

impl PageSnapshot {
    pub fn meta_description(&self) -> Option<&str> {
        self.meta
            .get("description")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn h1_count(&self) -> usize {
        self.headings.iter().filter(|h| h.level == 1).count()
    }
}

/// A raw `<a href>` as written in the document.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedLink {
    pub href: String,
    pub text: String,
    pub rel: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedForm {
    pub action: Option<String>,
    pub method: String,
    pub fields: Vec<FormField>,
}

impl ExtractedForm {
    /// Fields a visitor actually fills in.
    pub fn visible_fields(&self) -> impl Iterator<Item = &FormField> {
        self.fields.iter().filter(|f| {
            !matches!(
                f.field_type.as_str(),
                "hidden" | "submit" | "button" | "reset" | "image"
            )
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FormField {
    pub name: Option<String>,
    pub field_type: String,
    pub has_label: bool,
}

/// Parse `html` and extract a [`PageSnapshot`].
pub fn extract_snapshot(html: &str) -> PageSnapshot {
    let document = Html::parse_document(html);
    snapshot_from_document(&document)
}

/// Extract a [`PageSnapshot`] from an already parsed document.
pub fn snapshot_from_document(document: &Html) -> PageSnapshot {
    let mut snap = PageSnapshot {
        title: query(document, "title")
            .first()
            .map(|el| element_text(*el))
            .filter(|t| !t.is_empty()),
        lang: query(document, "html")
            .first()
            .and_then(|el| el.value().attr("lang"))
            .map(|s| s.to_string()),
        canonical: query(document, r#"link[rel="canonical"]"#)
            .first()
            .and_then(|el| el.value().attr("href"))
            .map(|s| s.to_string()),
        has_viewport: !query(document, r#"meta[name="viewport"]"#).is_empty(),
        has_favicon: !query(
            document,
            r#"link[rel~="icon"], link[rel="apple-touch-icon"]"#,
        )
        .is_empty(),
        has_navigation: !query(document, r#"nav, [role="navigation"]"#).is_empty(),
        paragraph_count: query(document, "p").len(),
        ..Default::default()
    };

    extract_meta(document, &mut snap);
    extract_headings(document, &mut snap);
    extract_links(document, &mut snap);
    extract_forms(document, &mut snap);
    extract_assets(document, &mut snap);

    snap.buttons = query(document, CTA_SELECTOR)
        .into_iter()
        .map(control_label)
        .filter(|t| !t.is_empty())
        .collect();
    snap.inline_styles = query(document, "[style]")
        .into_iter()
        .filter_map(|el| el.value().attr("style").map(|s| s.to_string()))
        .collect();

    snap.visible_text = visible_text(document);
    snap.word_count = snap.visible_text.split_whitespace().count() as u32;
    snap
}

/// Run a CSS query against a document. Invalid selectors match nothing.
pub fn query<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(sel) => document.select(&sel).collect(),
        Err(_) => Vec::new(),
    }
}

/// Run a CSS query scoped to one element's subtree.
pub fn query_within<'a>(element: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(sel) => element.select(&sel).collect(),
        Err(_) => Vec::new(),
    }
}

/// Text content with whitespace collapsed.
pub fn element_text(element: ElementRef<'_>) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

/// What a visitor reads on a control: input value, text, or aria-label.
pub fn control_label(element: ElementRef<'_>) -> String {
    let value = element.value();
    if value.name() == "input" {
        return value.attr("value").unwrap_or("").trim().to_string();
    }
    let text = element_text(element);
    if text.is_empty() {
        value.attr("aria-label").unwrap_or("").trim().to_string()
    } else {
        text
    }
}

fn extract_meta(document: &Html, snap: &mut PageSnapshot) {
    for el in query(document, "meta[content]") {
        let attrs = el.value();
        let key = attrs.attr("name").or_else(|| attrs.attr("property"));
        if let (Some(key), Some(content)) = (key, attrs.attr("content")) {
            snap.meta
                .entry(key.trim().to_ascii_lowercase())
                .or_insert_with(|| content.to_string());
        }
    }
}

fn extract_headings(document: &Html, snap: &mut PageSnapshot) {
    for el in query(document, "h1, h2, h3, h4, h5, h6") {
        let level = el.value().name()[1..].parse::<u8>().unwrap_or(6);
        let text = element_text(el);
        if !text.is_empty() {
            snap.headings.push(Heading { level, text });
        }
    }
}

fn extract_links(document: &Html, snap: &mut PageSnapshot) {
    for el in query(document, "a[href]") {
        let attrs = el.value();
        snap.links.push(ExtractedLink {
            href: attrs.attr("href").unwrap_or("").trim().to_string(),
            text: element_text(el),
            rel: attrs.attr("rel").map(|s| s.to_ascii_lowercase()),
        });
    }
}

fn extract_forms(document: &Html, snap: &mut PageSnapshot) {
    let labelled_ids: Vec<String> = query(document, "label[for]")
        .into_iter()
        .filter_map(|l| l.value().attr("for").map(|s| s.to_string()))
        .collect();

    for form in query(document, "form") {
        let action = form.value().attr("action").map(|s| s.to_string());
        let method = form.value().attr("method").unwrap_or("get").to_uppercase();

        let fields = query_within(form, "input, select, textarea")
            .into_iter()
            .map(|field| {
                let attrs = field.value();
                let in_label = field.ancestors().any(|a| {
                    a.value()
                        .as_element()
                        .map(|e| e.name() == "label")
                        .unwrap_or(false)
                });
                let has_label = in_label
                    || attrs.attr("aria-label").is_some()
                    || attrs
                        .attr("id")
                        .map(|id| labelled_ids.iter().any(|l| l == id))
                        .unwrap_or(false);
                FormField {
                    name: attrs.attr("name").map(|s| s.to_string()),
                    field_type: attrs
                        .attr("type")
                        .unwrap_or(attrs.name())
                        .to_ascii_lowercase(),
                    has_label,
                }
            })
            .collect();

        snap.forms.push(ExtractedForm {
            action,
            method,
            fields,
        });
    }
}

fn extract_assets(document: &Html, snap: &mut PageSnapshot) {
    for img in query(document, "img") {
        let attrs = img.value();
        let src = attrs
            .attr("src")
            .or_else(|| attrs.attr("data-src"))
            .unwrap_or("")
            .to_string();
        snap.images.push(ImageAsset {
            src,
            alt: attrs.attr("alt").map(|s| s.trim().to_string()),
        });
    }

    for script in query(document, "script") {
        match script.value().attr("src") {
            Some(src) => snap.scripts.push(src.to_string()),
            None => snap.inline_script_count += 1,
        }
    }

    snap.stylesheets = query(document, r#"link[rel~="stylesheet"][href]"#)
        .into_iter()
        .filter_map(|l| l.value().attr("href").map(|s| s.to_string()))
        .collect();

    snap.inline_css = query(document, "style")
        .into_iter()
        .map(|s| s.text().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n");
}

/// Body text a visitor can read: skips script, style, noscript, template, title.
fn visible_text(document: &Html) -> String {
    let mut out = String::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name().to_string()))
            .map(|name| {
                matches!(
                    name.as_str(),
                    "script" | "style" | "noscript" | "template" | "title"
                )
            })
            .unwrap_or(false);
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(trimmed);
        }
    }
    out
}
