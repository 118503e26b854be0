//! Page metric groups. Pure functions of the document and optional CSS text.

use crate::acquisition::PageSnapshot;
use crate::crawl::{links::is_skipped_href, urls};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use url::Url;

#[derive(Debug, Clone, Serialize)]
pub struct PageMetrics {
    pub content: ContentMetrics,
    pub assets: AssetMetrics,
    pub links: LinkMetrics,
    pub visual: VisualMetrics,
    pub technical: TechnicalMetrics,
    pub ux: UxMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentMetrics {
    pub word_count: u32,
    pub paragraph_count: usize,
    pub heading_count: usize,
    pub h1_count: usize,
    pub title_length: usize,
    pub meta_description_length: usize,
    /// Visible text bytes over HTML bytes, 0..=1.
    pub text_ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetMetrics {
    pub image_count: usize,
    pub images_missing_alt: usize,
    pub script_count: usize,
    pub inline_script_count: usize,
    pub stylesheet_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkMetrics {
    pub total: usize,
    pub internal: usize,
    pub external: usize,
    pub nofollow: usize,
    pub empty_href: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisualMetrics {
    pub fonts: Vec<String>,
    pub colors: Vec<String>,
    pub inline_style_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TechnicalMetrics {
    pub https: bool,
    pub html_bytes: usize,
    pub has_viewport: bool,
    pub has_favicon: bool,
    pub has_canonical: bool,
    pub lang: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UxMetrics {
    pub form_count: usize,
    pub form_field_count: usize,
    pub button_count: usize,
    pub has_navigation: bool,
    pub cta_texts: Vec<String>,
}

fn font_family_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)font-family\s*:\s*([^;}{]+)").expect("valid regex"))
}

fn color_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)#[0-9a-f]{6}\b|#[0-9a-f]{3}\b|rgba?\([^)]*\)").expect("valid regex")
    })
}

/// Collect every metric group for one page.
///
/// `css` is extra stylesheet text; inline `<style>` blocks and `style`
/// attributes are always included.
pub fn collect_metrics(
    url: &Url,
    html: &str,
    snap: &PageSnapshot,
    css: Option<&str>,
) -> PageMetrics {
    let mut css_text = snap.inline_css.clone();
    if let Some(extra) = css {
        css_text.push('\n');
        css_text.push_str(extra);
    }
    for style in &snap.inline_styles {
        css_text.push('\n');
        css_text.push_str(style);
        css_text.push(';');
    }

    PageMetrics {
        content: ContentMetrics {
            word_count: snap.word_count,
            paragraph_count: snap.paragraph_count,
            heading_count: snap.headings.len(),
            h1_count: snap.h1_count(),
            title_length: snap.title.as_deref().map(|t| t.chars().count()).unwrap_or(0),
            meta_description_length: snap
                .meta_description()
                .map(|d| d.chars().count())
                .unwrap_or(0),
            text_ratio: if html.is_empty() {
                0.0
            } else {
                (snap.visible_text.len() as f64 / html.len() as f64).min(1.0)
            },
        },
        assets: AssetMetrics {
            image_count: snap.images.len(),
            images_missing_alt: snap
                .images
                .iter()
                .filter(|i| i.alt.as_deref().map_or(true, str::is_empty))
                .count(),
            script_count: snap.scripts.len(),
            inline_script_count: snap.inline_script_count,
            stylesheet_count: snap.stylesheets.len(),
        },
        links: link_metrics(url, snap),
        visual: VisualMetrics {
            fonts: extract_fonts(&css_text),
            colors: extract_colors(&css_text),
            inline_style_count: snap.inline_styles.len(),
        },
        technical: TechnicalMetrics {
            https: url.scheme() == "https",
            html_bytes: html.len(),
            has_viewport: snap.has_viewport,
            has_favicon: snap.has_favicon,
            has_canonical: snap.canonical.is_some(),
            lang: snap.lang.clone(),
        },
        ux: UxMetrics {
            form_count: snap.forms.len(),
            form_field_count: snap.forms.iter().map(|f| f.visible_fields().count()).sum(),
            button_count: snap.buttons.len(),
            has_navigation: snap.has_navigation,
            cta_texts: snap.buttons.iter().take(5).cloned().collect(),
        },
    }
}

fn link_metrics(url: &Url, snap: &PageSnapshot) -> LinkMetrics {
    let mut metrics = LinkMetrics {
        total: snap.links.len(),
        internal: 0,
        external: 0,
        nofollow: 0,
        empty_href: 0,
    };
    for link in &snap.links {
        if link.href.is_empty() {
            metrics.empty_href += 1;
        }
        if link.rel.as_deref().is_some_and(|r| r.contains("nofollow")) {
            metrics.nofollow += 1;
        }
        if is_skipped_href(&link.href) {
            continue;
        }
        match url.join(&link.href) {
            Ok(target) if urls::same_site(&target, url) => metrics.internal += 1,
            Ok(target) if urls::is_http(&target) => metrics.external += 1,
            _ => {}
        }
    }
    metrics
}

/// Distinct primary font families, lowercased, without quotes.
pub fn extract_fonts(css: &str) -> Vec<String> {
    let fonts: BTreeSet<String> = font_family_re()
        .captures_iter(css)
        .filter_map(|cap| cap.get(1))
        .filter_map(|m| m.as_str().split(',').next())
        .map(|f| {
            f.trim()
                .trim_end_matches("!important")
                .trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .to_ascii_lowercase()
        })
        .filter(|f| !f.is_empty() && f != "inherit")
        .collect();
    fonts.into_iter().collect()
}

/// Distinct color literals, lowercased.
pub fn extract_colors(css: &str) -> Vec<String> {
    let colors: BTreeSet<String> = color_re()
        .find_iter(css)
        .map(|m| m.as_str().to_ascii_lowercase().replace(' ', ""))
        .collect();
    colors.into_iter().collect()
}
