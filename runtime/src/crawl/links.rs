//! Same-site outbound link extraction.

use super::urls;
use crate::acquisition::structured::ExtractedLink;
use std::collections::HashSet;
use url::Url;

/// Outbound links kept per page.
pub const MAX_LINKS_PER_PAGE: usize = 50;

/// Resolve, filter, and normalize the raw anchors of one page.
///
/// Anchors resolve against `base` (the page's final URL). Keeps http(s)
/// targets on `site`, keyed under `site`'s host, in document order, without
/// duplicates or self-links, capped at [`MAX_LINKS_PER_PAGE`].
pub fn outbound_links(anchors: &[ExtractedLink], base: &Url, site: &Url) -> Vec<String> {
    let own_key = urls::normalize_on(base, site).to_string();
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for anchor in anchors {
        if out.len() >= MAX_LINKS_PER_PAGE {
            break;
        }
        if is_skipped_href(&anchor.href) {
            continue;
        }
        let Ok(resolved) = base.join(&anchor.href) else {
            continue;
        };
        if !urls::is_http(&resolved) || !urls::same_site(&resolved, site) {
            continue;
        }
        let key = urls::normalize_on(&resolved, site).to_string();
        if key == own_key {
            continue;
        }
        if seen.insert(key.clone()) {
            out.push(key);
        }
    }
    out
}

/// Empty, fragment-only, and non-navigational hrefs.
pub fn is_skipped_href(href: &str) -> bool {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return true;
    }
    let lower = href.to_ascii_lowercase();
    ["javascript:", "mailto:", "tel:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}
