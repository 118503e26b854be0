//! URL normalization: the visited-set key for every crawl.

use crate::error::{AuditError, AuditResult};
use url::Url;

/// Parse a user-supplied seed. Adds `https://` when no scheme is given.
pub fn normalize_seed(raw: &str) -> AuditResult<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AuditError::InvalidSeed(raw.to_string()));
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let url = Url::parse(&with_scheme).map_err(|_| AuditError::InvalidSeed(raw.to_string()))?;
    if !is_http(&url) || url.host_str().is_none() {
        return Err(AuditError::InvalidSeed(raw.to_string()));
    }
    Ok(normalize(&url))
}

/// Canonical form of a URL.
///
/// `url` already lowercases scheme and host and drops default ports. On top
/// of that the fragment and query string are removed and a trailing `/` is
/// stripped from every path except the root.
pub fn normalize(url: &Url) -> Url {
    let mut out = url.clone();
    out.set_fragment(None);
    out.set_query(None);
    let path = out.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        out.set_path(path.trim_end_matches('/'));
    }
    out
}

/// Parse and normalize, returning the string key.
pub fn normalize_str(raw: &str) -> Option<String> {
    Url::parse(raw).ok().map(|u| normalize(&u).to_string())
}

pub fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Host with any leading `www.` removed.
pub fn site_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| {
        let h = h.to_ascii_lowercase();
        h.strip_prefix("www.").map(str::to_string).unwrap_or(h)
    })
}

/// Both URLs belong to the same site, ignoring a `www.` prefix.
pub fn same_site(a: &Url, b: &Url) -> bool {
    match (site_host(a), site_host(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Normalized `url` keyed under `site`'s host when the two are the same
/// site, so `www.example.com/pricing` and `example.com/pricing` share one
/// visited-set entry.
pub fn normalize_on(url: &Url, site: &Url) -> Url {
    let mut out = normalize(url);
    if same_site(url, site) && url.host_str() != site.host_str() {
        if let Some(host) = site.host_str() {
            // fails only for hosts that cannot carry a domain, never for http(s)
            let _ = out.set_host(Some(host));
        }
    }
    out
}

/// Path of a stored URL string, `/` when it cannot be parsed.
pub fn path_of(raw: &str) -> String {
    Url::parse(raw)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| "/".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_gets_scheme_and_root_path() {
        let url = normalize_seed("example.com").unwrap();
        assert_eq!(url.as_str(), "https://example.com/");

        let url = normalize_seed("  http://Example.COM:80/Shop/?q=1#top ").unwrap();
        assert_eq!(url.as_str(), "http://example.com/Shop");
    }

    #[test]
    fn test_seed_rejects_garbage() {
        assert!(normalize_seed("").is_err());
        assert!(normalize_seed("ftp://example.com").is_err());
        assert!(normalize_seed("https://").is_err());
    }

    #[test]
    fn test_normalize_collapses_variants() {
        let a = normalize_str("https://example.com/about/").unwrap();
        let b = normalize_str("HTTPS://EXAMPLE.com:443/about#team").unwrap();
        let c = normalize_str("https://example.com/about?ref=nav").unwrap();
        assert_eq!(a, "https://example.com/about");
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(
            normalize_str("https://example.com").unwrap(),
            "https://example.com/"
        );
    }

    #[test]
    fn test_same_site_ignores_www() {
        let a = Url::parse("https://www.example.com/").unwrap();
        let b = Url::parse("https://example.com/pricing").unwrap();
        let c = Url::parse("https://blog.example.com/").unwrap();
        assert!(same_site(&a, &b));
        assert!(!same_site(&a, &c));
    }

    #[test]
    fn test_normalize_on_aligns_www() {
        let site = Url::parse("https://example.com/").unwrap();
        let www = Url::parse("https://WWW.example.com/pricing/?ref=1").unwrap();
        assert_eq!(
            normalize_on(&www, &site).as_str(),
            "https://example.com/pricing"
        );

        let site = Url::parse("https://www.example.com/").unwrap();
        let bare = Url::parse("https://example.com/about").unwrap();
        assert_eq!(
            normalize_on(&bare, &site).as_str(),
            "https://www.example.com/about"
        );

        let other = Url::parse("https://blog.example.com/post").unwrap();
        assert_eq!(
            normalize_on(&other, &site).as_str(),
            "https://blog.example.com/post"
        );
    }

    #[test]
    fn test_path_of() {
        assert_eq!(path_of("https://example.com/pricing"), "/pricing");
        assert_eq!(path_of("not a url"), "/");
    }
}
