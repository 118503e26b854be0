//! WCAG contrast checks over inline colors of interactive elements.

use crate::acquisition::structured::{control_label, query, INTERACTIVE_SELECTOR};
use scraper::Html;
use serde::Serialize;

/// Minimum acceptable contrast ratio (WCAG AA, normal text).
pub const MIN_CONTRAST: f64 = 4.5;
/// Interactive elements inspected per page.
pub const SCAN_LIMIT: usize = 20;
/// Offending elements reported per page.
pub const EXAMPLE_LIMIT: usize = 3;

pub const DEFAULT_BACKGROUND: Rgb = Rgb(0xFF, 0xFF, 0xFF);
pub const DEFAULT_FOREGROUND: Rgb = Rgb(0x00, 0x00, 0x00);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContrastExample {
    pub text: String,
    pub foreground: String,
    pub background: String,
    pub ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContrastReport {
    pub checked: usize,
    pub low_contrast_count: usize,
    pub examples: Vec<ContrastExample>,
}

/// Parse `#rgb`, `#rrggbb`, `rgb()`/`rgba()`, `white`, or `black`.
pub fn parse_color(raw: &str) -> Option<Rgb> {
    let value = raw.trim().trim_end_matches("!important").trim().to_ascii_lowercase();
    if let Some(hex) = value.strip_prefix('#') {
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return None,
        };
        let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
        return Some(Rgb(channel(0)?, channel(2)?, channel(4)?));
    }
    if let Some(args) = value
        .strip_prefix("rgba(")
        .or_else(|| value.strip_prefix("rgb("))
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let parts: Vec<u8> = args
            .split(',')
            .take(3)
            .map(|p| p.trim().parse::<f64>().ok().map(|v| v.clamp(0.0, 255.0) as u8))
            .collect::<Option<_>>()?;
        if parts.len() == 3 {
            return Some(Rgb(parts[0], parts[1], parts[2]));
        }
        return None;
    }
    match value.as_str() {
        "white" => Some(Rgb(255, 255, 255)),
        "black" => Some(Rgb(0, 0, 0)),
        _ => None,
    }
}

/// WCAG relative luminance.
pub fn relative_luminance(color: Rgb) -> f64 {
    let linear = |c: u8| {
        let v = c as f64 / 255.0;
        if v <= 0.03928 {
            v / 12.92
        } else {
            ((v + 0.055) / 1.055).powf(2.4)
        }
    };
    0.2126 * linear(color.0) + 0.7152 * linear(color.1) + 0.0722 * linear(color.2)
}

/// `(L_light + 0.05) / (L_dark + 0.05)`, always ≥ 1.
pub fn contrast_ratio(a: Rgb, b: Rgb) -> f64 {
    let (la, lb) = (relative_luminance(a), relative_luminance(b));
    let (light, dark) = if la >= lb { (la, lb) } else { (lb, la) };
    (light + 0.05) / (dark + 0.05)
}

/// `prop: value` pairs of an inline style attribute, properties lowercased.
pub fn style_declarations(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim().to_ascii_lowercase();
            let value = value.trim().to_string();
            (!prop.is_empty() && !value.is_empty()).then_some((prop, value))
        })
        .collect()
}

/// Foreground and background from inline styles, with page defaults.
fn inline_colors(style: Option<&str>) -> (Rgb, Rgb) {
    let mut fg = DEFAULT_FOREGROUND;
    let mut bg = DEFAULT_BACKGROUND;
    for (prop, value) in style_declarations(style.unwrap_or("")) {
        match prop.as_str() {
            "color" => fg = parse_color(&value).unwrap_or(fg),
            "background-color" => bg = parse_color(&value).unwrap_or(bg),
            "background" => {
                if let Some(c) = value.split_whitespace().find_map(parse_color) {
                    bg = c;
                }
            }
            _ => {}
        }
    }
    (fg, bg)
}

pub fn check_contrast(document: &Html) -> ContrastReport {
    let mut report = ContrastReport {
        checked: 0,
        low_contrast_count: 0,
        examples: Vec::new(),
    };

    for el in query(document, INTERACTIVE_SELECTOR).into_iter().take(SCAN_LIMIT) {
        report.checked += 1;
        let (fg, bg) = inline_colors(el.value().attr("style"));
        let ratio = contrast_ratio(fg, bg);
        if ratio < MIN_CONTRAST {
            report.low_contrast_count += 1;
            if report.examples.len() < EXAMPLE_LIMIT {
                report.examples.push(ContrastExample {
                    text: control_label(el),
                    foreground: fg.hex(),
                    background: bg.hex(),
                    ratio: (ratio * 100.0).round() / 100.0,
                });
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_black_on_white_is_21() {
        let ratio = contrast_ratio(Rgb(0, 0, 0), Rgb(255, 255, 255));
        assert!((ratio - 21.0).abs() < 0.01, "{ratio}");
    }

    #[test]
    fn test_ratio_bounds_and_symmetry() {
        let colors = [
            Rgb(0, 0, 0),
            Rgb(255, 255, 255),
            Rgb(119, 119, 119),
            Rgb(200, 30, 60),
            Rgb(3, 160, 250),
        ];
        for a in colors {
            assert!((contrast_ratio(a, a) - 1.0).abs() < 1e-9);
            for b in colors {
                let ab = contrast_ratio(a, b);
                assert!(ab >= 1.0);
                assert!((ab - contrast_ratio(b, a)).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_parse_color_forms() {
        assert_eq!(parse_color("#fff"), Some(Rgb(255, 255, 255)));
        assert_eq!(parse_color("#1A2b3C"), Some(Rgb(0x1A, 0x2B, 0x3C)));
        assert_eq!(parse_color("rgb(10, 20, 30)"), Some(Rgb(10, 20, 30)));
        assert_eq!(parse_color("rgba(10,20,30,0.5)"), Some(Rgb(10, 20, 30)));
        assert_eq!(parse_color("#fff !important"), Some(Rgb(255, 255, 255)));
        assert_eq!(parse_color("#ggg"), None);
        assert_eq!(parse_color("#abcd"), None);
        assert_eq!(parse_color("papayawhip"), None);
    }

    #[test]
    fn test_flags_low_contrast_and_caps_examples() {
        let html = r#"
            <a href="/a" style="color: #777">light grey</a>
            <button style="color:#fff; background-color:#ff0">yellow</button>
            <a href="/b">plain</a>
            <a href="/c" style="color:#eee">one</a>
            <a href="/d" style="color:#ddd">two</a>
        "#;
        let report = check_contrast(&Html::parse_document(html));
        assert_eq!(report.checked, 5);
        assert_eq!(report.low_contrast_count, 4);
        assert_eq!(report.examples.len(), EXAMPLE_LIMIT);
        assert_eq!(report.examples[0].text, "light grey");
        assert_eq!(report.examples[1].background, "#FFFF00");
    }

    #[test]
    fn test_scan_limit() {
        let html: String = (0..30)
            .map(|i| format!(r#"<a href="/{i}" style="color:#fff">x</a>"#))
            .collect();
        let report = check_contrast(&Html::parse_document(&html));
        assert_eq!(report.checked, SCAN_LIMIT);
        assert_eq!(report.low_contrast_count, SCAN_LIMIT);
    }
}
