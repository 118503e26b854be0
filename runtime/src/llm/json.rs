//! Pull a JSON object out of free-form model output.

/// Find the first JSON object in `raw`: the whole string, a fenced code
/// block, or the first balanced `{...}` span.
pub fn extract_json_object(raw: &str) -> Option<String> {
    if raw.trim_start().starts_with('{') {
        return Some(trim_fences(raw));
    }

    let fence = "```";
    if let Some(start) = raw.find(fence) {
        let after_fence = &raw[start + fence.len()..];
        let after_lang =
            after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        if let Some(end) = after_lang.find(fence) {
            let block = &after_lang[..end];
            if block.contains('{') {
                return Some(trim_fences(block));
            }
        }
    }

    let open = raw.find('{')?;
    let rest = &raw[open..];
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in rest.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(rest[..=idx].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse the first JSON object in `raw`.
pub fn parse_json_object(raw: &str) -> Option<serde_json::Value> {
    let candidate = extract_json_object(raw)?;
    serde_json::from_str(&candidate).ok()
}

fn trim_fences(value: &str) -> String {
    value.trim().trim_matches('`').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_object() {
        assert_eq!(parse_json_object(r#" {"score": 80} "#), Some(json!({"score": 80})));
    }

    #[test]
    fn test_fenced_block() {
        let raw = "Here you go:\n```json\n{\"score\": 42}\n```\nThanks";
        assert_eq!(parse_json_object(raw), Some(json!({"score": 42})));
    }

    #[test]
    fn test_embedded_object_with_braces_in_strings() {
        let raw = r#"Result: {"issue": "uses {curly} text", "n": {"a": 1}} trailing"#;
        assert_eq!(
            parse_json_object(raw),
            Some(json!({"issue": "uses {curly} text", "n": {"a": 1}}))
        );
    }

    #[test]
    fn test_no_object() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(parse_json_object("{ broken"), None);
    }
}
