//! JSON payload extraction from free-form model answers
//!
//! Answers are supposed to be a JSON object but arrive wrapped in code fences, with
//! template-doubled braces, or surrounded by prose. Candidates are tried in order and the
//! first that parses as an object wins:
//!
//! 1. the text with any code fence removed
//! 2. a single outer `{{ ... }}` pair reduced to `{ ... }`
//! 3. every `{{` / `}}` collapsed to `{` / `}`
//! 4. the slice between the first `{` and the last `}`, as-is and collapsed

use serde_json::Value;

use crate::errors::{AppError, Result};

/// Longest answer excerpt carried in a format error
const EXCERPT_CHARS: usize = 200;

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after_open = &trimmed[open + 3..];
    // Skip the info string (e.g. `json`) up to the end of the fence line
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    match body.rfind("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

fn unwrap_double_braces(text: &str) -> Option<String> {
    let inner = text.strip_prefix("{{")?.strip_suffix("}}")?;
    Some(format!("{{{}}}", inner))
}

fn collapse_braces(text: &str) -> String {
    text.replace("{{", "{").replace("}}", "}")
}

fn outer_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn excerpt(text: &str) -> String {
    let mut out: String = text.chars().take(EXCERPT_CHARS).collect();
    if text.chars().count() > EXCERPT_CHARS {
        out.push_str("...");
    }
    out
}

/// Extract the JSON object embedded in `text`
pub fn extract_json_payload(text: &str) -> Result<Value> {
    let body = strip_code_fence(text);

    let mut candidates = vec![body.to_string()];
    if let Some(unwrapped) = unwrap_double_braces(body) {
        candidates.push(unwrapped);
    }
    candidates.push(collapse_braces(body));
    if let Some(slice) = outer_object(body) {
        candidates.push(slice.to_string());
        candidates.push(collapse_braces(slice));
    }

    candidates
        .iter()
        .filter_map(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .find(Value::is_object)
        .ok_or_else(|| AppError::ExternalFormat {
            message: format!("Answer is not a JSON object: {}", excerpt(text.trim())),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expected() -> Value {
        json!({ "results": [{ "article_identifier": "W1", "abstract": "About W1" }] })
    }

    const PLAIN: &str = r#"{"results": [{"article_identifier": "W1", "abstract": "About W1"}]}"#;

    #[test]
    fn test_plain_json() {
        assert_eq!(extract_json_payload(PLAIN).unwrap(), expected());
    }

    #[test]
    fn test_double_braces() {
        let wrapped = format!("{{{}}}", PLAIN);
        assert_eq!(extract_json_payload(&wrapped).unwrap(), expected());

        let templated = r#"{{"results": [{{"article_identifier": "W1", "abstract": "About W1"}}]}}"#;
        assert_eq!(extract_json_payload(templated).unwrap(), expected());
    }

    #[test]
    fn test_code_fence() {
        let fenced = format!("```json\n{}\n```", PLAIN);
        assert_eq!(extract_json_payload(&fenced).unwrap(), expected());

        let bare_fence = format!("Here you go:\n```\n{}\n```\nThanks", PLAIN);
        assert_eq!(extract_json_payload(&bare_fence).unwrap(), expected());
    }

    #[test]
    fn test_fenced_double_braces() {
        let both = format!("```json\n{{{}}}\n```", PLAIN);
        assert_eq!(extract_json_payload(&both).unwrap(), expected());
    }

    #[test]
    fn test_surrounding_prose() {
        let chatty = format!("The matching articles are {} as requested.", PLAIN);
        assert_eq!(extract_json_payload(&chatty).unwrap(), expected());
    }

    #[test]
    fn test_nested_closing_braces_survive() {
        let nested = r#"{"results": [], "meta": {"source": {"kind": "graph"}}}"#;
        let value = extract_json_payload(nested).unwrap();
        assert_eq!(value["meta"]["source"]["kind"], "graph");
    }

    #[test]
    fn test_non_object_is_format_error() {
        for text in ["", "no json here", "[1, 2, 3]", "{ broken"] {
            let err = extract_json_payload(text).unwrap_err();
            assert!(matches!(err, AppError::ExternalFormat { .. }), "{:?}", text);
        }
    }
}
