//! Recovering a JSON object from free-form model output.

use nerv_core::errors::AttemptError;
use serde_json::{Map, Value};

/// Parse `text` as a JSON object, falling back to the first balanced
/// `{...}` span when the whole text is not valid JSON.
pub fn parse_json_object(text: &str) -> Result<Map<String, Value>, AttemptError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AttemptError::EmptyResponse);
    }

    let value = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value,
        Err(whole_err) => {
            let span = first_balanced_object(trimmed)
                .ok_or_else(|| AttemptError::Parse(whole_err.to_string()))?;
            serde_json::from_str::<Value>(span).map_err(|e| AttemptError::Parse(e.to_string()))?
        }
    };

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(AttemptError::NotAnObject),
    }
}

/// First `{...}` span with balanced braces, ignoring braces inside strings.
pub fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
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
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_object() {
        let map = parse_json_object(r#"{"topic": "Weather"}"#).unwrap();
        assert_eq!(map["topic"], "Weather");
    }

    #[test]
    fn object_wrapped_in_prose() {
        let text = "Sure! Here is the result:\n```json\n{\"brief\": \"A {quoted} brace\"}\n```\nThanks.";
        let map = parse_json_object(text).unwrap();
        assert_eq!(map["brief"], "A {quoted} brace");
    }

    #[test]
    fn nested_objects_stay_balanced() {
        let text = r#"prefix {"a": {"b": 1}, "c": "x\"}"} trailing {"d": 2}"#;
        assert_eq!(first_balanced_object(text), Some(r#"{"a": {"b": 1}, "c": "x\"}"}"#));
    }

    #[test]
    fn array_is_not_an_object() {
        assert!(matches!(parse_json_object("[1, 2]"), Err(AttemptError::NotAnObject)));
    }

    #[test]
    fn no_object_is_parse_error() {
        assert!(matches!(parse_json_object("no json here"), Err(AttemptError::Parse(_))));
        assert!(matches!(parse_json_object("{ unterminated"), Err(AttemptError::Parse(_))));
    }

    #[test]
    fn blank_text_is_empty_response() {
        assert!(matches!(parse_json_object("  \n"), Err(AttemptError::EmptyResponse)));
    }
}
