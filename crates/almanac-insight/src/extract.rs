//! Structured extraction of a JSON object from a generation reply.

use serde_json::{Map, Value};

use crate::error::InsightError;

/// How much surrounding prose the extractor tolerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractMode {
    /// The trimmed reply must be exactly one JSON object.
    Strict,
    /// The first balanced `{...}` block that parses as an object wins.
    #[default]
    Lenient,
}

/// Extract the JSON object carried by `reply`.
///
/// Never panics; any reply that does not yield an object is reported as
/// [`InsightError::Malformed`].
pub fn extract_json_object(reply: &str, mode: ExtractMode) -> Result<Map<String, Value>, InsightError> {
    match mode {
        ExtractMode::Strict => parse_object(reply.trim()),
        ExtractMode::Lenient => {
            let mut last_err = InsightError::Malformed("no JSON object found".to_string());
            for (start, _) in reply.match_indices('{') {
                if let Some(block) = balanced_block(&reply[start..]) {
                    match parse_object(block) {
                        Ok(object) => return Ok(object),
                        Err(e) => last_err = e,
                    }
                }
            }
            Err(last_err)
        }
    }
}

fn parse_object(text: &str) -> Result<Map<String, Value>, InsightError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(InsightError::Malformed(format!(
            "expected a JSON object, got {}",
            kind_of(&other)
        ))),
        Err(e) => Err(InsightError::Malformed(format!("invalid JSON: {}", e))),
    }
}

/// Prefix of `s` (which starts with `{`) up to its matching `}`.
fn balanced_block(s: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;

    for (i, c) in s.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match c {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_accepts_bare_object() {
        let object = extract_json_object("  {\"keyPoints\": [\"a\"]}\n", ExtractMode::Strict).unwrap();
        assert!(object.contains_key("keyPoints"));
    }

    #[test]
    fn test_strict_rejects_prose() {
        let result = extract_json_object("Here you go: {\"a\": 1}", ExtractMode::Strict);
        assert!(matches!(result, Err(InsightError::Malformed(_))));
    }

    #[test]
    fn test_lenient_skips_surrounding_prose() {
        let reply = "Sure! Here is the summary:\n```json\n{\"decisions\": [\"ship it\"]}\n```\nLet me know.";
        let object = extract_json_object(reply, ExtractMode::Lenient).unwrap();
        assert_eq!(object["decisions"][0], "ship it");
    }

    #[test]
    fn test_lenient_handles_braces_in_strings() {
        let reply = r#"Result: {"keyPoints": ["use {braces} and \"quotes\""]} trailing }"#;
        let object = extract_json_object(reply, ExtractMode::Lenient).unwrap();
        assert_eq!(object["keyPoints"][0], "use {braces} and \"quotes\"");
    }

    #[test]
    fn test_lenient_takes_first_parsable_block() {
        let reply = "{not json} then {\"questions\": []}";
        let object = extract_json_object(reply, ExtractMode::Lenient).unwrap();
        assert!(object.contains_key("questions"));
    }

    #[test]
    fn test_unbalanced_reply_fails_closed() {
        let result = extract_json_object("{\"keyPoints\": [\"a\"", ExtractMode::Lenient);
        assert!(matches!(result, Err(InsightError::Malformed(_))));
    }

    #[test]
    fn test_no_object_at_all() {
        assert!(extract_json_object("I cannot help with that.", ExtractMode::Lenient).is_err());
        assert!(extract_json_object("[1, 2]", ExtractMode::Strict).is_err());
        assert!(extract_json_object("", ExtractMode::Strict).is_err());
    }
}
