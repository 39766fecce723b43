//! Lenient parsing for structured output.
//!
//! Providers deliver structured data two ways: JSON-mode bodies that may
//! arrive wrapped in markdown fences, and tool-call arguments that arrive
//! as strings containing heavily-escaped content (regex patterns, code
//! snippets). Both paths tolerate the mess without corrupting escapes.

use serde_json::Value;

use wh_domain::error::{Error, Result};

/// Strip a markdown code fence around a JSON body.
///
/// Best-effort: handles ```` ```json … ``` ```` and bare ```` ``` … ``` ````
/// wrappers; anything else passes through unchanged. JSON-mode providers
/// are expected to emit clean JSON — this is a safety net, not a parser.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Parse a JSON-mode response body, tolerating fence wrapping.
pub fn parse_json_output(raw: &str) -> Result<Value> {
    let cleaned = strip_code_fences(raw);
    serde_json::from_str(cleaned).map_err(|e| {
        Error::provider(format!("structured output is not valid JSON: {e}")).with_cause(e)
    })
}

/// Parse tool-call arguments leniently.
///
/// Arguments usually arrive as a JSON object, but several providers hand
/// back a *string* containing JSON — sometimes doubly encoded when the
/// payload carries escaped regex or quotes. String-first: unwrap string
/// layers until an object/array appears, never re-escaping the content.
pub fn parse_tool_arguments(raw: &Value) -> Value {
    match raw {
        Value::String(s) => {
            let mut current = s.clone();
            // Bounded unwrap so a literal string value cannot loop.
            for _ in 0..2 {
                match serde_json::from_str::<Value>(&current) {
                    Ok(Value::String(inner)) => current = inner,
                    Ok(parsed) => return parsed,
                    Err(_) => break,
                }
            }
            Value::String(current)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_is_unwrapped() {
        let raw = "```json\n{\"name\": \"John\"}\n```";
        assert_eq!(strip_code_fences(raw), "{\"name\": \"John\"}");
        let parsed = parse_json_output(raw).unwrap();
        assert_eq!(parsed["name"], "John");
    }

    #[test]
    fn bare_fence_is_unwrapped() {
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn unfenced_json_passes_through() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn invalid_json_output_is_provider_error() {
        let err = parse_json_output("I think the answer is 42").unwrap_err();
        assert_eq!(err.code, wh_domain::ErrorCode::Provider);
    }

    #[test]
    fn object_arguments_pass_through() {
        let raw = serde_json::json!({"name": "John Doe", "age": 30});
        assert_eq!(parse_tool_arguments(&raw), raw);
    }

    #[test]
    fn string_encoded_arguments_are_parsed() {
        let raw = Value::String(r#"{"name":"John Doe","age":30,"city":"New York"}"#.into());
        let parsed = parse_tool_arguments(&raw);
        assert_eq!(parsed["name"], "John Doe");
        assert_eq!(parsed["age"], 30);
    }

    #[test]
    fn escaped_regex_survives_parsing() {
        // The argument value carries an escaped regex; parsing must not
        // corrupt the backslashes.
        let raw = Value::String(r#"{"pattern": "^\\d{3}-\\d{4}$"}"#.into());
        let parsed = parse_tool_arguments(&raw);
        assert_eq!(parsed["pattern"], "^\\d{3}-\\d{4}$");
    }

    #[test]
    fn embedded_quotes_survive_parsing() {
        let raw = Value::String(r#"{"code": "println!(\"hello\")"}"#.into());
        let parsed = parse_tool_arguments(&raw);
        assert_eq!(parsed["code"], r#"println!("hello")"#);
    }

    #[test]
    fn plain_string_stays_a_string() {
        let raw = Value::String("not json at all".into());
        assert_eq!(parse_tool_arguments(&raw), raw);
    }
}
