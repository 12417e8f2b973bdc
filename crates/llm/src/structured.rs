//! Structured output handling
//!
//! Model text is scraped for a JSON object here and nowhere else. Callers
//! receive either a schema-valid `serde_json::Value` or an error.

use jsonschema::JSONSchema;
use serde_json::Value;

use crate::LlmError;

/// Compiled JSON schema
pub struct SchemaValidator {
    compiled: JSONSchema,
}

impl SchemaValidator {
    pub fn new(schema: &Value) -> Result<Self, LlmError> {
        let compiled = JSONSchema::compile(schema)
            .map_err(|e| LlmError::Configuration(format!("Invalid JSON schema: {}", e)))?;
        Ok(Self { compiled })
    }

    /// Validate an instance, joining every violation into one message
    pub fn validate(&self, instance: &Value) -> Result<(), LlmError> {
        if let Err(errors) = self.compiled.validate(instance) {
            let messages: Vec<String> = errors
                .map(|e| format!("{} at {}", e, e.instance_path))
                .collect();
            return Err(LlmError::Schema(messages.join("; ")));
        }
        Ok(())
    }
}

/// Pull the first JSON object out of model text.
///
/// Handles bare JSON, fenced code blocks and objects embedded in prose.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }

    let unfenced = strip_code_fence(trimmed);
    if let Ok(value) = serde_json::from_str::<Value>(unfenced) {
        if value.is_object() {
            return Some(value);
        }
    }

    let mut search_from = 0;
    while let Some(offset) = unfenced[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_object_end(&unfenced[start..]) {
            if let Ok(value) = serde_json::from_str::<Value>(&unfenced[start..start + end]) {
                return Some(value);
            }
        }
        search_from = start + 1;
    }

    None
}

/// Extract and validate in one step
pub fn parse_structured(text: &str, validator: &SchemaValidator) -> Result<Value, LlmError> {
    let value = extract_json(text).ok_or_else(|| {
        LlmError::InvalidResponse(format!(
            "No JSON object in model output ({} chars)",
            text.len()
        ))
    })?;
    validator.validate(&value)?;
    Ok(value)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

/// Byte length of the balanced `{...}` at the start of `text`
fn balanced_object_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
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
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx + ch.len_utf8());
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
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "interest": {"type": "string", "enum": ["none", "low", "medium", "high", "unknown"]},
                "objections": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["interest"]
        })
    }

    #[test]
    fn test_extract_bare_json() {
        let value = extract_json(r#"{"interest":"high"}"#).unwrap();
        assert_eq!(value["interest"], "high");
    }

    #[test]
    fn test_extract_fenced_json() {
        let text = "```json\n{\"interest\": \"low\", \"objections\": [\"price\"]}\n```";
        let value = extract_json(text).unwrap();
        assert_eq!(value["objections"][0], "price");
    }

    #[test]
    fn test_extract_json_in_prose() {
        let text = r#"Sure! Here is the analysis: {"interest": "medium", "note": "said {maybe}"} Hope that helps."#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["interest"], "medium");
        assert_eq!(value["note"], "said {maybe}");
    }

    #[test]
    fn test_extract_none() {
        assert!(extract_json("I think they are interested.").is_none());
        assert!(extract_json("{ not json").is_none());
    }

    #[test]
    fn test_schema_validation() {
        let validator = SchemaValidator::new(&schema()).unwrap();
        assert!(parse_structured(r#"{"interest":"high"}"#, &validator).is_ok());

        let err = parse_structured(r#"{"interest":"ecstatic"}"#, &validator).unwrap_err();
        assert!(matches!(err, LlmError::Schema(_)));

        let err = parse_structured("no json here", &validator).unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }
}
