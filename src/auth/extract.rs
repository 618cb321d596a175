//! Token extraction from JSON login responses

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("no value at '{path}' (missing segment '{segment}')")]
    Missing { path: String, segment: String },

    #[error("value at '{path}' is not a string or number")]
    NotScalar { path: String },
}

/// Walk `path` (dotted; numeric segments index arrays) into `store`
pub fn extract<'a>(store: &'a Value, path: &str) -> Result<&'a Value, ExtractionError> {
    let mut current = store;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        current = next.ok_or_else(|| ExtractionError::Missing {
            path: path.to_string(),
            segment: segment.to_string(),
        })?;
    }
    Ok(current)
}

/// Extract a token as text
pub fn extract_token(store: &Value, path: &str) -> Result<String, ExtractionError> {
    match extract(store, path)? {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(ExtractionError::NotScalar {
            path: path.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_nested() {
        let body = json!({ "data": { "token": "X" } });
        assert_eq!(extract(&body, "data.token").unwrap(), &json!("X"));
        assert_eq!(extract_token(&body, "data.token").unwrap(), "X");
    }

    #[test]
    fn test_extract_array_index() {
        let body = json!({ "tokens": [{ "value": "a" }, { "value": "b" }] });
        assert_eq!(extract_token(&body, "tokens.1.value").unwrap(), "b");
    }

    #[test]
    fn test_extract_missing_segment() {
        let body = json!({ "data": {} });
        assert_eq!(
            extract(&body, "data.token").unwrap_err(),
            ExtractionError::Missing {
                path: "data.token".to_string(),
                segment: "token".to_string(),
            }
        );
        assert!(matches!(
            extract_token(&json!({ "t": { "x": 1 } }), "t"),
            Err(ExtractionError::NotScalar { .. })
        ));
    }
}
