use serde::{Deserialize, Serialize};
use std::fmt;

pub use serde_json::Value;

/// JSON object used for node configuration and output records.
pub type Map = serde_json::Map<String, Value>;

/// Generic fallback handle carried by streaming producers.
pub const RESPONSE_HANDLE: &str = "response";

/// Generic fallback handle carried by text producers.
pub const OUTPUT_HANDLE: &str = "output";

/// Handle → value mapping produced by a node, either partially while
/// streaming or as its final, committed result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputRecord(Map);

impl OutputRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn with_output(mut self, handle: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(handle.into(), value.into());
        self
    }

    pub fn insert(&mut self, handle: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(handle.into(), value.into())
    }

    pub fn get(&self, handle: &str) -> Option<&Value> {
        self.0.get(handle)
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.0.contains_key(handle)
    }

    /// Live content that is fanned out to downstream sinks, if any.
    pub fn response(&self) -> Option<&Value> {
        self.0.get(RESPONSE_HANDLE)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map {
        &self.0
    }

    pub fn into_map(self) -> Map {
        self.0
    }
}

impl From<Map> for OutputRecord {
    fn from(map: Map) -> Self {
        Self(map)
    }
}

impl fmt::Display for OutputRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(json) => f.write_str(&json),
            Err(_) => f.write_str("{}"),
        }
    }
}

/// Pulls a value out of a producer's record.
///
/// Lookup order is the exact handle, then `response`, then `output`, and
/// finally the whole record rendered as a JSON string.
pub fn extract_handle(record: &OutputRecord, handle: &str) -> Value {
    record
        .get(handle)
        .or_else(|| record.get(RESPONSE_HANDLE))
        .or_else(|| record.get(OUTPUT_HANDLE))
        .cloned()
        .unwrap_or_else(|| Value::String(record.to_string()))
}

/// Text form of a value for template substitution and display sinks.
/// Strings are used as-is; everything else is rendered as JSON.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_prefers_exact_handle() {
        let record = OutputRecord::new()
            .with_output("summary", "short")
            .with_output("response", "long");
        assert_eq!(extract_handle(&record, "summary"), json!("short"));
    }

    #[test]
    fn extract_falls_back_to_response_then_output() {
        let record = OutputRecord::new()
            .with_output("response", "r")
            .with_output("output", "o");
        assert_eq!(extract_handle(&record, "missing"), json!("r"));

        let record = OutputRecord::new().with_output("output", "o");
        assert_eq!(extract_handle(&record, "missing"), json!("o"));
    }

    #[test]
    fn extract_stringifies_whole_record_as_last_resort() {
        let record = OutputRecord::new().with_output("schema", json!({"name": "X"}));
        assert_eq!(
            extract_handle(&record, "content"),
            json!(r#"{"schema":{"name":"X"}}"#)
        );
    }

    #[test]
    fn value_to_text_keeps_strings_raw() {
        assert_eq!(value_to_text(&json!("plain")), "plain");
        assert_eq!(value_to_text(&json!(42)), "42");
        assert_eq!(value_to_text(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
