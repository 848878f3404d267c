// ABOUTME: Builds stable deduplication keys from method, path and parameters.
// ABOUTME: Semantically identical requests produce the same key string.

use std::fmt;

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

/// A deduplication key of the form `METHOD:path:params`.
///
/// Params are serialized to compact JSON with object keys sorted at every
/// level, so field order in the caller's params never changes the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey(String);

impl RequestKey {
    /// Build a key from a method, endpoint path and serializable params.
    pub fn new<P>(method: &Method, path: &str, params: &P) -> Result<Self, serde_json::Error>
    where
        P: Serialize + ?Sized,
    {
        let value = serde_json::to_value(params)?;
        let params = match value {
            Value::Null => "{}".to_string(),
            other => canonical(other).to_string(),
        };
        Ok(Self(format!("{}:{}:{}", method.as_str(), path, params)))
    }

    /// Build a key for a request without params.
    pub fn bare(method: &Method, path: &str) -> Self {
        Self(format!("{}:{}:{{}}", method.as_str(), path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<RequestKey> for String {
    fn from(key: RequestKey) -> Self {
        key.0
    }
}

fn canonical(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, canonical(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonical).collect()),
        other => other,
    }
}
