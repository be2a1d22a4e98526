use bytes::Bytes;
use serde_json::{Map, Value};

use crate::api::RelayError;

/// One flat key/value record, as posted by the attribution provider.
///
/// There is no schema beyond "flat": any key may be absent, and values are
/// whatever scalars the provider sent. The record is immutable once
/// extracted; the rest of the pipeline only reads from it.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundRecord {
    fields: Map<String, Value>,
}

impl InboundRecord {
    /// Extract the record from a request. A non-empty body must be a JSON
    /// object; without a body, the query string is parsed as urlencoded
    /// pairs (all values arrive as strings in that case).
    pub fn from_request(query: Option<&str>, body: &Bytes) -> Result<InboundRecord, RelayError> {
        if !body.is_empty() {
            let document: Value = serde_json::from_slice(body).map_err(|e| {
                tracing::debug!("failed to decode postback body: {}", e);
                RelayError::MalformedPayload
            })?;

            return match document {
                Value::Object(fields) => Ok(InboundRecord { fields }),
                _ => Err(RelayError::MalformedPayload),
            };
        }

        if let Some(query) = query.filter(|q| !q.is_empty()) {
            let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).map_err(|e| {
                tracing::debug!("failed to decode postback query string: {}", e);
                RelayError::MalformedPayload
            })?;

            let mut fields = Map::new();
            for (key, value) in pairs {
                fields.insert(key, Value::String(value));
            }

            if !fields.is_empty() {
                return Ok(InboundRecord { fields });
            }
        }

        Err(RelayError::NoPayload)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Read a field as an identifier: non-empty strings and numbers count,
    /// anything else is treated as absent.
    pub fn scalar(&self, key: &str) -> Option<String> {
        match self.fields.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn from_value(value: Value) -> InboundRecord {
        match value {
            Value::Object(fields) => InboundRecord { fields },
            _ => panic!("test records must be JSON objects"),
        }
    }
}

/// The event produced by the pipeline, consumed exactly once by delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalEvent {
    pub name: String,
    pub distinct_id: String,
    pub properties: Map<String, Value>,
}
