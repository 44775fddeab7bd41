use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Errors from encoding or decoding real-time frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("outbound payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Envelope for every message pushed by the gateway.
///
/// Only `type` is required; it is the dispatch key. Fields the client
/// does not know about are kept in `extra` so listeners see the frame
/// exactly as it was sent. `timestamp` and `agent_id` are kept as raw
/// JSON: producers disagree on strings vs numbers and neither may cost
/// the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl InboundMessage {
    /// Creates a message with the given type and data.
    pub fn new(msg_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            data,
            timestamp: None,
            agent_id: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Parses a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// `timestamp` when the producer sent it as a string.
    pub fn timestamp_str(&self) -> Option<&str> {
        self.timestamp.as_ref().and_then(serde_json::Value::as_str)
    }

    /// `agent_id` when the producer sent it as a string.
    pub fn agent_id_str(&self) -> Option<&str> {
        self.agent_id.as_ref().and_then(serde_json::Value::as_str)
    }

    /// Deserializes `data` into the given type.
    pub fn data_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

/// Serializes an outbound payload with an injected `timestamp`.
///
/// The payload must serialize to a JSON object. A caller-supplied
/// `timestamp` key is overwritten.
pub fn stamp_outbound<T: Serialize + ?Sized>(
    payload: &T,
    now: DateTime<Utc>,
) -> Result<String, ProtocolError> {
    let mut value = serde_json::to_value(payload)?;
    let obj = match value.as_object_mut() {
        Some(obj) => obj,
        None => return Err(ProtocolError::NotAnObject(json_kind(&value))),
    };
    obj.insert(
        "timestamp".into(),
        serde_json::Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    Ok(serde_json::to_string(&value)?)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
