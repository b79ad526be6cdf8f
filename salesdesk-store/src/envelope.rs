//! Response envelopes of the two backends.
//!
//! The local API wraps every payload as `{"data": ...}`. The order service
//! nests one level deeper, `{"data": {"message": ...}}`, except for its
//! expense endpoints which use `{"data": {"expense": ...}}`. Each client picks
//! the decoder matching the endpoint it called; nothing untyped leaves here.

use salesdesk_core::GatewayError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum EnvelopeError {
    #[error("Response is not valid JSON: {0}")]
    Json(String),

    #[error("Response has no data")]
    MissingData,

    #[error("Response data carries neither message nor expense")]
    MissingPayload,

    #[error("Unexpected payload shape: {0}")]
    Shape(String),
}

impl EnvelopeError {
    pub fn into_gateway(self, service: &str) -> GatewayError {
        GatewayError::decode(service, self.to_string())
    }
}

fn take_data(body: &str) -> Result<Value, EnvelopeError> {
    let mut value: Value =
        serde_json::from_str(body).map_err(|e| EnvelopeError::Json(e.to_string()))?;
    match value.get_mut("data").map(Value::take) {
        None | Some(Value::Null) => Err(EnvelopeError::MissingData),
        Some(data) => Ok(data),
    }
}

fn shape<T: DeserializeOwned>(payload: Value) -> Result<T, EnvelopeError> {
    serde_json::from_value(payload).map_err(|e| EnvelopeError::Shape(e.to_string()))
}

/// `{"data": T}`
pub fn decode_internal<T: DeserializeOwned>(body: &str) -> Result<T, EnvelopeError> {
    shape(take_data(body)?)
}

/// `{"data": {"message": T}}` or `{"data": {"expense": T}}`
pub fn decode_external<T: DeserializeOwned>(body: &str) -> Result<T, EnvelopeError> {
    let payload = match take_data(body)? {
        Value::Object(mut map) => map
            .remove("message")
            .or_else(|| map.remove("expense"))
            .ok_or(EnvelopeError::MissingPayload)?,
        _ => return Err(EnvelopeError::MissingPayload),
    };
    shape(payload)
}

/// Accepts a string or a number; `null`, `false` and anything else read as
/// absent. The order service reports unset fields as `false`.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
