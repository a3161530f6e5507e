//! Response envelope normalization.
//!
//! Every payload arrives as `{ data, statusCode, timestamp }`. The auth
//! endpoints wrap the value once; the session endpoints wrap the whole
//! envelope a second time. Each endpoint group gets its own unwrap function
//! so no caller ever guesses the nesting depth.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::api::http_client::SimpleHttpResponse;
use crate::error::{Error, Result};

/// One level of response wrapping
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    /// The wrapped value
    pub data: T,
    /// Status code echoed by the server
    #[serde(default)]
    pub status_code: Option<u16>,
    /// Server-side timestamp of the response
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Unwrap an auth-group response (single envelope)
pub fn auth<T: DeserializeOwned>(response: &SimpleHttpResponse) -> Result<T> {
    let envelope: Envelope<T> = decode(response.body(), "auth")?;
    Ok(envelope.data)
}

/// Unwrap a sessions-group response (envelope inside an envelope)
pub fn sessions<T: DeserializeOwned>(response: &SimpleHttpResponse) -> Result<T> {
    let outer: Envelope<Envelope<T>> = decode(response.body(), "sessions")?;
    Ok(outer.data.data)
}

fn decode<T: DeserializeOwned>(body: &str, group: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| Error::decode(format!("{} envelope: {}", group, e)))
}

/// Extract the human-readable message from an error body.
///
/// Accepts `message` as a string or a list of strings, at the top level or
/// inside `data` (for the doubly wrapped groups).
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    message_from(&value).or_else(|| value.get("data").and_then(message_from))
}

fn message_from(value: &Value) -> Option<String> {
    match value.get("message")? {
        Value::String(message) => Some(message.clone()),
        Value::Array(parts) => {
            let parts: Vec<&str> = parts.iter().filter_map(Value::as_str).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("; "))
            }
        }
        _ => None,
    }
}
