//! Message codec.
//!
//! Encodes outgoing commands to text frames and classifies inbound frames.
//! Decoding never fails: anything that is neither a response nor an event
//! comes back as [`DecodedMessage::Malformed`] so the reader loop can log it
//! and carry on.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;

use super::event::Event;
use super::request::{CommandEnvelope, RemoteError, ResponseEnvelope};

// ============================================================================
// DecodedMessage
// ============================================================================

/// Classification of one inbound frame.
#[derive(Debug)]
pub enum DecodedMessage {
    /// Response to a command (`id` present).
    Response(ResponseEnvelope),
    /// Unsolicited event (`method` present, no `id`).
    Event(Event),
    /// Frame that could not be classified.
    Malformed {
        /// The frame as received.
        raw: String,
        /// Why it was rejected.
        cause: String,
    },
}

// ============================================================================
// Encode
// ============================================================================

/// Encodes a command envelope to a text frame.
///
/// # Errors
///
/// Returns [`Error::Json`] if serialization fails.
pub fn encode(
    id: CorrelationId,
    method: &str,
    params: &Value,
    session_id: Option<&str>,
) -> Result<String> {
    let envelope = CommandEnvelope::new(id, method, params).with_session(session_id);
    Ok(serde_json::to_string(&envelope)?)
}

// ============================================================================
// Decode
// ============================================================================

/// Decodes one inbound text frame.
///
/// A frame with a usable `id` always decodes to a response, even when its
/// body is broken; the broken body becomes an [`Error::Decode`] outcome so
/// the waiting caller is failed instead of left hanging.
#[must_use]
pub fn decode(text: &str) -> DecodedMessage {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => return malformed(text, format!("invalid JSON: {e}")),
    };

    let Value::Object(mut map) = value else {
        return malformed(text, "frame is not a JSON object");
    };

    let session_id = match map.remove("sessionId") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(_) => return malformed(text, "sessionId is not a string"),
    };

    if let Some(id) = map.remove("id") {
        let Some(id) = id.as_u64() else {
            return malformed(text, "id is not a non-negative integer");
        };
        let id = CorrelationId::new(id);

        return DecodedMessage::Response(ResponseEnvelope {
            id,
            outcome: response_outcome(id, &mut map),
            session_id,
        });
    }

    match map.remove("method") {
        Some(Value::String(method)) => {
            let params = match map.remove("params") {
                None | Some(Value::Null) => Value::Object(Map::new()),
                Some(params) => params,
            };
            DecodedMessage::Event(Event {
                method,
                params,
                session_id,
            })
        }
        Some(_) => malformed(text, "method is not a string"),
        None => malformed(text, "frame has neither id nor method"),
    }
}

/// Splits a response body into `result` or `error`, exactly one of which must be present.
fn response_outcome(id: CorrelationId, map: &mut Map<String, Value>) -> Result<Value> {
    let context = || format!("response {id}");

    match (map.remove("result"), map.remove("error")) {
        (Some(result), None) => Ok(result),
        (None, Some(error)) => match serde_json::from_value::<RemoteError>(error) {
            Ok(remote) => Err(remote.into()),
            Err(e) => Err(Error::decode(context(), format!("invalid error object: {e}"))),
        },
        (Some(_), Some(_)) => Err(Error::decode(context(), "both result and error present")),
        (None, None) => Err(Error::decode(context(), "neither result nor error present")),
    }
}

#[inline]
fn malformed(raw: &str, cause: impl Into<String>) -> DecodedMessage {
    DecodedMessage::Malformed {
        raw: raw.to_string(),
        cause: cause.into(),
    }
}

// ============================================================================
// Tests
// ============================================================================
