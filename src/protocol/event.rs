//! Event message types.
//!
//! Events are unsolicited notifications pushed by the remote end. They carry
//! no correlation id and are routed purely by method name.

// ============================================================================
// Imports
// ============================================================================

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Event
// ============================================================================

/// An event notification from the remote end.
///
/// # Format
///
/// ```json
/// {
///   "method": "Domain.eventName",
///   "params": { ... },
///   "sessionId": "optional"
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event name in `Domain.eventName` format.
    pub method: String,

    /// Event-specific data.
    pub params: Value,

    /// Session the event was emitted for, if any.
    pub session_id: Option<String>,
}

impl Event {
    /// Creates an event without a session.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            session_id: None,
        }
    }

    /// Returns the domain name from the method.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let event = Event::new("Network.requestWillBeSent", json!({}));
    /// assert_eq!(event.domain(), "Network");
    /// ```
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Returns the event name from the method.
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.method.split('.').nth(1).unwrap_or_default()
    }

    /// Decodes the params into a typed payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the params do not match `E`.
    pub fn decode<E: DeserializeOwned>(&self) -> Result<E> {
        E::deserialize(&self.params).map_err(|e| Error::decode(&self.method, e))
    }
}

// ============================================================================
// EventPayload
// ============================================================================

/// A typed event payload bound to its method name.
///
/// Implemented by domain event types so they can be subscribed to without
/// spelling out the method string.
pub trait EventPayload: DeserializeOwned + Send + 'static {
    /// Fully-qualified `Domain.eventName`.
    const METHOD: &'static str;
}

// ============================================================================
// Tests
// ============================================================================
