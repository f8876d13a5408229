//! Command and response envelopes.
//!
//! Defines the wire format for command requests and their responses.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;

// ============================================================================
// CommandEnvelope
// ============================================================================

/// An outgoing command.
///
/// # Format
///
/// ```json
/// {
///   "id": 7,
///   "method": "Domain.command",
///   "params": { ... },
///   "sessionId": "optional"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct CommandEnvelope<'a> {
    /// Correlation id assigned by the engine.
    pub id: CorrelationId,

    /// Fully-qualified `Domain.command` name.
    pub method: &'a str,

    /// Already-validated parameters.
    pub params: &'a Value,

    /// Target session for flattened multi-target connections.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
}

impl<'a> CommandEnvelope<'a> {
    /// Creates an envelope without a target session.
    #[inline]
    #[must_use]
    pub fn new(id: CorrelationId, method: &'a str, params: &'a Value) -> Self {
        Self {
            id,
            method,
            params,
            session_id: None,
        }
    }

    /// Sets the target session.
    #[inline]
    #[must_use]
    pub fn with_session(mut self, session_id: Option<&'a str>) -> Self {
        self.session_id = session_id;
        self
    }
}

// ============================================================================
// RemoteError
// ============================================================================

/// The `error` object of a failed response.
///
/// ```json
/// { "code": -32000, "message": "No target", "data": "optional" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Remote error code.
    pub code: i64,

    /// Human-readable message.
    pub message: String,

    /// Optional extra detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<RemoteError> for Error {
    fn from(err: RemoteError) -> Self {
        Error::protocol(err.code, err.message, err.data)
    }
}

// ============================================================================
// ResponseEnvelope
// ============================================================================

/// A response from the remote end, already split into its outcome.
///
/// The outcome is `Ok(result)` for `{"id", "result"}` and an [`Error::Protocol`]
/// for `{"id", "error"}`. A response whose body could not be parsed carries an
/// [`Error::Decode`] so that its waiter still observes a failure.
#[derive(Debug)]
pub struct ResponseEnvelope {
    /// Matches the command `id`.
    pub id: CorrelationId,

    /// Result value or typed failure.
    pub outcome: Result<Value>,

    /// Session the response belongs to, if any.
    pub session_id: Option<String>,
}

impl ResponseEnvelope {
    /// Returns `true` if this is a success response.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Consumes the envelope and returns its outcome.
    #[inline]
    pub fn into_result(self) -> Result<Value> {
        self.outcome
    }
}

// ============================================================================
// Tests
// ============================================================================
