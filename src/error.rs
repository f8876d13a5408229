//! Error types for the DevTools client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use devtools_client::{ClientEngine, Result};
//!
//! async fn example(engine: &ClientEngine) -> Result<()> {
//!     let version: serde_json::Value = engine
//!         .execute(&RawCommand::new("Browser.getVersion", json!({})))
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Caller | [`Error::Validation`], [`Error::TooManyPending`], [`Error::Config`] |
//! | Transport | [`Error::Send`], [`Error::TransportClosed`], [`Error::Connection`] |
//! | Remote | [`Error::Protocol`] |
//! | Payload | [`Error::Decode`] |
//! | Correlation | [`Error::UnknownCorrelation`], [`Error::Timeout`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::CorrelationId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Every command outcome that is not a success is one of these variants.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Caller Errors
    // ========================================================================
    /// Command parameters failed their own validation.
    ///
    /// Never reaches the wire.
    #[error("Invalid parameter `{field}`: {message}")]
    Validation {
        /// Name of the missing or invalid field.
        field: String,
        /// Description of the problem.
        message: String,
    },

    /// Too many commands are awaiting a response.
    #[error("Too many pending commands: {pending}/{max}")]
    TooManyPending {
        /// Commands currently in flight.
        pending: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Configuration error.
    ///
    /// Returned when engine configuration or a connection URL is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// The transport rejected an outgoing frame.
    #[error("Send failed: {message}")]
    Send {
        /// Description of the transport failure.
        message: String,
    },

    /// The transport session ended while the command was pending,
    /// or the command was issued after the session ended.
    #[error("Transport closed: {cause}")]
    TransportClosed {
        /// Reason reported by the transport.
        cause: String,
    },

    /// Transport connection could not be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// The remote end answered with `{"error": {...}}`.
    #[error("Protocol error {code}: {message}")]
    Protocol {
        /// Remote error code.
        code: i64,
        /// Remote error message.
        message: String,
        /// Optional remote error data.
        data: Option<Value>,
    },

    // ========================================================================
    // Payload Errors
    // ========================================================================
    /// A result or event payload did not match its expected shape.
    #[error("Failed to decode {context}: {message}")]
    Decode {
        /// What was being decoded (usually the method name).
        context: String,
        /// Description of the decode failure.
        message: String,
    },

    // ========================================================================
    // Correlation Errors
    // ========================================================================
    /// A response arrived for an id with no pending entry.
    #[error("No pending command for id {id}")]
    UnknownCorrelation {
        /// The unmatched correlation id.
        id: CorrelationId,
    },

    /// Caller-side timeout waiting for a response.
    #[error("Command {id} timed out after {timeout_ms}ms")]
    Timeout {
        /// The command that timed out.
        id: CorrelationId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a validation error for `field`.
    #[inline]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error for a missing required field.
    #[inline]
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::validation(field, "required field is missing")
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a send error.
    #[inline]
    pub fn send(message: impl Into<String>) -> Self {
        Self::Send {
            message: message.into(),
        }
    }

    /// Creates a transport closed error.
    #[inline]
    pub fn transport_closed(cause: impl Into<String>) -> Self {
        Self::TransportClosed {
            cause: cause.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a protocol error from a remote error object.
    #[inline]
    pub fn protocol(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
            data,
        }
    }

    /// Creates a decode error.
    #[inline]
    pub fn decode(context: impl Into<String>, message: impl ToString) -> Self {
        Self::Decode {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(id: CorrelationId, timeout_ms: u64) -> Self {
        Self::Timeout { id, timeout_ms }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the remote end reported this error.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// Returns `true` if this is a transport or connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Send { .. }
                | Self::TransportClosed { .. }
                | Self::Connection { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns the remote error code, if this is a protocol error.
    #[inline]
    #[must_use]
    pub fn protocol_code(&self) -> Option<i64> {
        match self {
            Self::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
