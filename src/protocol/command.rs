//! Command definitions.
//!
//! Domain command types are generated elsewhere; this module holds the
//! contract they implement and an untyped [`RawCommand`] for ad-hoc calls.
//!
//! # Implementing a command
//!
//! ```ignore
//! #[derive(Serialize)]
//! struct Navigate { url: String }
//!
//! impl Command for Navigate {
//!     type Response = NavigateResult;
//!
//!     fn method(&self) -> &str { "Page.navigate" }
//!
//!     fn validate(&self) -> Result<()> {
//!         if self.url.is_empty() {
//!             return Err(Error::missing_field("url"));
//!         }
//!         Ok(())
//!     }
//!
//!     fn params(&self) -> Result<Value> { serialize_params(self) }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ============================================================================
// Command
// ============================================================================

/// A remote command with self-validating parameters and a typed result.
pub trait Command {
    /// Type the `result` object decodes into.
    type Response: DeserializeOwned + Send + 'static;

    /// Fully-qualified `Domain.command` name.
    fn method(&self) -> &str;

    /// Checks required fields before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the offending field.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Serializes the parameters to a JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters cannot be represented as an object.
    fn params(&self) -> Result<Value>;
}

/// Serializes command parameters into a JSON object.
///
/// `null` (unit structs, `()`) becomes `{}`.
///
/// # Errors
///
/// - [`Error::Json`] if serialization fails
/// - [`Error::Validation`] if the value is not an object
pub fn serialize_params<T: Serialize + ?Sized>(params: &T) -> Result<Value> {
    normalize_params(serde_json::to_value(params)?)
}

fn normalize_params(value: Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Object(_) => Ok(value),
        other => Err(Error::validation(
            "params",
            format!("expected a JSON object, got {other}"),
        )),
    }
}

// ============================================================================
// RawCommand
// ============================================================================

/// An untyped command built from a method name and a JSON value.
///
/// The result type defaults to [`Value`]; use [`RawCommand::returning`] to
/// decode into something more specific.
pub struct RawCommand<R = Value> {
    method: String,
    params: Value,
    _response: PhantomData<fn() -> R>,
}

impl RawCommand<Value> {
    /// Creates a raw command.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            _response: PhantomData,
        }
    }
}

impl<R> RawCommand<R> {
    /// Changes the result type.
    #[inline]
    #[must_use]
    pub fn returning<T>(self) -> RawCommand<T> {
        RawCommand {
            method: self.method,
            params: self.params,
            _response: PhantomData,
        }
    }
}

impl<R> fmt::Debug for RawCommand<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawCommand")
            .field("method", &self.method)
            .field("params", &self.params)
            .finish()
    }
}

impl<R> Clone for RawCommand<R> {
    fn clone(&self) -> Self {
        Self {
            method: self.method.clone(),
            params: self.params.clone(),
            _response: PhantomData,
        }
    }
}

impl<R: DeserializeOwned + Send + 'static> Command for RawCommand<R> {
    type Response = R;

    fn method(&self) -> &str {
        &self.method
    }

    fn validate(&self) -> Result<()> {
        match self.method.split_once('.') {
            Some((domain, name)) if !domain.is_empty() && !name.is_empty() => Ok(()),
            _ => Err(Error::validation(
                "method",
                format!("expected `Domain.command`, got `{}`", self.method),
            )),
        }
    }

    fn params(&self) -> Result<Value> {
        normalize_params(self.params.clone())
    }
}

// ============================================================================
// Empty
// ============================================================================

/// Result type for commands whose result is `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

// ============================================================================
// Tests
// ============================================================================
