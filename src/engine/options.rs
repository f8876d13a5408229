//! Engine configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use devtools_client::EngineOptions;
//!
//! let options = EngineOptions::new()
//!     .with_command_timeout(Duration::from_secs(10))
//!     .with_max_pending(256);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::diagnostics::{Diagnostic, DiagnosticsHook};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout used by [`ClientEngine::execute`](super::ClientEngine::execute).
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for establishing a WebSocket connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum number of commands in flight.
pub const DEFAULT_MAX_PENDING: usize = 1024;

// ============================================================================
// EngineOptions
// ============================================================================

/// Client engine configuration.
#[derive(Clone)]
pub struct EngineOptions {
    /// Timeout applied by `execute`. Completions themselves never time out.
    pub command_timeout: Duration,

    /// Timeout for the WebSocket handshake in `connect`.
    pub connect_timeout: Duration,

    /// Registrations beyond this many in-flight commands fail.
    pub max_pending: usize,

    /// Optional receiver of every diagnostic.
    pub diagnostics: Option<DiagnosticsHook>,
}

// ============================================================================
// Constructors
// ============================================================================

impl EngineOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_pending: DEFAULT_MAX_PENDING,
            diagnostics: None,
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl EngineOptions {
    /// Sets the timeout used by `execute`.
    #[inline]
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets the WebSocket connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the maximum number of commands in flight.
    #[inline]
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Sets the diagnostics hook.
    #[inline]
    #[must_use]
    pub fn with_diagnostics<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Diagnostic) + Send + Sync + 'static,
    {
        self.diagnostics = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("command_timeout", &self.command_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_pending", &self.max_pending)
            .field("diagnostics", &self.diagnostics.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = EngineOptions::default();
        assert_eq!(options.command_timeout.as_secs(), 30);
        assert_eq!(options.connect_timeout.as_secs(), 30);
        assert_eq!(options.max_pending, 1024);
        assert!(options.diagnostics.is_none());
    }

    #[test]
    fn test_builder_chain() {
        let options = EngineOptions::new()
            .with_command_timeout(Duration::from_millis(250))
            .with_connect_timeout(Duration::from_secs(2))
            .with_max_pending(8)
            .with_diagnostics(|_| {});

        assert_eq!(options.command_timeout, Duration::from_millis(250));
        assert_eq!(options.connect_timeout, Duration::from_secs(2));
        assert_eq!(options.max_pending, 8);
        assert!(options.diagnostics.is_some());
    }

    #[test]
    fn test_debug_hides_hook() {
        let options = EngineOptions::new().with_diagnostics(|_| {});
        assert!(format!("{options:?}").contains("diagnostics: true"));
    }
}
