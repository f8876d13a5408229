//! Builder for [`ClientEngine`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use devtools_client::{ClientEngine, Result};
//!
//! # async fn example() -> Result<()> {
//! let engine = ClientEngine::builder()
//!     .command_timeout(Duration::from_secs(10))
//!     .connect("ws://127.0.0.1:9222/devtools/browser/abc")
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::Result;
use crate::transport::{FrameSink, FrameSource, websocket};

use super::ClientEngine;
use super::diagnostics::Diagnostic;
use super::options::EngineOptions;

// ============================================================================
// EngineBuilder
// ============================================================================

/// Builder for configuring and starting a [`ClientEngine`].
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    options: EngineOptions,
}

impl EngineBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the timeout used by [`ClientEngine::execute`].
    #[inline]
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_command_timeout(timeout);
        self
    }

    /// Sets the WebSocket connect timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_connect_timeout(timeout);
        self
    }

    /// Sets the maximum number of commands in flight.
    #[inline]
    #[must_use]
    pub fn max_pending(mut self, max_pending: usize) -> Self {
        self.options = self.options.with_max_pending(max_pending);
        self
    }

    /// Sets a hook receiving every diagnostic.
    #[inline]
    #[must_use]
    pub fn on_diagnostic<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Diagnostic) + Send + Sync + 'static,
    {
        self.options = self.options.with_diagnostics(hook);
        self
    }

    /// Starts an engine on an already-open transport.
    ///
    /// Spawns the dispatcher on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn start<K, S>(self, sink: K, source: S) -> ClientEngine
    where
        K: FrameSink,
        S: FrameSource,
    {
        ClientEngine::start(self.options, sink, source)
    }

    /// Connects to a WebSocket endpoint and starts an engine on it.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) if the URL is not `ws://` or `wss://`
    /// - [`Error::Connection`](crate::Error::Connection) if the handshake times out
    /// - [`Error::WebSocket`](crate::Error::WebSocket) if the connection fails
    pub async fn connect(self, url: &str) -> Result<ClientEngine> {
        let (sink, source) = websocket::connect(url, self.options.connect_timeout).await?;
        Ok(self.start(sink, source))
    }
}

// ============================================================================
// Tests
// ============================================================================
