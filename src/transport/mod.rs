//! Transport session boundary.
//!
//! The engine talks to the remote end through a single ordered,
//! bidirectional text channel split into two halves:
//!
//! - [`FrameSink`] - shared by all callers, sends one frame at a time
//! - [`FrameSource`] - owned by the dispatcher, yields inbound frames
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                           ┌──────────────────┐
//! │  ClientEngine    │        text frames        │  Remote end      │
//! │                  │──── FrameSink ───────────►│  (browser, ...)  │
//! │  Dispatcher      │◄─── FrameSource ──────────│                  │
//! └──────────────────┘                           └──────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channel` | In-memory loopback transport |
//! | `websocket` | WebSocket client transport |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// In-memory loopback transport.
pub mod channel;

/// WebSocket client transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{ChannelSink, ChannelSource, RemoteEnd};
pub use websocket::{WebSocketSink, WebSocketSource};

// ============================================================================
// Inbound
// ============================================================================

/// One item read from a [`FrameSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text frame.
    Frame(String),
    /// The session ended. No further frames follow.
    Closed(String),
}

// ============================================================================
// Traits
// ============================================================================

/// Outgoing half of a transport session.
///
/// Implementations must serialize concurrent `send` calls so that frames
/// never interleave on the wire.
#[async_trait]
pub trait FrameSink: Send + Sync + 'static {
    /// Sends one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Send`](crate::Error::Send) if the transport rejected the frame.
    async fn send(&self, frame: String) -> Result<()>;

    /// Closes the outgoing half. Idempotent.
    async fn close(&self);
}

/// Incoming half of a transport session.
///
/// Read by exactly one dispatcher loop.
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Waits for the next inbound frame or the close signal.
    ///
    /// After returning [`Inbound::Closed`] the source is not polled again.
    async fn recv(&mut self) -> Inbound;
}
