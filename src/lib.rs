//! DevTools Client - runtime for JSON command/event remote protocols.
//!
//! This library implements the client side of a Chrome DevTools Protocol
//! style connection: callers invoke `Domain.command` methods and await typed
//! results, while the same connection pushes `Domain.event` notifications to
//! subscribers.
//!
//! # Architecture
//!
//! - **Correlation**: every command gets a fresh integer id; responses are
//!   matched back to their caller by id, in whatever order they arrive
//! - **Single reader**: one dispatcher task reads the transport and routes
//!   each frame to a waiter or to event subscribers
//! - **Exactly one outcome**: every command resolves once with success,
//!   protocol error, send error, decode error or transport closed
//! - **No globals**: all state lives in a [`ClientEngine`]; independent
//!   sessions in one process do not interact
//!
//! # Quick Start
//!
//! ```no_run
//! use devtools_client::{ClientEngine, RawCommand, Result};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let engine = ClientEngine::builder()
//!         .connect("ws://127.0.0.1:9222/devtools/browser/abc")
//!         .await?;
//!
//!     engine.subscribe("Target.targetCreated", |event| {
//!         println!("target created: {}", event.params);
//!         Ok(())
//!     });
//!
//!     let targets = engine
//!         .execute(&RawCommand::new("Target.getTargets", json!({})))
//!         .await?;
//!     println!("{targets}");
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`engine`] | [`ClientEngine`], correlation table, event registry, dispatcher |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire envelopes, `Command` contract, codec |
//! | [`transport`] | Transport session boundary and implementations |

// ============================================================================
// Modules
// ============================================================================

/// Client engine: invocation facade, correlation, events, dispatch.
///
/// Use [`ClientEngine::builder()`] to create an engine.
pub mod engine;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Protocol message types and codec.
pub mod protocol;

/// Transport session boundary.
///
/// WebSocket and in-memory implementations of [`FrameSink`](transport::FrameSink)
/// and [`FrameSource`](transport::FrameSource).
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Engine types
pub use engine::{
    ClientEngine, Completion, Diagnostic, EngineBuilder, EngineOptions, EngineStats,
    EventStream, SessionState, SubscriptionHandle,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CorrelationId, SubscriptionId};

// Protocol types
pub use protocol::{Command, Empty, Event, EventPayload, RawCommand, RemoteError};
