//! Protocol client engine.
//!
//! # Architecture
//!
//! ```text
//!  callers ──invoke──► ClientEngine ──register──► CorrelationTable
//!                           │                          ▲
//!                        encode+send                 resolve / fail_all
//!                           ▼                          │
//!                       FrameSink            Dispatcher (single reader)
//!                                              │       │
//!                                  FrameSource ┘       └─dispatch─► EventRegistry ──► callbacks
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | [`EngineBuilder`] |
//! | `core` | [`ClientEngine`] invocation facade |
//! | `correlation` | [`CorrelationTable`] and [`Completion`] |
//! | `diagnostics` | Diagnostic reporting and counters |
//! | `dispatcher` | Inbound frame loop |
//! | `options` | [`EngineOptions`] |
//! | `registry` | [`EventRegistry`] and subscriptions |

// ============================================================================
// Submodules
// ============================================================================

/// Engine builder.
pub mod builder;

/// Command invocation facade.
pub mod core;

/// Correlation table and completion handles.
pub mod correlation;

/// Diagnostic channel.
pub mod diagnostics;

/// Dispatcher loop.
pub mod dispatcher;

/// Engine configuration.
pub mod options;

/// Event registry.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::EngineBuilder;
pub use self::core::ClientEngine;
pub use correlation::{Completion, CorrelationTable, PendingGuard};
pub use diagnostics::{Diagnostic, Diagnostics, DiagnosticsHook, EngineStats};
pub use dispatcher::{Dispatcher, SessionState};
pub use options::EngineOptions;
pub use registry::{
    CallbackResult, ClosedCallback, EventCallback, EventRegistry, EventStream, SubscriptionHandle,
};
