//! Diagnostic channel.
//!
//! Non-fatal conditions seen by the engine are never propagated into the
//! dispatcher loop. Each one is logged through `tracing`, counted in
//! [`EngineStats`], and forwarded to an optional [`DiagnosticsHook`].
//!
//! | Diagnostic | Level | Counter |
//! |------------|-------|---------|
//! | [`Diagnostic::UnknownCorrelation`] | warn | `unknown_correlations` |
//! | [`Diagnostic::MalformedFrame`] | warn | `malformed_frames` |
//! | [`Diagnostic::EventDecodeFailed`] | warn | `decode_failures` |
//! | [`Diagnostic::CallbackFailed`] | warn | `callback_failures` |
//! | [`Diagnostic::AbandonedCompletion`] | debug | `abandoned_completions` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, error, warn};

use crate::identifiers::{CorrelationId, SubscriptionId};

// ============================================================================
// Diagnostic
// ============================================================================

/// A non-fatal condition observed by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A response arrived for an id with no pending entry.
    UnknownCorrelation {
        /// The unmatched id.
        id: CorrelationId,
    },

    /// An inbound frame was neither a response nor an event.
    MalformedFrame {
        /// The frame as received.
        raw: String,
        /// Why it was rejected.
        cause: String,
    },

    /// An event payload did not decode into a subscriber's type.
    EventDecodeFailed {
        /// Event method.
        method: String,
        /// Decode error message.
        message: String,
    },

    /// A subscriber callback returned an error or panicked.
    CallbackFailed {
        /// Event method.
        method: String,
        /// The failing subscription.
        subscription: SubscriptionId,
        /// Error or panic message.
        message: String,
    },

    /// A response resolved a completion nobody is waiting on anymore.
    AbandonedCompletion {
        /// The abandoned command.
        id: CorrelationId,
        /// Its method.
        method: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCorrelation { id } => write!(f, "response for unknown id {id}"),
            Self::MalformedFrame { cause, .. } => write!(f, "malformed frame: {cause}"),
            Self::EventDecodeFailed { method, message } => {
                write!(f, "failed to decode {method} payload: {message}")
            }
            Self::CallbackFailed {
                method,
                subscription,
                message,
            } => write!(f, "{method} subscriber {subscription} failed: {message}"),
            Self::AbandonedCompletion { id, method } => {
                write!(f, "{method} response {id} arrived after its caller gave up")
            }
        }
    }
}

/// Callback receiving every [`Diagnostic`].
///
/// Runs on the dispatcher task; keep it fast.
pub type DiagnosticsHook = Arc<dyn Fn(&Diagnostic) + Send + Sync>;

// ============================================================================
// EngineStats
// ============================================================================

/// Snapshot of engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Command frames accepted by the transport.
    pub commands_sent: u64,
    /// Pending calls completed by a response.
    pub responses_resolved: u64,
    /// Events that reached the registry.
    pub events_dispatched: u64,
    /// Responses with no pending entry.
    pub unknown_correlations: u64,
    /// Frames that could not be classified.
    pub malformed_frames: u64,
    /// Failing or panicking subscriber callbacks.
    pub callback_failures: u64,
    /// Event payloads that did not decode.
    pub decode_failures: u64,
    /// Responses for completions that were dropped by their caller.
    pub abandoned_completions: u64,
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Shared sink for diagnostics and counters.
#[derive(Default)]
pub struct Diagnostics {
    hook: Option<DiagnosticsHook>,
    commands_sent: AtomicU64,
    responses_resolved: AtomicU64,
    events_dispatched: AtomicU64,
    unknown_correlations: AtomicU64,
    malformed_frames: AtomicU64,
    callback_failures: AtomicU64,
    decode_failures: AtomicU64,
    abandoned_completions: AtomicU64,
}

impl Diagnostics {
    /// Creates a diagnostics sink with an optional hook.
    #[must_use]
    pub fn new(hook: Option<DiagnosticsHook>) -> Self {
        Self {
            hook,
            ..Default::default()
        }
    }

    /// Logs, counts and forwards one diagnostic.
    pub fn report(&self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::UnknownCorrelation { id } => {
                self.unknown_correlations.fetch_add(1, Ordering::Relaxed);
                warn!(%id, "Response for unknown request");
            }
            Diagnostic::MalformedFrame { raw, cause } => {
                self.malformed_frames.fetch_add(1, Ordering::Relaxed);
                warn!(text = %raw, %cause, "Failed to parse incoming message");
            }
            Diagnostic::EventDecodeFailed { method, message } => {
                self.decode_failures.fetch_add(1, Ordering::Relaxed);
                warn!(%method, error = %message, "Dropping undecodable event");
            }
            Diagnostic::CallbackFailed {
                method,
                subscription,
                message,
            } => {
                self.callback_failures.fetch_add(1, Ordering::Relaxed);
                warn!(%method, %subscription, error = %message, "Event callback failed");
            }
            Diagnostic::AbandonedCompletion { id, method } => {
                self.abandoned_completions.fetch_add(1, Ordering::Relaxed);
                debug!(%id, %method, "Response for abandoned command");
            }
        }

        if let Some(hook) = &self.hook
            && catch_unwind(AssertUnwindSafe(|| hook(&diagnostic))).is_err()
        {
            error!("Diagnostics hook panicked");
        }
    }

    #[inline]
    pub(crate) fn record_sent(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_resolved(&self) {
        self.responses_resolved.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_event(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            responses_resolved: self.responses_resolved.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            unknown_correlations: self.unknown_correlations.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            callback_failures: self.callback_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            abandoned_completions: self.abandoned_completions.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("hook", &self.hook.is_some())
            .field("stats", &self.stats())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    #[test]
    fn test_report_counts_and_forwards() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let diagnostics = Diagnostics::new(Some(Arc::new(move |d: &Diagnostic| {
            seen_clone.lock().push(d.clone());
        })));

        diagnostics.report(Diagnostic::UnknownCorrelation {
            id: CorrelationId::new(4),
        });
        diagnostics.report(Diagnostic::MalformedFrame {
            raw: "x".into(),
            cause: "invalid JSON".into(),
        });

        let stats = diagnostics.stats();
        assert_eq!(stats.unknown_correlations, 1);
        assert_eq!(stats.malformed_frames, 1);
        assert_eq!(stats.callback_failures, 0);
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_panicking_hook_is_contained() {
        let diagnostics = Diagnostics::new(Some(Arc::new(|_: &Diagnostic| panic!("hook"))));
        diagnostics.report(Diagnostic::UnknownCorrelation {
            id: CorrelationId::new(1),
        });
        assert_eq!(diagnostics.stats().unknown_correlations, 1);
    }

    #[test]
    fn test_display() {
        let d = Diagnostic::UnknownCorrelation {
            id: CorrelationId::new(9),
        };
        assert_eq!(d.to_string(), "response for unknown id 9");
    }
}
