//! Dispatcher loop.
//!
//! The single logical reader of a session. It pulls frames from the
//! [`FrameSource`], decodes them and routes each one:
//!
//! | Decoded as | Routed to |
//! |------------|-----------|
//! | Response | [`CorrelationTable::resolve`] |
//! | Event | [`EventRegistry::dispatch`] |
//! | Malformed | diagnostic, loop continues |
//!
//! # States
//!
//! ```text
//! Running ──(source closed | shutdown signal)──► Stopped
//! ```
//!
//! Entering `Stopped` fails every pending command with
//! [`Error::TransportClosed`](crate::Error::TransportClosed) and notifies
//! session-closed listeners. `Stopped` is terminal.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tracing::{debug, trace};

use crate::protocol::{DecodedMessage, decode};
use crate::transport::{FrameSource, Inbound};

use super::correlation::CorrelationTable;
use super::diagnostics::{Diagnostic, Diagnostics};
use super::registry::EventRegistry;

// ============================================================================
// Constants
// ============================================================================

/// Close cause used when the client stops the session itself.
pub const SHUTDOWN_CAUSE: &str = "client shutdown";

// ============================================================================
// SessionState
// ============================================================================

/// Lifecycle of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Reading and routing frames.
    Running,
    /// Terminal. No further frames are read.
    Stopped {
        /// Why the session ended.
        cause: String,
    },
}

impl SessionState {
    /// Returns `true` while the dispatcher is running.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Routes inbound frames to waiters and subscribers.
pub struct Dispatcher {
    table: Arc<CorrelationTable>,
    registry: Arc<EventRegistry>,
    diagnostics: Arc<Diagnostics>,
    state_tx: watch::Sender<SessionState>,
}

impl Dispatcher {
    /// Creates a dispatcher in the `Running` state.
    ///
    /// The returned receiver observes the state transition.
    #[must_use]
    pub fn new(
        table: Arc<CorrelationTable>,
        registry: Arc<EventRegistry>,
        diagnostics: Arc<Diagnostics>,
    ) -> (Self, watch::Receiver<SessionState>) {
        let (state_tx, state_rx) = watch::channel(SessionState::Running);
        let dispatcher = Self {
            table,
            registry,
            diagnostics,
            state_tx,
        };
        (dispatcher, state_rx)
    }

    /// Reads `source` until it closes or `shutdown_rx` fires (or its sender is dropped).
    ///
    /// Returns the close cause.
    pub async fn run<S: FrameSource>(
        self,
        mut source: S,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> String {
        debug!("Dispatcher started");

        let cause = loop {
            tokio::select! {
                inbound = source.recv() => match inbound {
                    Inbound::Frame(text) => self.route(&text),
                    Inbound::Closed(cause) => break cause,
                },

                _ = &mut shutdown_rx => break SHUTDOWN_CAUSE.to_string(),
            }
        };

        self.stop(&cause);
        cause
    }

    /// Decodes and routes one frame.
    pub fn route(&self, text: &str) {
        trace!(len = text.len(), "Frame received");

        match decode(text) {
            DecodedMessage::Response(response) => {
                // Unknown ids are already reported as diagnostics.
                let _ = self.table.resolve(response.id, response.outcome);
            }
            DecodedMessage::Event(event) => {
                self.registry.dispatch(&event);
            }
            DecodedMessage::Malformed { raw, cause } => {
                self.diagnostics
                    .report(Diagnostic::MalformedFrame { raw, cause });
            }
        }
    }

    /// Transitions to `Stopped`.
    ///
    /// The state is published last, so observers of `Stopped` see every
    /// pending call failed and every closed listener run.
    fn stop(&self, cause: &str) {
        let failed = self.table.fail_all(cause);
        self.registry.notify_closed(cause);

        self.state_tx.send_replace(SessionState::Stopped {
            cause: cause.to_string(),
        });

        debug!(failed, %cause, "Dispatcher stopped");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use serde_json::{Value, json};

    use crate::error::Error;
    use crate::transport::channel;

    struct Fixture {
        table: Arc<CorrelationTable>,
        registry: Arc<EventRegistry>,
        diagnostics: Arc<Diagnostics>,
        dispatcher: Dispatcher,
        state_rx: watch::Receiver<SessionState>,
    }

    fn fixture() -> Fixture {
        let diagnostics = Arc::new(Diagnostics::default());
        let table = Arc::new(CorrelationTable::new(64, Arc::clone(&diagnostics)));
        let registry = EventRegistry::new(Arc::clone(&diagnostics));
        let (dispatcher, state_rx) = Dispatcher::new(
            Arc::clone(&table),
            Arc::clone(&registry),
            Arc::clone(&diagnostics),
        );
        Fixture {
            table,
            registry,
            diagnostics,
            dispatcher,
            state_rx,
        }
    }

    #[tokio::test]
    async fn test_route_response() {
        let f = fixture();
        let (id, completion) = f.table.register::<Value>("Test.ok").expect("register");

        f.dispatcher
            .route(&format!(r#"{{"id":{id},"result":{{"ok":true}}}}"#));
        assert_eq!(completion.await.expect("success"), json!({"ok": true}));
    }

    #[test]
    fn test_route_event() {
        let f = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        f.registry.subscribe("Page.loadEventFired", move |e| {
            seen_clone.lock().push(e.params.clone());
            Ok(())
        });

        f.dispatcher
            .route(r#"{"method":"Page.loadEventFired","params":{"timestamp":1.5}}"#);
        assert_eq!(*seen.lock(), vec![json!({"timestamp": 1.5})]);
    }

    #[test]
    fn test_route_malformed_and_unknown() {
        let f = fixture();
        f.dispatcher.route("garbage");
        f.dispatcher.route(r#"{"id":99,"result":{}}"#);

        let stats = f.diagnostics.stats();
        assert_eq!(stats.malformed_frames, 1);
        assert_eq!(stats.unknown_correlations, 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_close() {
        let f = fixture();
        let (_sink, source, remote) = channel::pair();
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();
        let (_, pending) = f.table.register::<Value>("A.b").expect("register");

        let task = tokio::spawn(f.dispatcher.run(source, shutdown_rx));
        remote.close("socket reset");

        assert_eq!(task.await.expect("join"), "socket reset");
        assert!(matches!(
            pending.await,
            Err(Error::TransportClosed { ref cause }) if cause == "socket reset"
        ));
        assert_eq!(
            *f.state_rx.borrow(),
            SessionState::Stopped {
                cause: "socket reset".to_string()
            }
        );
        assert!(f.table.is_closed());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let f = fixture();
        let (_sink, source, _remote) = channel::pair();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(f.dispatcher.run(source, shutdown_rx));
        shutdown_tx.send(()).expect("signal");

        assert_eq!(task.await.expect("join"), SHUTDOWN_CAUSE);
        assert!(!f.state_rx.borrow().is_running());
    }
}
