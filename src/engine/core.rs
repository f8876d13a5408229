//! Client engine: the command invocation facade.
//!
//! # Invocation Steps
//!
//! 1. `validate()` the command. Failures never reach the wire.
//! 2. Register a pending entry in the [`CorrelationTable`].
//! 3. Encode the envelope.
//! 4. Send it. If the transport rejects the frame the entry is failed with
//!    [`Error::Send`] right away.
//!
//! The caller gets back a [`Completion`] that yields exactly one outcome.
//! Steps 2-4 hold a [`PendingGuard`]: a caller dropped while the send is
//! still in progress leaves no entry behind.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{Command, Event, EventPayload, encode};
use crate::transport::{FrameSink, FrameSource};

use super::builder::EngineBuilder;
use super::correlation::{Completion, CorrelationTable, PendingGuard};
use super::diagnostics::{Diagnostics, EngineStats};
use super::dispatcher::{Dispatcher, SessionState};
use super::options::EngineOptions;
use super::registry::{CallbackResult, EventRegistry, EventStream, SubscriptionHandle};

// ============================================================================
// ClientEngine
// ============================================================================

/// A registered, encoded command waiting to be sent.
struct Outgoing<'a, T> {
    frame: String,
    completion: Completion<T>,
    guard: PendingGuard<'a>,
}

/// Protocol client bound to one transport session.
///
/// Cheap to clone; all clones share the same session. The session stops when
/// [`shutdown`](Self::shutdown) is called, when the transport closes, or when
/// the last clone is dropped.
///
/// # Thread Safety
///
/// `ClientEngine` is `Send + Sync`. Any number of tasks may invoke commands
/// concurrently; sends are serialized by the transport.
#[derive(Clone)]
pub struct ClientEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    sink: Box<dyn FrameSink>,
    table: Arc<CorrelationTable>,
    registry: Arc<EventRegistry>,
    diagnostics: Arc<Diagnostics>,
    state_rx: watch::Receiver<SessionState>,
    /// Dropping this (with the last engine clone) also stops the dispatcher.
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    options: EngineOptions,
}

// ============================================================================
// ClientEngine - Constructor
// ============================================================================

impl ClientEngine {
    /// Returns a builder for configuring a new engine.
    #[inline]
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Starts an engine on `sink`/`source`, spawning the dispatcher task.
    pub(crate) fn start<K, S>(options: EngineOptions, sink: K, source: S) -> Self
    where
        K: FrameSink,
        S: FrameSource,
    {
        let diagnostics = Arc::new(Diagnostics::new(options.diagnostics.clone()));
        let table = Arc::new(CorrelationTable::new(
            options.max_pending,
            Arc::clone(&diagnostics),
        ));
        let registry = EventRegistry::new(Arc::clone(&diagnostics));

        let (dispatcher, state_rx) = Dispatcher::new(
            Arc::clone(&table),
            Arc::clone(&registry),
            Arc::clone(&diagnostics),
        );
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(dispatcher.run(source, shutdown_rx));

        debug!(?options, "Client engine started");

        Self {
            inner: Arc::new(EngineInner {
                sink: Box::new(sink),
                table,
                registry,
                diagnostics,
                state_rx,
                shutdown_tx: Mutex::new(Some(shutdown_tx)),
                options,
            }),
        }
    }
}

// ============================================================================
// ClientEngine - Commands
// ============================================================================

impl ClientEngine {
    /// Sends a command and returns its completion handle.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if the command fails its own checks
    /// - [`Error::TransportClosed`] if the session has already ended
    /// - [`Error::TooManyPending`] if too many commands are in flight
    ///
    /// A transport send failure is not returned here; the returned
    /// completion is already resolved with [`Error::Send`].
    pub async fn invoke<C>(&self, command: &C) -> Result<Completion<C::Response>>
    where
        C: Command + ?Sized,
    {
        self.send_command(command, None).await
    }

    /// Sends a command to a flattened target session.
    ///
    /// # Errors
    ///
    /// Same as [`invoke`](Self::invoke).
    pub async fn invoke_in_session<C>(
        &self,
        session_id: &str,
        command: &C,
    ) -> Result<Completion<C::Response>>
    where
        C: Command + ?Sized,
    {
        self.send_command(command, Some(session_id)).await
    }

    /// Sends a command and waits for its result using the configured timeout.
    ///
    /// # Errors
    ///
    /// Any error from [`invoke`](Self::invoke) or the completion, or
    /// [`Error::Timeout`].
    pub async fn execute<C>(&self, command: &C) -> Result<C::Response>
    where
        C: Command + ?Sized,
    {
        self.execute_with_timeout(command, self.inner.options.command_timeout)
            .await
    }

    /// Sends a command and waits for its result with a custom timeout.
    ///
    /// The timeout covers both the send and the wait for the response. On
    /// timeout the pending entry is removed; a late response is reported as
    /// an unknown correlation.
    ///
    /// # Errors
    ///
    /// Any error from [`invoke`](Self::invoke) or the completion, or
    /// [`Error::Timeout`].
    pub async fn execute_with_timeout<C>(
        &self,
        command: &C,
        command_timeout: Duration,
    ) -> Result<C::Response>
    where
        C: Command + ?Sized,
    {
        let outgoing = self.prepare(command, None)?;
        let id = outgoing.completion.id();

        let exchange = async { self.transmit(outgoing).await.await };

        match timeout(command_timeout, exchange).await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.inner.table.forget(id);
                let timeout_ms = u64::try_from(command_timeout.as_millis()).unwrap_or(u64::MAX);
                Err(Error::timeout(id, timeout_ms))
            }
        }
    }

    async fn send_command<C>(
        &self,
        command: &C,
        session_id: Option<&str>,
    ) -> Result<Completion<C::Response>>
    where
        C: Command + ?Sized,
    {
        let outgoing = self.prepare(command, session_id)?;
        Ok(self.transmit(outgoing).await)
    }

    /// Validates, registers and encodes a command.
    fn prepare<C>(&self, command: &C, session_id: Option<&str>) -> Result<Outgoing<'_, C::Response>>
    where
        C: Command + ?Sized,
    {
        command.validate()?;
        let params = command.params()?;
        let method = command.method();

        let (id, completion) = self.inner.table.register::<C::Response>(method)?;
        let guard = self.inner.table.guard(id);

        // On error the guard drops the entry.
        let frame = encode(id, method, &params, session_id)?;

        Ok(Outgoing {
            frame,
            completion,
            guard,
        })
    }

    /// Sends a prepared frame. Dropping this future mid-send removes the entry.
    async fn transmit<T>(&self, outgoing: Outgoing<'_, T>) -> Completion<T> {
        let Outgoing {
            frame,
            completion,
            guard,
        } = outgoing;

        let sent = self.inner.sink.send(frame).await;
        guard.disarm();

        let id = completion.id();
        match sent {
            Ok(()) => {
                self.inner.diagnostics.record_sent();
                trace!(%id, method = %completion.method(), "Command sent");
            }
            Err(e) => {
                warn!(%id, method = %completion.method(), error = %e, "Failed to send command");
                self.inner.table.fail(id, e);
            }
        }

        completion
    }
}

// ============================================================================
// ClientEngine - Events
// ============================================================================

impl ClientEngine {
    /// Subscribes `callback` to events named `method`.
    ///
    /// Callbacks run inline on the dispatcher task, in registration order.
    pub fn subscribe<F>(&self, method: impl Into<String>, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Event) -> CallbackResult + Send + Sync + 'static,
    {
        self.inner.registry.subscribe(method, callback)
    }

    /// Subscribes to a typed event.
    pub fn subscribe_to<E, F>(&self, callback: F) -> SubscriptionHandle
    where
        E: EventPayload,
        F: Fn(E) + Send + Sync + 'static,
    {
        self.inner.registry.subscribe_to(callback)
    }

    /// Returns a stream of events named `method`.
    pub fn listen(&self, method: impl Into<String>) -> EventStream {
        self.inner.registry.listen(method)
    }

    /// Removes a subscription. Returns `false` if it was already removed.
    ///
    /// The handle is bound to the registry that issued it, so a handle from
    /// another engine never touches this engine's subscribers.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        handle.unsubscribe()
    }

    /// Registers a callback run once when the session ends.
    pub fn on_closed<F>(&self, callback: F)
    where
        F: FnOnce(&str) + Send + 'static,
    {
        self.inner.registry.on_closed(callback);
    }
}

// ============================================================================
// ClientEngine - Lifecycle
// ============================================================================

impl ClientEngine {
    /// Returns the current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state_rx.borrow().clone()
    }

    /// Returns `true` while the dispatcher is running.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.state_rx.borrow().is_running()
    }

    /// Waits until the session has stopped and returns the cause.
    pub async fn closed(&self) -> String {
        let mut state_rx = self.inner.state_rx.clone();
        let stopped = state_rx
            .wait_for(|state| !state.is_running())
            .await
            .map(|state| (*state).clone());

        match stopped {
            Ok(SessionState::Stopped { cause }) => cause,
            // Dispatcher task vanished without reporting (aborted runtime).
            _ => "dispatcher terminated".to_string(),
        }
    }

    /// Stops the session.
    ///
    /// Pending commands fail with [`Error::TransportClosed`]. Returns once
    /// the dispatcher has stopped.
    pub async fn shutdown(&self) {
        let shutdown_tx = self.inner.shutdown_tx.lock().take();
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(());
        }
        self.inner.sink.close().await;
        self.closed().await;
    }

    /// Returns the number of commands awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.table.len()
    }

    /// Returns a snapshot of the engine counters.
    #[inline]
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        self.inner.diagnostics.stats()
    }

    /// Returns the engine options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }
}

impl std::fmt::Debug for ClientEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientEngine")
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
