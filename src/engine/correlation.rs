//! Correlation table.
//!
//! Tracks every command awaiting a response. Each entry is created by
//! [`CorrelationTable::register`] and removed exactly once, by whichever
//! comes first:
//!
//! | Trigger | Method | Caller observes |
//! |---------|--------|-----------------|
//! | Response | [`resolve`](CorrelationTable::resolve) | result or [`Error::Protocol`] / [`Error::Decode`] |
//! | Send failure | [`fail`](CorrelationTable::fail) | [`Error::Send`] |
//! | Session end | [`fail_all`](CorrelationTable::fail_all) | [`Error::TransportClosed`] |
//! | Caller timeout | [`forget`](CorrelationTable::forget) | nothing (caller already left) |
//! | Caller cancelled before the send finished | [`PendingGuard`] drop | nothing (caller already left) |
//!
//! Removal hands the entry's one-shot sender out of the table before it is
//! completed, so a handle can never be completed twice: a second `resolve`
//! for the same id finds nothing and is reported as
//! [`Diagnostic::UnknownCorrelation`].

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;

use super::diagnostics::{Diagnostic, Diagnostics};

// ============================================================================
// Types
// ============================================================================

/// Sending half of a completion.
type Completer = oneshot::Sender<Result<Value>>;

/// A command awaiting its response.
struct PendingCall {
    /// Method name, used as decode context.
    method: Arc<str>,
    completer: Completer,
}

struct TableState {
    next_id: u64,
    pending: FxHashMap<CorrelationId, PendingCall>,
    /// Set by the first `fail_all`; blocks further registrations.
    closed: Option<String>,
}

impl TableState {
    /// Returns the next id not currently in flight.
    fn allocate_id(&mut self) -> CorrelationId {
        loop {
            let id = CorrelationId::new(self.next_id);
            self.next_id = self.next_id.checked_add(1).unwrap_or(1);
            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }
}

// ============================================================================
// CorrelationTable
// ============================================================================

/// Map of in-flight commands keyed by correlation id.
///
/// Internal lock is never held while completing a handle.
pub struct CorrelationTable {
    state: Mutex<TableState>,
    max_pending: usize,
    diagnostics: Arc<Diagnostics>,
}

impl CorrelationTable {
    /// Creates an empty table. Ids start at 1.
    #[must_use]
    pub fn new(max_pending: usize, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            state: Mutex::new(TableState {
                next_id: 1,
                pending: FxHashMap::default(),
                closed: None,
            }),
            max_pending,
            diagnostics,
        }
    }

    /// Allocates a fresh id and stores a pending entry for it.
    ///
    /// # Errors
    ///
    /// - [`Error::TransportClosed`] if the session already ended
    /// - [`Error::TooManyPending`] if the table is full
    pub fn register<T: DeserializeOwned>(
        &self,
        method: &str,
    ) -> Result<(CorrelationId, Completion<T>)> {
        let (completer, receiver) = oneshot::channel();
        let method: Arc<str> = Arc::from(method);

        let id = {
            let mut state = self.state.lock();

            if let Some(cause) = &state.closed {
                return Err(Error::transport_closed(cause.clone()));
            }

            let pending = state.pending.len();
            if pending >= self.max_pending {
                return Err(Error::TooManyPending {
                    pending,
                    max: self.max_pending,
                });
            }

            let id = state.allocate_id();
            state.pending.insert(
                id,
                PendingCall {
                    method: Arc::clone(&method),
                    completer,
                },
            );
            id
        };

        trace!(%id, %method, "Registered pending command");

        Ok((id, Completion::new(id, method, receiver)))
    }

    /// Completes the entry for `id` with a response outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCorrelation`] (and reports
    /// [`Diagnostic::UnknownCorrelation`]) if no entry exists, e.g. a late
    /// duplicate or a response after a timeout.
    pub fn resolve(&self, id: CorrelationId, outcome: Result<Value>) -> Result<()> {
        let Some(call) = self.take(id) else {
            self.diagnostics
                .report(Diagnostic::UnknownCorrelation { id });
            return Err(Error::UnknownCorrelation { id });
        };

        self.diagnostics.record_resolved();
        self.complete(id, call, outcome);
        Ok(())
    }

    /// Fails the entry for `id`, e.g. after its frame could not be sent.
    ///
    /// Returns `false` if the entry was already gone.
    pub fn fail(&self, id: CorrelationId, error: Error) -> bool {
        match self.take(id) {
            Some(call) => {
                self.complete(id, call, Err(error));
                true
            }
            None => false,
        }
    }

    /// Removes the entry for `id` without completing it.
    ///
    /// Used when the caller has given up (timeout, cancellation). A later
    /// response for this id is reported as unknown.
    pub fn forget(&self, id: CorrelationId) -> bool {
        let removed = self.take(id).is_some();
        if removed {
            debug!(%id, "Removed abandoned correlation");
        }
        removed
    }

    /// Returns a guard that forgets `id` when dropped before being disarmed.
    ///
    /// Held across the send so a caller cancelled mid-send leaves no entry
    /// behind.
    #[inline]
    pub fn guard(&self, id: CorrelationId) -> PendingGuard<'_> {
        PendingGuard {
            table: self,
            id,
            armed: true,
        }
    }

    /// Fails every pending entry with [`Error::TransportClosed`] and closes
    /// the table to new registrations.
    ///
    /// Returns the number of entries failed. A second call finds nothing
    /// pending and returns 0; the first cause is kept.
    pub fn fail_all(&self, cause: &str) -> usize {
        let drained: Vec<_> = {
            let mut state = self.state.lock();
            if state.closed.is_none() {
                state.closed = Some(cause.to_string());
            }
            state.pending.drain().collect()
        };

        let count = drained.len();
        for (id, call) in drained {
            self.complete(id, call, Err(Error::transport_closed(cause)));
        }

        if count > 0 {
            debug!(count, %cause, "Failed pending commands on shutdown");
        }
        count
    }

    /// Returns the number of pending entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Returns `true` if nothing is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    /// Returns `true` if an entry exists for `id`.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: CorrelationId) -> bool {
        self.state.lock().pending.contains_key(&id)
    }

    /// Returns `true` once [`fail_all`](Self::fail_all) has run.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed.is_some()
    }

    fn take(&self, id: CorrelationId) -> Option<PendingCall> {
        self.state.lock().pending.remove(&id)
    }

    /// Hands the outcome to the waiter. Must be called without the lock held.
    fn complete(&self, id: CorrelationId, call: PendingCall, outcome: Result<Value>) {
        if call.completer.send(outcome).is_err() {
            self.diagnostics.report(Diagnostic::AbandonedCompletion {
                id,
                method: call.method.to_string(),
            });
        }
    }
}

// ============================================================================
// PendingGuard
// ============================================================================

/// Removes a registered entry on drop unless [`disarm`](Self::disarm)ed.
#[must_use = "dropping the guard removes the pending entry"]
pub struct PendingGuard<'a> {
    table: &'a CorrelationTable,
    id: CorrelationId,
    armed: bool,
}

impl PendingGuard<'_> {
    /// Returns the guarded correlation id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    /// Keeps the entry in the table.
    #[inline]
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.table.forget(self.id) {
            trace!(id = %self.id, "Pending entry released by guard");
        }
    }
}

// ============================================================================
// Completion
// ============================================================================

/// Write-once handle to a command's outcome.
///
/// Resolves to `Ok(T)` when the remote end answered with a result that
/// decodes into `T`, or to the failure that ended the command. Dropping the
/// handle abandons the command; its eventual response is discarded.
///
/// Like other futures it must not be polled again after it completed.
#[must_use = "a completion does nothing unless awaited"]
pub struct Completion<T> {
    id: CorrelationId,
    method: Arc<str>,
    receiver: oneshot::Receiver<Result<Value>>,
    _result: PhantomData<fn() -> T>,
}

impl<T> Completion<T> {
    fn new(id: CorrelationId, method: Arc<str>, receiver: oneshot::Receiver<Result<Value>>) -> Self {
        Self {
            id,
            method,
            receiver,
            _result: PhantomData,
        }
    }

    /// Returns the correlation id of the command.
    #[inline]
    #[must_use]
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    /// Returns the command's method name.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }
}

impl<T: DeserializeOwned + Send + 'static> Completion<T> {
    /// Awaits the outcome on `runtime` and passes it to `callback`.
    ///
    /// Lets callers choose where the completion is satisfied instead of
    /// awaiting it on their own task.
    pub fn spawn_on<F>(self, runtime: &Handle, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<T>) + Send + 'static,
    {
        runtime.spawn(async move { callback(self.await) })
    }
}

impl<T: DeserializeOwned> Future for Completion<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let outcome = match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(outcome) => outcome,
        };

        Poll::Ready(match outcome {
            Ok(Ok(value)) => {
                serde_json::from_value(value).map_err(|e| Error::decode(&*this.method, e))
            }
            Ok(Err(error)) => Err(error),
            // Completer dropped without sending: the table itself went away.
            Err(_) => Err(Error::transport_closed("engine dropped")),
        })
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("id", &self.id)
            .field("method", &self.method)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
