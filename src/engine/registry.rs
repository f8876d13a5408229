//! Event registry.
//!
//! Maps event method names to ordered subscriber lists.
//!
//! # Delivery Rules
//!
//! - Subscribers for a method run in registration order, each with the same
//!   [`Event`].
//! - [`dispatch`](EventRegistry::dispatch) snapshots the subscriber list under
//!   the lock and invokes callbacks after releasing it, so callbacks may
//!   subscribe or unsubscribe freely.
//! - A subscription removed before a dispatch starts never sees that event.
//!   One removed while a dispatch is in progress may still receive the event
//!   being delivered (best effort).
//! - A callback that returns an error or panics is reported as a diagnostic;
//!   the remaining callbacks still run.
//! - Callbacks run inline on the dispatcher task. Keep them fast; hand heavy
//!   work to another task or use [`EventRegistry::listen`].

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::error::Error as StdError;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures_util::stream::Stream;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::identifiers::SubscriptionId;
use crate::protocol::{Event, EventPayload};

use super::diagnostics::{Diagnostic, Diagnostics};

// ============================================================================
// Types
// ============================================================================

/// Value returned by an event callback.
pub type CallbackResult = Result<(), Box<dyn StdError + Send + Sync>>;

/// Event callback.
pub type EventCallback = Arc<dyn Fn(&Event) -> CallbackResult + Send + Sync>;

/// Session-closed callback, called once with the close cause.
pub type ClosedCallback = Box<dyn FnOnce(&str) + Send>;

struct Subscriber {
    id: SubscriptionId,
    callback: EventCallback,
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    subscribers: FxHashMap<String, Vec<Subscriber>>,
    closed_listeners: Vec<ClosedCallback>,
    closed: Option<String>,
}

// ============================================================================
// EventRegistry
// ============================================================================

/// Subscriber lists keyed by event method.
pub struct EventRegistry {
    state: Mutex<RegistryState>,
    diagnostics: Arc<Diagnostics>,
}

impl EventRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(diagnostics: Arc<Diagnostics>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RegistryState::default()),
            diagnostics,
        })
    }

    /// Appends `callback` to the subscribers of `method`.
    ///
    /// The returned handle does not unsubscribe on drop; call
    /// [`SubscriptionHandle::unsubscribe`]. After the session has closed the
    /// callback is discarded immediately since no event can arrive anymore.
    pub fn subscribe<F>(self: &Arc<Self>, method: impl Into<String>, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Event) -> CallbackResult + Send + Sync + 'static,
    {
        let method = method.into();

        let id = {
            let mut state = self.state.lock();
            state.next_id += 1;
            let id = SubscriptionId::new(state.next_id);

            if state.closed.is_none() {
                state
                    .subscribers
                    .entry(method.clone())
                    .or_default()
                    .push(Subscriber {
                        id,
                        callback: Arc::new(callback),
                    });
            }
            id
        };

        trace!(%method, subscription = %id, "Subscribed");

        SubscriptionHandle {
            id,
            method,
            registry: Arc::downgrade(self),
        }
    }

    /// Subscribes with a typed payload.
    ///
    /// Payloads that do not decode into `E` are reported as
    /// [`Diagnostic::EventDecodeFailed`] and skipped for this subscriber.
    pub fn subscribe_to<E, F>(self: &Arc<Self>, callback: F) -> SubscriptionHandle
    where
        E: EventPayload,
        F: Fn(E) + Send + Sync + 'static,
    {
        let diagnostics = Arc::clone(&self.diagnostics);

        self.subscribe(E::METHOD, move |event| {
            match event.decode::<E>() {
                Ok(payload) => callback(payload),
                Err(e) => diagnostics.report(Diagnostic::EventDecodeFailed {
                    method: event.method.clone(),
                    message: e.to_string(),
                }),
            }
            Ok(())
        })
    }

    /// Subscribes through a channel-backed [`EventStream`].
    ///
    /// Dropping the stream unsubscribes. The stream ends when the session closes.
    pub fn listen(self: &Arc<Self>, method: impl Into<String>) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = self.subscribe(method, move |event| {
            // Receiver gone means the stream is being dropped.
            let _ = tx.send(event.clone());
            Ok(())
        });

        EventStream {
            rx,
            handle: Some(handle),
        }
    }

    /// Removes a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, method: &str, id: SubscriptionId) -> bool {
        let removed = {
            let mut state = self.state.lock();
            let Some(list) = state.subscribers.get_mut(method) else {
                return false;
            };

            let before = list.len();
            list.retain(|s| s.id != id);
            let removed = list.len() != before;

            if list.is_empty() {
                state.subscribers.remove(method);
            }
            removed
        };

        if removed {
            trace!(%method, subscription = %id, "Unsubscribed");
        }
        removed
    }

    /// Delivers `event` to every subscriber of its method.
    ///
    /// Returns the number of callbacks that completed without error.
    pub fn dispatch(&self, event: &Event) -> usize {
        let snapshot: Vec<(SubscriptionId, EventCallback)> = {
            let state = self.state.lock();
            match state.subscribers.get(&event.method) {
                Some(list) => list
                    .iter()
                    .map(|s| (s.id, Arc::clone(&s.callback)))
                    .collect(),
                None => Vec::new(),
            }
        };

        self.diagnostics.record_event();

        if snapshot.is_empty() {
            trace!(method = %event.method, "No subscribers for event");
            return 0;
        }

        let mut delivered = 0;
        for (id, callback) in snapshot {
            let message = match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => {
                    delivered += 1;
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
            };

            self.diagnostics.report(Diagnostic::CallbackFailed {
                method: event.method.clone(),
                subscription: id,
                message,
            });
        }
        delivered
    }

    /// Returns the number of subscribers for `method`.
    #[must_use]
    pub fn subscriber_count(&self, method: &str) -> usize {
        self.state
            .lock()
            .subscribers
            .get(method)
            .map_or(0, Vec::len)
    }

    /// Registers a callback for the end of the session.
    ///
    /// Runs immediately if the session already closed.
    pub fn on_closed<F>(&self, callback: F)
    where
        F: FnOnce(&str) + Send + 'static,
    {
        let cause = {
            let mut state = self.state.lock();
            match &state.closed {
                Some(cause) => cause.clone(),
                None => {
                    state.closed_listeners.push(Box::new(callback));
                    return;
                }
            }
        };
        run_closed_listener(Box::new(callback), &cause);
    }

    /// Marks the session closed: drops all subscribers and runs closed listeners.
    ///
    /// Only the first call has any effect.
    pub fn notify_closed(&self, cause: &str) {
        let (listeners, subscribers) = {
            let mut state = self.state.lock();
            if state.closed.is_some() {
                return;
            }
            state.closed = Some(cause.to_string());
            (
                std::mem::take(&mut state.closed_listeners),
                std::mem::take(&mut state.subscribers),
            )
        };

        // Dropping callbacks ends any EventStream.
        drop(subscribers);

        debug!(listeners = listeners.len(), %cause, "Notifying session closed");
        for listener in listeners {
            run_closed_listener(listener, cause);
        }
    }
}

fn run_closed_listener(listener: ClosedCallback, cause: &str) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(cause))) {
        warn!(
            error = %panic_message(panic.as_ref()),
            "Session-closed callback panicked"
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// SubscriptionHandle
// ============================================================================

/// Handle to one event subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    method: String,
    registry: Weak<EventRegistry>,
}

impl SubscriptionHandle {
    /// Returns the subscription id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the subscribed method.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Removes the subscription.
    ///
    /// Returns `false` if it was already removed or the registry is gone.
    pub fn unsubscribe(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.unsubscribe(&self.method, self.id))
    }
}

// ============================================================================
// EventStream
// ============================================================================

/// Stream of events for one method.
///
/// Yields `None` once the session has closed.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<Event>,
    handle: Option<SubscriptionHandle>,
}

impl EventStream {
    /// Waits for the next event.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Returns the underlying subscription.
    #[must_use]
    pub fn subscription(&self) -> Option<&SubscriptionHandle> {
        self.handle.as_ref()
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.unsubscribe();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
