//! In-memory loopback transport.
//!
//! [`pair`] returns the two engine-facing halves plus a [`RemoteEnd`] that
//! plays the part of the remote endpoint: it reads what the engine sent,
//! pushes inbound frames, and can close the session with a cause.
//!
//! # Example
//!
//! ```ignore
//! let (sink, source, mut remote) = transport::channel::pair();
//! let engine = ClientEngine::builder().start(sink, source);
//!
//! let completion = engine.invoke(&RawCommand::new("Page.enable", json!({}))).await?;
//! let sent = remote.next_sent().await.expect("command frame");
//! remote.push(r#"{"id":1,"result":{}}"#);
//! completion.await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

use super::{FrameSink, FrameSource, Inbound};

// ============================================================================
// Constructor
// ============================================================================

/// Creates a connected loopback transport.
#[must_use]
pub fn pair() -> (ChannelSink, ChannelSource, RemoteEnd) {
    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));

    let sink = ChannelSink {
        outgoing_tx,
        closed: Arc::clone(&closed),
    };
    let source = ChannelSource { inbound_rx };
    let remote = RemoteEnd {
        outgoing_rx,
        inbound_tx,
        closed,
    };

    (sink, source, remote)
}

// ============================================================================
// ChannelSink
// ============================================================================

/// Engine-facing outgoing half.
pub struct ChannelSink {
    outgoing_tx: mpsc::UnboundedSender<String>,
    /// Shared with [`RemoteEnd`]; set once either side closes.
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&self, frame: String) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::send("channel closed"));
        }
        self.outgoing_tx
            .send(frame)
            .map_err(|_| Error::send("remote end dropped"))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

// ============================================================================
// ChannelSource
// ============================================================================

/// Engine-facing incoming half.
pub struct ChannelSource {
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn recv(&mut self) -> Inbound {
        match self.inbound_rx.recv().await {
            Some(inbound) => inbound,
            None => Inbound::Closed("remote end dropped".to_string()),
        }
    }
}

// ============================================================================
// RemoteEnd
// ============================================================================

/// The remote side of a loopback transport.
pub struct RemoteEnd {
    outgoing_rx: mpsc::UnboundedReceiver<String>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    closed: Arc<AtomicBool>,
}

impl RemoteEnd {
    /// Waits for the next frame the engine sent.
    ///
    /// Returns `None` once the engine side is gone.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.outgoing_rx.recv().await
    }

    /// Returns the next sent frame if one is already queued.
    pub fn try_next_sent(&mut self) -> Option<String> {
        self.outgoing_rx.try_recv().ok()
    }

    /// Pushes an inbound frame to the engine.
    ///
    /// Returns `false` if the engine's reader is gone.
    pub fn push(&self, frame: impl Into<String>) -> bool {
        self.inbound_tx.send(Inbound::Frame(frame.into())).is_ok()
    }

    /// Closes the session with `cause`.
    ///
    /// Later sends from the engine fail with [`Error::Send`].
    pub fn close(&self, cause: impl Into<String>) {
        self.closed.store(true, Ordering::Release);
        let _ = self.inbound_tx.send(Inbound::Closed(cause.into()));
    }

    /// Returns `true` once either side has closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (sink, mut source, mut remote) = pair();

        sink.send("out".to_string()).await.expect("send");
        assert_eq!(remote.next_sent().await.as_deref(), Some("out"));

        assert!(remote.push("in"));
        assert_eq!(source.recv().await, Inbound::Frame("in".to_string()));
    }

    #[tokio::test]
    async fn test_remote_close() {
        let (sink, mut source, remote) = pair();

        remote.close("socket reset");
        assert_eq!(source.recv().await, Inbound::Closed("socket reset".to_string()));
        assert!(matches!(
            sink.send("late".to_string()).await,
            Err(Error::Send { .. })
        ));
    }

    #[tokio::test]
    async fn test_remote_dropped() {
        let (sink, mut source, remote) = pair();
        drop(remote);

        assert!(matches!(source.recv().await, Inbound::Closed(_)));
        assert!(sink.send("late".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_sink_close() {
        let (sink, _source, remote) = pair();
        sink.close().await;

        assert!(remote.is_closed());
        assert!(sink.send("late".to_string()).await.is_err());
    }
}
