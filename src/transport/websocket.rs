//! WebSocket client transport.
//!
//! Connects to a `ws://` or `wss://` endpoint (for example the
//! `webSocketDebuggerUrl` a browser prints on startup) and splits the stream
//! into a [`WebSocketSink`] and a [`WebSocketSource`].
//!
//! # Frame Handling
//!
//! | Inbound message | Result |
//! |-----------------|--------|
//! | Text | [`Inbound::Frame`] |
//! | Binary (valid UTF-8) | [`Inbound::Frame`] |
//! | Binary (invalid UTF-8) | dropped with a warning |
//! | Ping / Pong | ignored |
//! | Close | [`Inbound::Closed`] with the close reason |
//! | Read error / end of stream | [`Inbound::Closed`] |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::{FrameSink, FrameSource, Inbound};

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// Connect
// ============================================================================

/// Validates a WebSocket URL.
///
/// # Errors
///
/// Returns [`Error::Config`] if the URL does not parse or its scheme is not `ws`/`wss`.
pub fn parse_ws_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| Error::config(format!("invalid URL `{url}`: {e}")))?;

    match parsed.scheme() {
        "ws" | "wss" => Ok(parsed),
        scheme => Err(Error::config(format!(
            "unsupported scheme `{scheme}`, expected ws or wss"
        ))),
    }
}

/// Connects to a WebSocket endpoint.
///
/// # Errors
///
/// - [`Error::Config`] if the URL is invalid
/// - [`Error::Connection`] if the handshake exceeds `connect_timeout`
/// - [`Error::WebSocket`] if the connection or handshake fails
pub async fn connect(
    url: &str,
    connect_timeout: Duration,
) -> Result<(WebSocketSink, WebSocketSource)> {
    let url = parse_ws_url(url)?;

    let (stream, _response) = timeout(connect_timeout, connect_async(url.as_str()))
        .await
        .map_err(|_| {
            Error::connection(format!(
                "timed out after {}ms connecting to {url}",
                connect_timeout.as_millis()
            ))
        })?
        .inspect_err(|e| warn!(%url, error = %e, "WebSocket handshake failed"))?;

    info!(%url, "WebSocket connection established");

    let (write, read) = stream.split();
    Ok((
        WebSocketSink {
            write: AsyncMutex::new(Some(write)),
        },
        WebSocketSource { read },
    ))
}

// ============================================================================
// WebSocketSink
// ============================================================================

/// Outgoing half of a WebSocket connection.
///
/// Writes are serialized by an internal lock.
#[derive(Debug)]
pub struct WebSocketSink {
    /// `None` once closed.
    write: AsyncMutex<Option<SplitSink<WsStream, Message>>>,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send(&self, frame: String) -> Result<()> {
        let mut guard = self.write.lock().await;
        let Some(write) = guard.as_mut() else {
            return Err(Error::send("WebSocket already closed"));
        };

        write
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| Error::send(e.to_string()))?;

        trace!("Frame sent");
        Ok(())
    }

    async fn close(&self) {
        let write = self.write.lock().await.take();
        if let Some(mut write) = write
            && let Err(e) = write.close().await
        {
            debug!(error = %e, "WebSocket close failed");
        }
    }
}

// ============================================================================
// WebSocketSource
// ============================================================================

/// Incoming half of a WebSocket connection.
#[derive(Debug)]
pub struct WebSocketSource {
    read: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WebSocketSource {
    async fn recv(&mut self) -> Inbound {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => return Inbound::Frame(text.as_str().to_owned()),

                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Inbound::Frame(text),
                    Err(_) => warn!(len = bytes.len(), "Dropping non-UTF-8 binary frame"),
                },

                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_owned())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by remote".to_string());
                    debug!(%reason, "WebSocket closed by remote");
                    return Inbound::Closed(reason);
                }

                Some(Err(e)) => {
                    error!(error = %e, "WebSocket error");
                    return Inbound::Closed(e.to_string());
                }

                None => {
                    debug!("WebSocket stream ended");
                    return Inbound::Closed("stream ended".to_string());
                }

                // Ignore Ping, Pong, raw Frame
                Some(Ok(_)) => {}
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
