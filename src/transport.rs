//! Socket transport seam.
//!
//! DESIGN
//! ======
//! The session task never touches a WebSocket directly. A `Connector` dials
//! the server and returns a `SocketLink`: a pair of channels carrying text
//! frames and close notifications. `WsConnector` backs the link with
//! tokio-tungstenite, running one writer pump and one reader pump per socket.
//! Tests back it with plain channels through `SocketLink::channel`.
//!
//! ERROR HANDLING
//! ==============
//! Dial failures surface as `TransportError::Connect`. Once a link is up,
//! every way a socket can end (close frame, read error, stream end) is folded
//! into exactly one `Incoming::Closed` with the close code. Stream errors and
//! missing close frames report `CLOSE_ABNORMAL`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, warn};

use crate::error::ErrorCode;

/// Intentional shutdown. Never triggers a reconnect.
pub const CLOSE_NORMAL: u16 = 1000;
/// Socket ended without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("websocket connect failed: {0}")]
    Connect(String),
    #[error("websocket link closed")]
    Closed,
}

impl ErrorCode for TransportError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Connect(_) => "E_TRANSPORT_CONNECT",
            Self::Closed => "E_TRANSPORT_CLOSED",
        }
    }

    fn retryable(&self) -> bool {
        true
    }
}

/// Session to socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Text(String),
    Close { code: u16, reason: String },
}

/// Socket to session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Text(String),
    Closed { code: u16, reason: String },
}

/// Session side of an open socket.
#[derive(Debug)]
pub struct SocketLink {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    incoming: mpsc::UnboundedReceiver<Incoming>,
}

/// Socket side of a `SocketLink`, handed to whatever drives the wire.
#[derive(Debug)]
pub struct LinkPeer {
    pub outgoing: mpsc::UnboundedReceiver<Outgoing>,
    pub incoming: mpsc::UnboundedSender<Incoming>,
}

impl SocketLink {
    /// A connected link/peer pair over in-memory channels.
    #[must_use]
    pub fn channel() -> (Self, LinkPeer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            Self {
                outgoing: out_tx,
                incoming: in_rx,
            },
            LinkPeer {
                outgoing: out_rx,
                incoming: in_tx,
            },
        )
    }

    /// Queue a text frame on the socket.
    ///
    /// # Errors
    ///
    /// `TransportError::Closed` if the socket side has gone away.
    pub fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.outgoing
            .send(Outgoing::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    /// Ask the socket side to close. Best effort.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.outgoing.send(Outgoing::Close {
            code,
            reason: reason.to_owned(),
        });
    }

    /// Next event from the socket, or `None` once the socket side is dropped.
    pub async fn recv(&mut self) -> Option<Incoming> {
        self.incoming.recv().await
    }
}

/// Dials the collaboration server.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<SocketLink, TransportError>;
}

// =============================================================================
// WEBSOCKET CONNECTOR
// =============================================================================

/// Production connector over tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<SocketLink, TransportError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(%url, "ws: socket open");

        let (mut sink, mut source) = stream.split();
        let (link, peer) = SocketLink::channel();
        let LinkPeer {
            mut outgoing,
            incoming,
        } = peer;

        tokio::spawn(async move {
            while let Some(msg) = outgoing.recv().await {
                match msg {
                    Outgoing::Text(text) => {
                        if let Err(e) = sink.send(Message::text(text)).await {
                            warn!(error = %e, "ws: write failed");
                            break;
                        }
                    }
                    Outgoing::Close { code, reason } => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        };
                        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                            debug!(error = %e, "ws: close frame not delivered");
                        }
                        return;
                    }
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            let mut code = CLOSE_ABNORMAL;
            let mut reason = String::new();
            while let Some(msg) = source.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if incoming.send(Incoming::Text(text.as_str().to_owned())).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        if let Some(frame) = frame {
                            code = u16::from(frame.code);
                            reason = frame.reason.as_str().to_owned();
                        }
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "ws: read failed");
                        break;
                    }
                }
            }
            debug!(code, %reason, "ws: socket closed");
            let _ = incoming.send(Incoming::Closed { code, reason });
        });

        Ok(link)
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
