//! Push Transport
//!
//! The socket underneath the Faye session. A [`Transport`] opens one
//! [`Connection`]; the connection accepts text writes without blocking and
//! yields inbound text frames until it closes.

mod websocket;

pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Opens connections to the push service
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to `url`; success means the socket is open
    async fn connect(&self, url: &str) -> Result<Connection, TransportError>;
}

/// Something that happened on an open connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text payload arrived
    Frame(String),
    /// The connection is gone; no further events follow
    Closed(Option<String>),
}

/// One open connection, owned by the session driver
#[derive(Debug)]
pub struct Connection {
    outbound: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// The transport's side of a [`Connection`]
#[derive(Debug)]
pub struct ConnectionPeer {
    /// Feed inbound events to the connection
    pub events: mpsc::UnboundedSender<TransportEvent>,
    /// Text written by the connection owner
    pub outbound: mpsc::UnboundedReceiver<String>,
}

impl Connection {
    /// Create a connection and the peer end a transport drives it with
    pub fn pair() -> (Connection, ConnectionPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let connection = Connection {
            outbound: outbound_tx,
            events: events_rx,
        };
        let peer = ConnectionPeer {
            events: events_tx,
            outbound: outbound_rx,
        };
        (connection, peer)
    }

    /// Queue a text payload for writing
    pub fn send(&self, text: String) -> Result<(), TransportError> {
        self.outbound.send(text).map_err(|_| TransportError::Closed)
    }

    /// Next event, or `None` once the transport has gone away
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Connection closed")]
    Closed,
}
