//! WebSocket transport over `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::{Connection, ConnectionPeer, Transport, TransportError, TransportEvent};

/// Transport that speaks WebSocket to the push endpoint
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        tracing::debug!(url = %url, "WebSocket connected");

        let (mut sender, mut receiver) = ws.split();
        let (connection, peer) = Connection::pair();
        let ConnectionPeer {
            events,
            mut outbound,
        } = peer;

        // Forward queued writes until the connection owner goes away
        tokio::spawn(async move {
            while let Some(text) = outbound.recv().await {
                tracing::trace!(payload = %text, "Sending");
                if let Err(e) = sender.send(Message::Text(text.into())).await {
                    tracing::debug!(error = %e, "WebSocket send failed");
                    break;
                }
            }
            let _ = sender.close().await;
        });

        tokio::spawn(async move {
            let reason = loop {
                match receiver.next().await {
                    Some(Ok(Message::Text(text))) => {
                        tracing::trace!(payload = %text.as_str(), "Received");
                        if events
                            .send(TransportEvent::Frame(text.as_str().to_owned()))
                            .is_err()
                        {
                            break None;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map(|f| f.reason.as_str().to_owned());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "WebSocket receive error");
                        break Some(e.to_string());
                    }
                    None => break None,
                }
            };
            let _ = events.send(TransportEvent::Closed(reason));
        });

        Ok(connection)
    }
}
