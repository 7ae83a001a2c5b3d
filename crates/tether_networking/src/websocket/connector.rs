//! # Connectors
//!
//! A connector opens one connection and hands back a [`WsLink`]: a pair of
//! channels fed by pump tasks. The client driver never touches the socket.
//!
//! ```text
//! driver ──outgoing──► writer pump ──► socket
//! driver ◄─incoming─── reader pump ◄── socket
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use super::server::{run_session, RelayHub};
use crate::error::{TransportError, TransportResult};

/// Both directions of one open connection.
#[derive(Debug)]
pub struct WsLink {
    /// Text frames to write. Dropping every sender closes the connection.
    pub outgoing: mpsc::UnboundedSender<String>,
    /// Text frames read, or the error that ended the connection.
    pub incoming: mpsc::UnboundedReceiver<TransportResult<String>>,
}

/// Future returned by [`WsConnector::connect`].
pub type ConnectFuture = Pin<Box<dyn Future<Output = TransportResult<WsLink>> + Send>>;

/// Opens connections for a [`super::WsTransport`].
pub trait WsConnector: Send + Sync {
    /// Opens one connection to `url`.
    fn connect(&self, url: &str) -> ConnectFuture;
}

/// Connects over the network with `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TungsteniteConnector;

impl WsConnector for TungsteniteConnector {
    fn connect(&self, url: &str) -> ConnectFuture {
        let url = url.to_owned();
        Box::pin(async move {
            let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|err| TransportError::Connect(err.to_string()))?;
            tracing::debug!(url = %url, "websocket connected");
            Ok(spawn_pumps(stream))
        })
    }
}

/// Connects straight into an in-process [`RelayHub`], ignoring the URL.
#[derive(Clone)]
pub struct HubConnector {
    hub: Arc<RelayHub>,
}

impl HubConnector {
    /// Creates a connector for `hub`.
    #[must_use]
    pub fn new(hub: Arc<RelayHub>) -> Self {
        Self { hub }
    }
}

impl WsConnector for HubConnector {
    fn connect(&self, _url: &str) -> ConnectFuture {
        let hub = Arc::clone(&self.hub);
        Box::pin(async move {
            let (client_tx, client_rx) = mpsc::unbounded_channel();
            let (server_tx, server_rx) = mpsc::unbounded_channel();
            tokio::spawn(run_session(
                hub,
                WsLink { outgoing: server_tx, incoming: forward(client_rx) },
            ));
            Ok(WsLink { outgoing: client_tx, incoming: forward(server_rx) })
        })
    }
}

/// Lifts a plain frame channel into a link's incoming side.
fn forward(mut rx: mpsc::UnboundedReceiver<String>) -> mpsc::UnboundedReceiver<TransportResult<String>> {
    let (tx, out) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if tx.send(Ok(text)).is_err() {
                break;
            }
        }
    });
    out
}

/// Splits a socket into a [`WsLink`] driven by two pump tasks.
pub(crate) fn spawn_pumps<S>(stream: WebSocketStream<S>) -> WsLink
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut source) = stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let (in_tx, in_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if let Err(err) = sink.send(Message::Text(text)).await {
                tracing::debug!(error = %err, "websocket write failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        while let Some(frame) = source.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if in_tx.send(Ok(text)).is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    let _ = in_tx.send(Err(TransportError::Socket(err.to_string())));
                    break;
                }
            }
        }
    });

    WsLink { outgoing: out_tx, incoming: in_rx }
}
