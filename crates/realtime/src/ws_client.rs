//! WebSocket transport handle.
//!
//! Opens the socket, then owns the write and ping pumps. The read side is
//! driven by the session task so that the open notification always comes
//! before the first dispatched message.

use std::time::Duration;

use futures_util::Sink;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite};
use tokio_util::sync::CancellationToken;

/// A connected WebSocket stream.
pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Capacity of the outbound frame channel.
const WRITE_CHANNEL_CAPACITY: usize = 256;

/// Errors from opening a WebSocket.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),
}

impl WsError {
    /// Whether retrying the same request can ever succeed.
    ///
    /// URL errors (bad host, unsupported scheme, TLS not compiled in) are
    /// construction failures, not transient closes.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, WsError::Ws(tungstenite::Error::Url(_)))
    }
}

/// Performs the WebSocket handshake, bounded by `timeout` when set.
pub(crate) async fn open(
    request: Request,
    max_message_size: usize,
    timeout: Option<Duration>,
) -> Result<WsStream, WsError> {
    let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
    ws_config.max_message_size = Some(max_message_size);
    ws_config.max_frame_size = Some(max_message_size);

    let handshake = tokio_tungstenite::connect_async_with_config(request, Some(ws_config), true);
    let (stream, _response) = match timeout {
        Some(limit) => tokio::time::timeout(limit, handshake)
            .await
            .map_err(|_| WsError::Timeout(limit))??,
        None => handshake.await?,
    };
    Ok(stream)
}

/// Write side of one live transport.
///
/// Dropping the client cancels its pumps; the write pump sends a close
/// frame on the way out.
pub(crate) struct WsClient {
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    _write_handle: JoinHandle<()>,
    _ping_handle: JoinHandle<()>,
}

impl WsClient {
    /// Spawns the write and ping pumps over `write`.
    pub(crate) fn start<S>(write: S, ping_period: Duration, cancel: CancellationToken) -> Self
    where
        S: Sink<tungstenite::Message, Error = tungstenite::Error> + Unpin + Send + 'static,
    {
        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(WRITE_CHANNEL_CAPACITY);

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(write, write_rx, cancel))
        };

        let ping_handle = {
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::ping::ping_pump(write_tx, ping_period, cancel))
        };

        Self {
            write_tx,
            cancel,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
        }
    }

    /// Sender used by the read pump to answer pings.
    pub(crate) fn sender(&self) -> mpsc::Sender<tungstenite::Message> {
        self.write_tx.clone()
    }

    /// Free slots in the outbound channel.
    pub(crate) fn capacity(&self) -> usize {
        self.write_tx.capacity()
    }

    /// Queues a text frame without waiting. On failure the frame is
    /// handed back.
    pub(crate) fn try_send_text(&self, text: String) -> Result<(), String> {
        self.write_tx
            .try_send(tungstenite::Message::Text(text.into()))
            .map_err(|e| match e.into_inner() {
                tungstenite::Message::Text(t) => t.as_str().to_owned(),
                _ => String::new(),
            })
    }

    /// Stops the pumps; the write pump sends a close frame before exiting.
    pub(crate) fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
