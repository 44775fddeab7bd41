//! WebSocket read pump. Dispatches incoming frames and watches liveness.

use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::dispatch::Dispatcher;

/// Why the read loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReadEnd {
    /// Local cancellation (manual disconnect or superseded session).
    Cancelled,
    /// The server sent a close frame.
    CloseFrame(Option<u16>),
    /// The stream ended without a close frame.
    StreamEnded,
    /// A transport error ended the stream.
    Error,
    /// Nothing arrived within the read deadline.
    Timeout,
}

/// Reads frames until the connection ends, dispatching text frames.
///
/// Any incoming frame resets the read deadline. If nothing arrives within
/// `pong_wait` the connection is treated as dead, which covers transports
/// that fail without ever delivering a close.
pub(crate) async fn read_pump<S>(
    mut read: S,
    dispatcher: &Dispatcher,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    pong_wait: Duration,
) -> ReadEnd
where
    S: Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let deadline = tokio::time::sleep(pong_wait);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return ReadEnd::Cancelled,

            () = &mut deadline => {
                warn!("no frames for {pong_wait:?}, treating connection as dead");
                return ReadEnd::Timeout;
            }

            msg = read.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        return ReadEnd::Error;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        return ReadEnd::StreamEnded;
                    }
                };
                deadline.as_mut().reset(tokio::time::Instant::now() + pong_wait);

                match msg {
                    tungstenite::Message::Text(text) => {
                        dispatcher.handle_text(text.as_str());
                    }
                    tungstenite::Message::Ping(data) => {
                        trace!("received ping, sending pong");
                        let _ = write_tx.try_send(tungstenite::Message::Pong(data));
                    }
                    tungstenite::Message::Pong(_) => trace!("received pong"),
                    tungstenite::Message::Close(frame) => {
                        let code = frame.as_ref().map(|f| u16::from(f.code));
                        debug!(code = ?code, "received close frame");
                        return ReadEnd::CloseFrame(code);
                    }
                    tungstenite::Message::Binary(data) => {
                        trace!(len = data.len(), "ignoring binary frame");
                    }
                    tungstenite::Message::Frame(_) => {}
                }
            }
        }
    }
}
