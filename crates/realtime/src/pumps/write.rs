//! WebSocket write pump. Serialises outbound frames onto the sink.

use std::time::Duration;

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use bizosaas_protocol::constants::WS_WRITE_WAIT;

/// Writes frames to the socket until cancelled, the channel closes, or a
/// write fails. Always attempts a close frame on exit.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                let Some(msg) = msg else { break };
                match tokio::time::timeout(WS_WRITE_WAIT, write.send(msg)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!("WebSocket write error: {e}");
                        break;
                    }
                    Err(_) => {
                        warn!("WebSocket write stalled for {:?}, giving up", WS_WRITE_WAIT);
                        break;
                    }
                }
            }
        }
    }

    let bye = write.send(tungstenite::Message::Close(None));
    if tokio::time::timeout(Duration::from_secs(1), bye).await.is_err() {
        debug!("close frame not written before timeout");
    }
}
