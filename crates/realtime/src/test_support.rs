//! Loopback WebSocket server and helpers for end-to-end tests.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite};

use crate::config::RealtimeConfig;
use crate::types::ConnectionEvent;

const WAIT: Duration = Duration::from_secs(5);

pub(crate) type ServerConn = WebSocketStream<TcpStream>;

/// Accepts WebSocket connections on a random local port.
pub(crate) struct TestServer {
    pub(crate) base: String,
    conns: mpsc::UnboundedReceiver<ServerConn>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub(crate) async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, conns) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                if let Ok(ws) = accept_async(tcp).await
                    && tx.send(ws).is_err()
                {
                    break;
                }
            }
        });
        Self {
            base: format!("ws://{addr}/ws/realtime"),
            conns,
            handle,
        }
    }

    /// URL for one tenant/user pair on this server.
    pub(crate) fn url(&self, tenant: &str, user: &str) -> String {
        format!("{}/{tenant}/{user}", self.base)
    }

    pub(crate) fn config(&self) -> RealtimeConfig {
        RealtimeConfig {
            endpoint: self.base.clone(),
            reconnect_base_delay_ms: 20,
            ..RealtimeConfig::default()
        }
    }

    pub(crate) async fn accept(&mut self) -> ServerConn {
        tokio::time::timeout(WAIT, self.conns.recv())
            .await
            .expect("connection in time")
            .expect("server running")
    }

    /// Whether a connection arrives within `window`.
    pub(crate) async fn accepts_within(&mut self, window: Duration) -> bool {
        matches!(tokio::time::timeout(window, self.conns.recv()).await, Ok(Some(_)))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// An endpoint on a port nobody listens on.
pub(crate) fn dead_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("ws://127.0.0.1:{port}/ws/realtime/t/u")
}

/// Next text frame from the client, parsed as JSON.
pub(crate) async fn next_json(conn: &mut ServerConn) -> serde_json::Value {
    loop {
        let frame = tokio::time::timeout(WAIT, conn.next())
            .await
            .expect("frame in time");
        match frame {
            Some(Ok(tungstenite::Message::Text(text))) => {
                return serde_json::from_str(text.as_str()).unwrap();
            }
            Some(Ok(_)) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

pub(crate) async fn next_event(rx: &mut broadcast::Receiver<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("event in time")
        .expect("event channel open")
}

/// Skips events until `wanted` matches, returning it.
pub(crate) async fn wait_for(
    rx: &mut broadcast::Receiver<ConnectionEvent>,
    wanted: impl Fn(&ConnectionEvent) -> bool,
) -> ConnectionEvent {
    loop {
        let event = next_event(rx).await;
        if wanted(&event) {
            return event;
        }
    }
}
