//! Connection manager for one real-time endpoint.
//!
//! Owns at most one live transport, reconnects with linear backoff on
//! unexpected closes, queues frames sent while disconnected and fans
//! inbound messages out through its [`SubscriptionRegistry`].

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use bizosaas_protocol::{ControlMessage, InboundMessage, endpoint_url, stamp_outbound};

use crate::config::RealtimeConfig;
use crate::error::RealtimeError;
use crate::outbound::Enqueued;
use crate::reconnection::{WsContext, start_session, stop_session};
use crate::registry::{Subscription, SubscriptionRegistry};
use crate::types::{ConnectionEvent, ConnectionState, SendOutcome};

/// Connection manager for one tenant/user endpoint.
///
/// All operations are synchronous and never block on the network, so they
/// may be called from inside listeners. `connect` needs a tokio runtime.
pub struct ConnectionManager {
    ctx: Arc<WsContext>,
}

impl ConnectionManager {
    /// Creates a manager for `url`. Nothing is opened until [`connect`](Self::connect).
    pub fn new(url: impl Into<String>, config: RealtimeConfig) -> Self {
        Self {
            ctx: Arc::new(WsContext::new(url.into(), config)),
        }
    }

    /// Creates a manager for `<config.endpoint>/<tenant_id>/<user_id>`.
    pub fn for_target(
        config: RealtimeConfig,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Self, RealtimeError> {
        let url = endpoint_url(&config.endpoint, tenant_id, user_id)?;
        Ok(Self::new(url, config))
    }

    pub fn url(&self) -> &str {
        &self.ctx.url
    }

    /// Opens the transport unless one is already open or connecting.
    pub fn connect(&self) {
        start_session(&self.ctx);
    }

    /// Closes the transport and cancels any scheduled reconnect.
    /// Listeners stay registered. Idempotent.
    pub fn disconnect(&self) {
        stop_session(&self.ctx);
    }

    /// Resets the attempt counter, then connects. This is the way back
    /// after the reconnect ceiling was reached.
    pub fn reconnect(&self) {
        {
            let mut link = self.ctx.link();
            link.cancel_reconnect();
            link.attempts.reset();
            link.exhausted = false;
        }
        start_session(&self.ctx);
    }

    /// Sends `payload` with an injected `timestamp`.
    ///
    /// While the transport is not open the frame is queued for the next
    /// open, or dropped when queuing is disabled. On an open transport a
    /// frame that finds the write channel full, or older frames still
    /// queued, waits in the same queue and goes out in order as room frees
    /// up. Failures are logged, never returned.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> SendOutcome {
        let frame = match stamp_outbound(payload, Utc::now()) {
            Ok(f) => f,
            Err(e) => {
                warn!(url = %self.ctx.url, error = %e, "cannot encode outbound message, dropping");
                return SendOutcome::Dropped;
            }
        };

        let (pushed, queued, open) = {
            let mut link = self.ctx.link();
            let open = link.state.is_open() && link.client.is_some();
            let frame = if open
                && link.outbound.is_empty()
                && let Some(client) = link.client.as_ref()
            {
                match client.try_send_text(frame) {
                    Ok(()) => {
                        trace!(url = %self.ctx.url, "message sent");
                        return SendOutcome::Sent;
                    }
                    Err(frame) => frame,
                }
            } else {
                frame
            };
            let pushed = link.outbound.push(frame);
            (pushed, link.outbound.len(), open)
        };
        if open {
            self.ctx.outbound_ready.notify_one();
        }

        match pushed {
            Enqueued::Stored if open => {
                debug!(url = %self.ctx.url, queued, "write channel busy, message queued");
                SendOutcome::Queued
            }
            Enqueued::Stored => {
                warn!(url = %self.ctx.url, queued, "not connected, message queued");
                SendOutcome::Queued
            }
            Enqueued::Evicted => {
                warn!(url = %self.ctx.url, queued, "outbound queue full, dropped oldest message");
                self.ctx.emit(ConnectionEvent::OutboundDropped { count: 1 });
                SendOutcome::Queued
            }
            Enqueued::Disabled if open => {
                warn!(url = %self.ctx.url, "write channel full, message dropped");
                SendOutcome::Dropped
            }
            Enqueued::Disabled => {
                warn!(url = %self.ctx.url, "not connected, message dropped");
                SendOutcome::Dropped
            }
        }
    }

    pub fn send_control(&self, msg: &ControlMessage) -> SendOutcome {
        self.send(msg)
    }

    /// Asks the gateway for an immediate refresh of `update_type`.
    pub fn request_update(&self, update_type: impl Into<String>) -> SendOutcome {
        self.send_control(&ControlMessage::RequestUpdate {
            update_type: update_type.into(),
        })
    }

    /// Registers a listener for messages of `msg_type`.
    pub fn on_message<F>(&self, msg_type: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.ctx.registry.on_message(msg_type, callback)
    }

    /// Registers a connection-state listener; it is called once right away
    /// with the current state.
    pub fn on_connection<F>(&self, callback: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.ctx.registry.on_connection(callback)
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.ctx.registry
    }

    pub fn state(&self) -> ConnectionState {
        self.ctx.link().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Reconnect attempts since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.ctx.link().attempts.count()
    }

    /// Whether automatic reconnection gave up.
    pub fn reconnect_exhausted(&self) -> bool {
        self.ctx.link().exhausted
    }

    /// Frames waiting for the next open.
    pub fn queued(&self) -> usize {
        self.ctx.link().outbound.len()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.ctx.events_tx.subscribe()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        stop_session(&self.ctx);
    }
}
