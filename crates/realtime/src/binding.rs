//! Per-view binding to a pooled connection.
//!
//! A [`RealtimeBinding`] is what a dashboard view holds while it is on
//! screen: it leases the connection for its tenant and user, mirrors the
//! connection state into a `watch` channel and tracks every listener it
//! registers so that dropping the binding leaves nothing behind.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use bizosaas_protocol::{ControlMessage, InboundMessage};

use crate::error::RealtimeError;
use crate::manager::ConnectionManager;
use crate::pool::{ConnectionLease, ConnectionPool};
use crate::registry::SubscriptionBag;
use crate::types::SendOutcome;

pub struct RealtimeBinding {
    // Declared first so listeners go before the lease.
    subscriptions: SubscriptionBag,
    lease: ConnectionLease,
    pool: Arc<ConnectionPool>,
    connected_rx: watch::Receiver<bool>,
}

impl RealtimeBinding {
    /// Leases the connection for `tenant_id`/`user_id` and connects it.
    pub fn bind(
        pool: &Arc<ConnectionPool>,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Self, RealtimeError> {
        let lease = pool.acquire(tenant_id, user_id)?;
        let (connected_tx, connected_rx) = watch::channel(false);

        let mut subscriptions = SubscriptionBag::new();
        subscriptions.add(lease.manager().on_connection(move |connected| {
            connected_tx.send_replace(connected);
        }));
        debug!(key = %lease.key(), "bound");

        Ok(Self {
            subscriptions,
            lease,
            pool: pool.clone(),
            connected_rx,
        })
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        self.lease.manager()
    }

    pub fn tenant_id(&self) -> &str {
        &self.lease.key().tenant_id
    }

    pub fn user_id(&self) -> &str {
        &self.lease.key().user_id
    }

    pub fn is_connected(&self) -> bool {
        *self.connected_rx.borrow()
    }

    /// Receiver that changes whenever the connection opens or closes.
    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.connected_rx.clone()
    }

    /// Registers a message listener that lives as long as this binding.
    pub fn on_message<F>(&mut self, msg_type: impl Into<String>, callback: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        let sub = self.manager().on_message(msg_type, callback);
        self.subscriptions.add(sub);
    }

    pub fn connect_dashboard(&self) -> SendOutcome {
        self.manager().send_control(&ControlMessage::DashboardConnect)
    }

    pub fn connect_agents(&self) -> SendOutcome {
        self.manager()
            .send_control(&ControlMessage::AgentMonitorConnect)
    }

    /// Moves the binding to another tenant/user.
    ///
    /// A change of either id tears down the old binding and builds a new one
    /// from scratch, so listeners registered through [`on_message`](Self::on_message)
    /// must be registered again. Returns whether anything changed.
    pub fn rebind(&mut self, tenant_id: &str, user_id: &str) -> Result<bool, RealtimeError> {
        if self.tenant_id() == tenant_id && self.user_id() == user_id {
            return Ok(false);
        }
        let fresh = Self::bind(&self.pool, tenant_id, user_id)?;
        drop(std::mem::replace(self, fresh));
        Ok(true)
    }

    /// Releases listeners and the connection lease.
    pub fn unbind(self) {}
}

impl Drop for RealtimeBinding {
    fn drop(&mut self) {
        debug!(key = %self.lease.key(), listeners = self.subscriptions.len(), "unbinding");
        self.subscriptions.dispose();
    }
}
