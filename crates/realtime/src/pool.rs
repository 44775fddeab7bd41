//! Process-wide pool of shared connections.
//!
//! Views bound to the same tenant and user share one [`ConnectionManager`].
//! Each binding holds a [`ConnectionLease`]; the connection is closed when
//! the last lease goes away.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::config::RealtimeConfig;
use crate::error::RealtimeError;
use crate::manager::ConnectionManager;

/// Identity of a pooled connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub tenant_id: String,
    pub user_id: String,
}

impl ConnectionKey {
    pub fn new(tenant_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.user_id)
    }
}

struct PoolEntry {
    manager: Arc<ConnectionManager>,
    leases: usize,
}

/// Shared connections keyed by `(tenant, user)`.
pub struct ConnectionPool {
    config: RealtimeConfig,
    entries: Mutex<HashMap<ConnectionKey, PoolEntry>>,
}

impl ConnectionPool {
    pub fn new(config: RealtimeConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Pool using [`RealtimeConfig::from_env`].
    pub fn from_env() -> Arc<Self> {
        Self::new(RealtimeConfig::from_env())
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ConnectionKey, PoolEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Takes a lease on the connection for `tenant_id`/`user_id`, creating
    /// it on first use, and asks it to connect.
    pub fn acquire(
        self: &Arc<Self>,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<ConnectionLease, RealtimeError> {
        let key = ConnectionKey::new(tenant_id, user_id);
        let manager = {
            let mut entries = self.entries();
            match entries.get_mut(&key) {
                Some(entry) => {
                    entry.leases += 1;
                    debug!(key = %key, leases = entry.leases, "reusing pooled connection");
                    entry.manager.clone()
                }
                None => {
                    let manager = Arc::new(ConnectionManager::for_target(
                        self.config.clone(),
                        tenant_id,
                        user_id,
                    )?);
                    info!(key = %key, url = %manager.url(), "pooled connection created");
                    entries.insert(
                        key.clone(),
                        PoolEntry {
                            manager: manager.clone(),
                            leases: 1,
                        },
                    );
                    manager
                }
            }
        };
        manager.connect();
        Ok(ConnectionLease {
            pool: self.clone(),
            key,
            manager,
        })
    }

    fn release(&self, key: &ConnectionKey) {
        let removed = {
            let mut entries = self.entries();
            let Some(entry) = entries.get_mut(key) else {
                return;
            };
            entry.leases = entry.leases.saturating_sub(1);
            if entry.leases > 0 {
                debug!(key = %key, leases = entry.leases, "lease released");
                return;
            }
            entries.remove(key)
        };
        if let Some(entry) = removed {
            info!(key = %key, "last lease released, closing connection");
            entry.manager.disconnect();
        }
    }

    /// Number of live pooled connections.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Outstanding leases for a key.
    pub fn lease_count(&self, tenant_id: &str, user_id: &str) -> usize {
        self.entries()
            .get(&ConnectionKey::new(tenant_id, user_id))
            .map_or(0, |e| e.leases)
    }
}

/// A claim on a pooled connection. Dropping it releases the claim.
pub struct ConnectionLease {
    pool: Arc<ConnectionPool>,
    key: ConnectionKey,
    manager: Arc<ConnectionManager>,
}

impl ConnectionLease {
    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        self.pool.release(&self.key);
    }
}
