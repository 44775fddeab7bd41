//! Subscription registry: per-type message listeners and connection-state
//! listeners.
//!
//! Listeners are invoked with the registry lock released, so a listener may
//! subscribe or unsubscribe (itself included) while it runs.

use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{error, trace};

use bizosaas_protocol::InboundMessage;

/// Callback for messages of one type.
pub type MessageListener = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

/// Callback for connected/disconnected transitions.
pub type ConnectionListener = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    connected: bool,
    // BTreeMap keyed by a monotonic id keeps registration order.
    by_type: HashMap<String, BTreeMap<u64, MessageListener>>,
    connection: BTreeMap<u64, ConnectionListener>,
}

impl Listeners {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

fn lock(inner: &Mutex<Listeners>) -> MutexGuard<'_, Listeners> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registry of listeners for one connection.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<Mutex<Listeners>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for messages whose `type` equals `msg_type`.
    pub fn on_message<F>(&self, msg_type: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        let msg_type = msg_type.into();
        let mut guard = lock(&self.inner);
        let id = guard.next_id();
        guard
            .by_type
            .entry(msg_type.clone())
            .or_default()
            .insert(id, Arc::new(callback));
        trace!(msg_type = %msg_type, id, "message listener added");
        Subscription {
            registry: Arc::downgrade(&self.inner),
            key: Some(Key::Message { msg_type, id }),
        }
    }

    /// Registers a connection-state listener and replays the current state
    /// to it before returning.
    pub fn on_connection<F>(&self, callback: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let callback: ConnectionListener = Arc::new(callback);
        let (id, connected) = {
            let mut guard = lock(&self.inner);
            let id = guard.next_id();
            guard.connection.insert(id, callback.clone());
            (id, guard.connected)
        };
        invoke_guarded("connection", || callback(connected));
        Subscription {
            registry: Arc::downgrade(&self.inner),
            key: Some(Key::Connection { id }),
        }
    }

    /// Delivers a message to every listener of its type, in registration
    /// order. Returns the number of listeners invoked.
    ///
    /// Listeners added during the call wait for the next message. A
    /// listener removed by an earlier sibling in the same call is skipped.
    pub fn dispatch(&self, msg: &InboundMessage) -> usize {
        let snapshot: Vec<(u64, MessageListener)> = {
            let guard = lock(&self.inner);
            match guard.by_type.get(&msg.msg_type) {
                Some(set) => set.iter().map(|(id, l)| (*id, l.clone())).collect(),
                None => return 0,
            }
        };
        let mut invoked = 0;
        for (id, listener) in &snapshot {
            let live = lock(&self.inner)
                .by_type
                .get(&msg.msg_type)
                .is_some_and(|set| set.contains_key(id));
            if !live {
                continue;
            }
            invoke_guarded(&msg.msg_type, || listener(msg));
            invoked += 1;
        }
        invoked
    }

    /// Records the new connection state and notifies connection listeners.
    pub fn notify_connection(&self, connected: bool) {
        let snapshot: Vec<ConnectionListener> = {
            let mut guard = lock(&self.inner);
            guard.connected = connected;
            guard.connection.values().cloned().collect()
        };
        for listener in &snapshot {
            invoke_guarded("connection", || listener(connected));
        }
    }

    /// Last state passed to [`notify_connection`](Self::notify_connection).
    pub fn connected(&self) -> bool {
        lock(&self.inner).connected
    }

    /// Number of message listeners for a type.
    pub fn listener_count(&self, msg_type: &str) -> usize {
        lock(&self.inner)
            .by_type
            .get(msg_type)
            .map_or(0, BTreeMap::len)
    }

    /// Number of connection-state listeners.
    pub fn connection_listener_count(&self) -> usize {
        lock(&self.inner).connection.len()
    }
}

/// Runs one listener, containing any panic so siblings still get called.
fn invoke_guarded(label: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(listener = %label, "listener panicked; continuing dispatch");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Key {
    Message { msg_type: String, id: u64 },
    Connection { id: u64 },
}

/// Handle removing exactly one registration.
///
/// Dropping the handle leaves the listener registered; call
/// [`unsubscribe`](Self::unsubscribe) or hand it to a
/// [`SubscriptionBag`] to tie it to a scope.
#[must_use = "dropping a Subscription keeps the listener registered"]
pub struct Subscription {
    registry: Weak<Mutex<Listeners>>,
    key: Option<Key>,
}

impl Subscription {
    /// Removes the listener. Calling it again, or after the registry is
    /// gone, does nothing.
    pub fn unsubscribe(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        let Some(inner) = self.registry.upgrade() else {
            return;
        };
        let mut guard = lock(&inner);
        match key {
            Key::Message { msg_type, id } => {
                if let Some(set) = guard.by_type.get_mut(&msg_type) {
                    set.remove(&id);
                    if set.is_empty() {
                        guard.by_type.remove(&msg_type);
                    }
                }
            }
            Key::Connection { id } => {
                guard.connection.remove(&id);
            }
        }
    }

    /// Whether this handle still refers to a registration.
    pub fn is_active(&self) -> bool {
        self.key.is_some() && self.registry.strong_count() > 0
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("key", &self.key).finish()
    }
}

/// A set of subscriptions released together.
///
/// Everything added is unsubscribed on [`dispose`](Self::dispose) or when the
/// bag is dropped, whichever comes first.
#[derive(Debug, Default)]
pub struct SubscriptionBag {
    subs: Vec<Subscription>,
}

impl SubscriptionBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, sub: Subscription) {
        self.subs.push(sub);
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }

    /// Unsubscribes everything held. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        for mut sub in self.subs.drain(..) {
            sub.unsubscribe();
        }
    }
}

impl Extend<Subscription> for SubscriptionBag {
    fn extend<T: IntoIterator<Item = Subscription>>(&mut self, iter: T) {
        self.subs.extend(iter);
    }
}

impl Drop for SubscriptionBag {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn msg(msg_type: &str) -> InboundMessage {
        InboundMessage::new(msg_type, serde_json::json!({"n": 1}))
    }

    fn recorder() -> (Arc<Mutex<Vec<InboundMessage>>>, impl Fn(&InboundMessage) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        (seen, move |m: &InboundMessage| {
            seen_cb.lock().unwrap().push(m.clone())
        })
    }

    #[test]
    fn dispatch_invokes_matching_listener_once_with_envelope() {
        let registry = SubscriptionRegistry::new();
        let (seen, cb) = recorder();
        let _sub = registry.on_message("metrics_update", cb);

        let mut m = msg("metrics_update");
        m.agent_id = Some("seo-1".into());
        assert_eq!(registry.dispatch(&m), 1);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], m);
    }

    #[test]
    fn dispatch_ignores_other_types() {
        let registry = SubscriptionRegistry::new();
        let (seen, cb) = recorder();
        let _sub = registry.on_message("a", cb);

        assert_eq!(registry.dispatch(&msg("b")), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn unsubscribe_round_trip() {
        let registry = SubscriptionRegistry::new();
        let (seen, cb) = recorder();
        let mut sub = registry.on_message("x", cb);
        sub.unsubscribe();

        registry.dispatch(&msg("x"));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(registry.listener_count("x"), 0);
    }

    #[test]
    fn unsubscribe_twice_is_noop() {
        let registry = SubscriptionRegistry::new();
        let mut sub = registry.on_message("x", |_| {});
        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
    }

    #[test]
    fn unsubscribe_after_registry_dropped_is_noop() {
        let registry = SubscriptionRegistry::new();
        let mut sub = registry.on_message("x", |_| {});
        drop(registry);
        assert!(!sub.is_active());
        sub.unsubscribe();
    }

    #[test]
    fn unsubscribe_removes_only_its_entry() {
        let registry = SubscriptionRegistry::new();
        let (first, cb1) = recorder();
        let (second, cb2) = recorder();
        let mut sub1 = registry.on_message("x", cb1);
        let _sub2 = registry.on_message("x", cb2);

        sub1.unsubscribe();
        registry.dispatch(&msg("x"));

        assert!(first.lock().unwrap().is_empty());
        assert_eq!(second.lock().unwrap().len(), 1);
    }

    #[test]
    fn delivery_follows_registration_order() {
        let registry = SubscriptionRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Vec::new();
        for i in 0..5 {
            let order = order.clone();
            subs.push(registry.on_message("x", move |_| order.lock().unwrap().push(i)));
        }

        registry.dispatch(&msg("x"));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn listener_may_unsubscribe_itself_during_dispatch() {
        let registry = SubscriptionRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let calls_cb = calls.clone();
        let slot_cb = slot.clone();
        let sub = registry.on_message("once", move |_| {
            calls_cb.fetch_add(1, Ordering::SeqCst);
            if let Some(mut me) = slot_cb.lock().unwrap().take() {
                me.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(sub);

        registry.dispatch(&msg("once"));
        registry.dispatch(&msg("once"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_removed_by_sibling_is_not_called() {
        let registry = SubscriptionRegistry::new();
        let second_calls = Arc::new(AtomicUsize::new(0));
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let victim_cb = victim.clone();
        let _first = registry.on_message("x", move |_| {
            if let Some(mut sub) = victim_cb.lock().unwrap().take() {
                sub.unsubscribe();
            }
        });
        let calls_cb = second_calls.clone();
        let second = registry.on_message("x", move |_| {
            calls_cb.fetch_add(1, Ordering::SeqCst);
        });
        *victim.lock().unwrap() = Some(second);

        assert_eq!(registry.dispatch(&msg("x")), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
        assert_eq!(registry.listener_count("x"), 1);
    }

    #[test]
    fn listener_may_subscribe_during_dispatch() {
        let registry = SubscriptionRegistry::new();
        let added = Arc::new(Mutex::new(Vec::new()));
        let reg = registry.clone();
        let added_cb = added.clone();
        let _sub = registry.on_message("x", move |_| {
            added_cb.lock().unwrap().push(reg.on_message("y", |_| {}));
        });

        registry.dispatch(&msg("x"));
        assert_eq!(registry.listener_count("y"), 1);
    }

    #[test]
    fn panicking_listener_does_not_block_siblings() {
        let registry = SubscriptionRegistry::new();
        let (seen, cb) = recorder();
        let _bad = registry.on_message("x", |_| panic!("listener failure"));
        let _good = registry.on_message("x", cb);

        assert_eq!(registry.dispatch(&msg("x")), 2);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn on_connection_replays_current_state() {
        let registry = SubscriptionRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        let _a = registry.on_connection(move |c| s.lock().unwrap().push(c));
        assert_eq!(*seen.lock().unwrap(), vec![false]);

        registry.notify_connection(true);
        let s = seen.clone();
        let _b = registry.on_connection(move |c| s.lock().unwrap().push(c));
        // First listener saw the transition, second got the replay.
        assert_eq!(*seen.lock().unwrap(), vec![false, true, true]);
    }

    #[test]
    fn connection_listener_unsubscribe() {
        let registry = SubscriptionRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let mut sub = registry.on_connection(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();
        registry.notify_connection(true);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.connection_listener_count(), 0);
    }

    #[test]
    fn bag_disposes_everything() {
        let registry = SubscriptionRegistry::new();
        let mut bag = SubscriptionBag::new();
        bag.add(registry.on_message("a", |_| {}));
        bag.add(registry.on_message("b", |_| {}));
        bag.add(registry.on_connection(|_| {}));
        assert_eq!(bag.len(), 3);

        bag.dispose();
        bag.dispose();
        assert!(bag.is_empty());
        assert_eq!(registry.listener_count("a"), 0);
        assert_eq!(registry.listener_count("b"), 0);
        assert_eq!(registry.connection_listener_count(), 0);
    }

    #[test]
    fn bag_releases_on_drop() {
        let registry = SubscriptionRegistry::new();
        {
            let mut bag = SubscriptionBag::new();
            bag.extend([registry.on_message("a", |_| {}), registry.on_message("a", |_| {})]);
            assert_eq!(registry.listener_count("a"), 2);
        }
        assert_eq!(registry.listener_count("a"), 0);
    }
}
