//! Subscriber types for the store.
//!
//! A subscriber is whatever the reactive layer wants told when an entry it
//! rendered from changes: a component, a test probe, a logger.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

use parking_lot::Mutex;

use super::store::StoreState;
use crate::graph::EntryKey;

/// Unique identifier for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a registered listener.
///
/// Dropping this handle unsubscribes the listener. The handle does not keep
/// the store alive.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: SubscriberId,
    key: EntryKey,
    state: Weak<Mutex<StoreState>>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, key: EntryKey, state: Weak<Mutex<StoreState>>) -> Self {
        Self { id, key, state }
    }

    /// The id this subscription was registered under.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// The entry this subscription listens to.
    pub fn key(&self) -> EntryKey {
        self.key
    }

    /// Unsubscribe now. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        // The listener may own other subscriptions; release it after the
        // lock so their drops can lock in turn.
        let listener = state
            .lock()
            .graph
            .get_node_mut(self.key)
            .and_then(|node| node.remove_listener(self.id));
        drop(listener);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish()
    }
}
