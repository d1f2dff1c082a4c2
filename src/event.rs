//! Change notification channel.
//!
//! Every loader owns one [`ChangeEmitter`]. Observers receive a [`Subscription`]
//! that removes the listener when disposed or dropped.

use std::sync::{
    Arc,
    Mutex,
    MutexGuard,
    PoisonError,
    Weak,
};

/// Callback invoked with the tag of the source that changed.
type Listener = Arc<dyn Fn(&str) + Send + Sync>;

/// Listener storage shared between an emitter and its subscriptions.
#[derive(Default)]
struct Registry {
    /// Id handed to the next subscription
    next_id: u64,
    /// Active listeners in subscription order
    listeners: Vec<(u64, Listener)>,
}

/// Broadcasts change events to subscribed listeners.
///
/// Clones share the same listener set.
#[derive(Clone, Default)]
pub struct ChangeEmitter {
    /// Shared listener registry
    registry: Arc<Mutex<Registry>>,
}

impl ChangeEmitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener`; it stays active while the returned subscription lives.
    #[must_use = "dropping the subscription unsubscribes the listener"]
    pub fn subscribe(&self, listener: impl Fn(&str) + Send + Sync + 'static) -> Subscription {
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(listener)));
        Subscription { registry: Arc::downgrade(&self.registry), id }
    }

    /// Notifies every listener.
    ///
    /// Listeners run after the registry lock is released, so they may subscribe,
    /// unsubscribe or fire again.
    pub fn fire(&self, source: &str) {
        let listeners: Vec<Listener> =
            lock(&self.registry).listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            listener(source);
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.registry).listeners.len()
    }
}

impl std::fmt::Debug for ChangeEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeEmitter").field("listeners", &self.listener_count()).finish()
    }
}

/// Keeps a listener registered. Released on [`Subscription::dispose`] or drop.
#[derive(Debug)]
pub struct Subscription {
    /// Registry of the emitter this subscription belongs to
    registry: Weak<Mutex<Registry>>,
    /// Listener id within the registry
    id: u64,
}

impl Subscription {
    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("next_id", &self.next_id)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Locks the registry, recovering from a poisoned lock.
fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}
