use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
};

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::ExpressManagerState;

/// Trait for state listeners
#[async_trait::async_trait]
pub trait ExpressManagerListener: Send + Sync {
    /// Called every time the manager writes a new state
    async fn on_state(&self, state: ExpressManagerState);
}

/// Publisher of the states written by the manager
pub struct StateEmitter {
    listener_index: AtomicU64,
    listeners: RwLock<BTreeMap<String, Box<dyn ExpressManagerListener>>>,
}

impl StateEmitter {
    pub fn new() -> Self {
        Self {
            listener_index: AtomicU64::new(0),
            listeners: RwLock::new(BTreeMap::new()),
        }
    }

    /// Add a listener to receive states
    ///
    /// Returns a unique identifier for the listener, which can be used to remove it later
    pub async fn add_listener(&self, listener: Box<dyn ExpressManagerListener>) -> String {
        let index = self.listener_index.fetch_add(1, Ordering::Relaxed);
        // Zero padded so the map iterates in registration order
        let id = format!("listener_{index:020}-{}", Uuid::new_v4());
        let mut listeners = self.listeners.write().await;
        listeners.insert(id.clone(), listener);
        id
    }

    /// Remove a listener by its ID, returning `true` if it was registered
    pub async fn remove_listener(&self, id: &str) -> bool {
        let mut listeners = self.listeners.write().await;
        listeners.remove(id).is_some()
    }

    pub async fn emit(&self, state: &ExpressManagerState) {
        let listeners = self.listeners.read().await;
        for listener in listeners.values() {
            listener.on_state(state.clone()).await;
        }
    }
}

impl Default for StateEmitter {
    fn default() -> Self {
        Self::new()
    }
}
