//! Per-tick action aggregation across all live sessions.
//!
//! The registry is the only structure session tasks write concurrently
//! (besides the broadcaster's subscriber set); the server shares it as
//! `Arc<RwLock<ActionRegistry>>` and the tick loop consumes it with
//! [`ActionRegistry::to_batch`] + [`ActionRegistry::clear`] under a single
//! write guard, exactly once per tick.

use log::info;
use shared::{Action, ProtocolError};
use std::collections::HashMap;

/// Maps each connected client to its most recent action for the current
/// tick window. At most one entry per live client.
#[derive(Debug, Default)]
pub struct ActionRegistry {
    actions: HashMap<u32, Action>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Records a client's action, overwriting any earlier submission in the
    /// same tick window. Last write wins; no ordering across clients.
    pub fn merge(&mut self, client_id: u32, action: Action) {
        self.actions.insert(client_id, action);
    }

    /// True if the client has submitted an action this tick window.
    pub fn contains(&self, client_id: u32) -> bool {
        self.actions.contains_key(&client_id)
    }

    /// Looks up a client's pending action.
    pub fn get(&self, client_id: u32) -> Result<Action, ProtocolError> {
        self.actions
            .get(&client_id)
            .copied()
            .ok_or(ProtocolError::UnknownClient(client_id))
    }

    /// The accumulated actions as (client id, action) pairs, ordered by
    /// client id so the encoded batch layout is deterministic.
    pub fn to_batch(&self) -> Vec<(u32, Action)> {
        let mut batch: Vec<(u32, Action)> = self
            .actions
            .iter()
            .map(|(id, action)| (*id, *action))
            .collect();
        batch.sort_by_key(|(id, _)| *id);
        batch
    }

    /// Bulk removal of every entry. The only operation that empties the
    /// registry; called once per tick after the batch is consumed.
    pub fn clear(&mut self) {
        self.actions.clear();
    }

    /// Drops one client's entry. Disconnect/eviction path only.
    pub fn remove(&mut self, client_id: u32) -> bool {
        if self.actions.remove(&client_id).is_some() {
            info!("dropped pending action for client {}", client_id);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
