//! Session directory - which channel currently speaks for each node.

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::hub::ChannelId;

#[derive(Default)]
pub struct SessionDirectory {
    bindings: Mutex<HashMap<String, ChannelId>>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `node_id` to `channel`, silently replacing any previous binding.
    pub fn bind(&self, node_id: &str, channel: ChannelId) -> Option<ChannelId> {
        let previous = self.bindings.lock().insert(node_id.to_string(), channel);
        if let Some(old) = previous.filter(|old| *old != channel) {
            tracing::info!("Node '{}' moved from {} to {}", node_id, old, channel);
        }
        previous
    }

    pub fn lookup(&self, node_id: &str) -> Option<ChannelId> {
        self.bindings.lock().get(node_id).copied()
    }

    /// Drop the binding held by `channel` and return its node id.
    ///
    /// A channel that was replaced by a newer registration owns no binding,
    /// so closing it does not affect the node. `on_release` runs before the
    /// directory is unlocked, so a concurrent `bind` for the same node is
    /// ordered after it.
    pub fn release_channel<F>(&self, channel: ChannelId, on_release: F) -> Option<String>
    where
        F: FnOnce(&str),
    {
        let mut bindings = self.bindings.lock();
        let node_id = bindings
            .iter()
            .find(|(_, bound)| **bound == channel)
            .map(|(id, _)| id.clone())?;
        bindings.remove(&node_id);
        on_release(&node_id);
        Some(node_id)
    }

    pub fn len(&self) -> usize {
        self.bindings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
