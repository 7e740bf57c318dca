//! Request correlation table.
//!
//! Maps a remote request id to the viewer that asked for it. An entry is
//! created once when a command is forwarded and consumed by the first
//! terminal event for that id; anything arriving afterwards finds nothing.

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::hub::ChannelId;

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationEntry {
    pub origin: ChannelId,
    pub node_id: String,
    pub task_id: String,
    pub label: String,
}

#[derive(Default)]
pub struct CorrelationTable {
    entries: Mutex<HashMap<String, CorrelationEntry>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new entry. Returns false if the id is already in use.
    pub fn insert(&self, request_id: &str, entry: CorrelationEntry) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(request_id) {
            return false;
        }
        entries.insert(request_id.to_string(), entry);
        true
    }

    /// Look up an entry for a non-terminal event, or consume it for a terminal one.
    pub fn resolve(&self, request_id: &str, terminal: bool) -> Option<CorrelationEntry> {
        let mut entries = self.entries.lock();
        if terminal {
            entries.remove(request_id)
        } else {
            entries.get(request_id).cloned()
        }
    }

    pub fn remove(&self, request_id: &str) -> Option<CorrelationEntry> {
        self.entries.lock().remove(request_id)
    }

    /// Request ids still waiting on `node_id`.
    pub fn pending_for_node(&self, node_id: &str) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, entry)| entry.node_id == node_id)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
