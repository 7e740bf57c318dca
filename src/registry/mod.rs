//! Node registry - merged view of live telemetry and operator overrides.
//!
//! Every read resolves the display label and the task assignment through the
//! override stores, so the stores (not the cached entries) are authoritative
//! for naming and assignment.

pub mod node;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::store::{Override, OverrideStore};

pub use node::{NodeRecord, NodeSource, NodeUpdate, CONTROLLER_NODE_ID, IDLE, OFFLINE};
use node::NodeEntry;

/// Entries in first-seen order plus an id index.
#[derive(Default)]
struct NodeTable {
    entries: Vec<NodeEntry>,
    index: HashMap<String, usize>,
}

impl NodeTable {
    fn get(&self, id: &str) -> Option<&NodeEntry> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut NodeEntry> {
        match self.index.get(id) {
            Some(&i) => Some(&mut self.entries[i]),
            None => None,
        }
    }

    fn get_or_insert(&mut self, id: &str) -> &mut NodeEntry {
        let i = match self.index.get(id) {
            Some(&i) => i,
            None => {
                self.entries.push(NodeEntry::new(id));
                let i = self.entries.len() - 1;
                self.index.insert(id.to_string(), i);
                i
            }
        };
        &mut self.entries[i]
    }
}

pub struct Registry {
    nodes: Mutex<NodeTable>,
    labels: Arc<OverrideStore>,
    assignments: Arc<OverrideStore>,
}

impl Registry {
    pub fn new(labels: Arc<OverrideStore>, assignments: Arc<OverrideStore>) -> Self {
        Self {
            nodes: Mutex::new(NodeTable::default()),
            labels,
            assignments,
        }
    }

    /// Registry backed by throwaway in-memory stores.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(OverrideStore::in_memory()),
            Arc::new(OverrideStore::in_memory()),
        )
    }

    pub fn labels(&self) -> &OverrideStore {
        &self.labels
    }

    pub fn assignments(&self) -> &OverrideStore {
        &self.assignments
    }

    /// Merge the present fields of `update` into the node, creating it if needed.
    pub fn upsert(&self, id: &str, update: NodeUpdate) -> NodeRecord {
        let mut nodes = self.nodes.lock();
        let entry = nodes.get_or_insert(id);
        entry.apply(update);
        self.resolve(entry)
    }

    /// Set or clear the operator task assignment for a known node.
    ///
    /// Blank input clears the assignment. Returns `None` for unknown ids, in
    /// which case nothing is written.
    pub fn set_assigned_task(&self, id: &str, task: Option<&str>) -> Option<NodeRecord> {
        if !self.contains(id) {
            return None;
        }

        match normalize(task) {
            Some(value) => self.assignments.set(id, &value),
            None => self.assignments.clear(id),
        }

        let mut nodes = self.nodes.lock();
        let entry = nodes.get_mut(id)?;
        entry.last_seen = chrono::Utc::now();
        Some(self.resolve(entry))
    }

    /// Set the operator display label for a known node.
    pub fn set_label(&self, id: &str, label: &str) -> Option<NodeRecord> {
        let label = normalize(Some(label))?;
        if !self.contains(id) {
            return None;
        }

        self.labels.set(id, &label);
        Some(self.upsert(id, NodeUpdate::new().label(label)))
    }

    pub fn mark_offline(&self, id: &str) -> Option<NodeRecord> {
        let mut nodes = self.nodes.lock();
        let entry = nodes.get_mut(id)?;
        entry.online = false;
        entry.active_task = OFFLINE.to_string();
        entry.last_seen = chrono::Utc::now();
        Some(self.resolve(entry))
    }

    pub fn get(&self, id: &str) -> Option<NodeRecord> {
        let nodes = self.nodes.lock();
        nodes.get(id).map(|entry| self.resolve(entry))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.lock().index.contains_key(id)
    }

    /// Fleet snapshot in first-seen order, without the controller's own node.
    pub fn snapshot(&self) -> Vec<NodeRecord> {
        let nodes = self.nodes.lock();
        nodes
            .entries
            .iter()
            .filter(|entry| entry.id != CONTROLLER_NODE_ID)
            .map(|entry| self.resolve(entry))
            .collect()
    }

    /// Resolve an operator supplied reference to a node id.
    ///
    /// An exact id always wins. Otherwise the first node, in first-seen order,
    /// whose resolved label matches case-insensitively is returned.
    pub fn resolve_ref(&self, reference: &str) -> Option<(String, NodeRecord)> {
        if reference.is_empty() {
            return None;
        }

        let nodes = self.nodes.lock();
        if let Some(entry) = nodes.get(reference) {
            return Some((entry.id.clone(), self.resolve(entry)));
        }

        let wanted = reference.to_lowercase();
        nodes.entries.iter().find_map(|entry| {
            let record = self.resolve(entry);
            (record.label.to_lowercase() == wanted).then(|| (entry.id.clone(), record))
        })
    }

    fn resolve(&self, entry: &NodeEntry) -> NodeRecord {
        let label = match self.labels.resolve(&entry.id) {
            Override::Set(label) => label,
            Override::Inherit | Override::Cleared => entry
                .reported_label
                .clone()
                .unwrap_or_else(|| entry.default_label()),
        };
        let assigned_task = self.assignments.resolve(&entry.id).value().map(str::to_string);

        NodeRecord {
            pi_id: entry.id.clone(),
            label,
            ram_total_gb: entry.ram_total_gb,
            cpu_percent: entry.cpu_percent,
            ram_percent: entry.ram_percent,
            ram_used_gb: entry.ram_used_gb,
            active_task: entry.active_task.clone(),
            assigned_task,
            online: entry.online,
            last_seen: entry.last_seen,
            source: entry.source,
        }
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}
