//! Node record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved id of the controller's own synthetic node.
pub const CONTROLLER_NODE_ID: &str = "local";

pub const IDLE: &str = "Idle";
pub const OFFLINE: &str = "Offline";

/// Where the latest data for a node came from.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeSource {
    Controller,
    Pi,
    #[default]
    Unknown,
}

impl std::fmt::Display for NodeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeSource::Controller => write!(f, "controller"),
            NodeSource::Pi => write!(f, "pi"),
            NodeSource::Unknown => write!(f, "unknown"),
        }
    }
}

/// Resolved, independent copy of one node as seen by viewers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NodeRecord {
    pub pi_id: String,
    pub label: String,
    pub ram_total_gb: f64,
    pub cpu_percent: f64,
    pub ram_percent: f64,
    pub ram_used_gb: f64,
    pub active_task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_task: Option<String>,
    pub online: bool,
    pub last_seen: DateTime<Utc>,
    pub source: NodeSource,
}

/// Partial update merged into a node by `Registry::upsert`.
///
/// Only fields that are `Some` are applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeUpdate {
    pub label: Option<String>,
    pub ram_total_gb: Option<f64>,
    pub cpu_percent: Option<f64>,
    pub ram_percent: Option<f64>,
    pub ram_used_gb: Option<f64>,
    pub active_task: Option<String>,
    pub online: Option<bool>,
    pub source: Option<NodeSource>,
}

impl NodeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn active_task(mut self, task: impl Into<String>) -> Self {
        self.active_task = Some(task.into());
        self
    }

    pub fn online(mut self, online: bool) -> Self {
        self.online = Some(online);
        self
    }

    pub fn source(mut self, source: NodeSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn ram_total_gb(mut self, value: f64) -> Self {
        self.ram_total_gb = Some(value);
        self
    }

    pub fn usage(mut self, cpu_percent: f64, ram_percent: f64, ram_used_gb: f64) -> Self {
        self.cpu_percent = Some(cpu_percent);
        self.ram_percent = Some(ram_percent);
        self.ram_used_gb = Some(ram_used_gb);
        self
    }
}

/// Cached per-node state held inside the registry.
///
/// Operator overrides are not stored here; they are resolved at read time.
#[derive(Debug, Clone)]
pub(crate) struct NodeEntry {
    pub id: String,
    pub reported_label: Option<String>,
    pub ram_total_gb: f64,
    pub cpu_percent: f64,
    pub ram_percent: f64,
    pub ram_used_gb: f64,
    pub active_task: String,
    pub online: bool,
    pub last_seen: DateTime<Utc>,
    pub source: NodeSource,
}

impl NodeEntry {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            reported_label: None,
            ram_total_gb: 0.0,
            cpu_percent: 0.0,
            ram_percent: 0.0,
            ram_used_gb: 0.0,
            active_task: IDLE.to_string(),
            online: true,
            last_seen: Utc::now(),
            source: NodeSource::Unknown,
        }
    }

    pub fn apply(&mut self, update: NodeUpdate) {
        if let Some(label) = update.label.filter(|l| !l.trim().is_empty()) {
            self.reported_label = Some(label);
        }
        if let Some(v) = update.ram_total_gb {
            self.ram_total_gb = v;
        }
        if let Some(v) = update.cpu_percent {
            self.cpu_percent = v;
        }
        if let Some(v) = update.ram_percent {
            self.ram_percent = v;
        }
        if let Some(v) = update.ram_used_gb {
            self.ram_used_gb = v;
        }
        if let Some(task) = update.active_task.filter(|t| !t.is_empty()) {
            self.active_task = task;
        }
        if let Some(online) = update.online {
            self.online = online;
        }
        if let Some(source) = update.source {
            self.source = source;
        }
        self.last_seen = Utc::now();
    }

    pub fn default_label(&self) -> String {
        format!("PI {}", self.id)
    }
}
