//! Controller context and event handlers.
//!
//! `Controller` owns every piece of shared state and is handed to the
//! transport as one `Arc`. Viewer requests that expect an acknowledgment
//! return `Result<Value>`; the transport turns `Err` into `{"error": ...}`.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::{CatalogEntry, TaskCatalog};
use crate::config::Settings;
use crate::engine::{Dispatch, TaskEngine, TaskSupervisor};
use crate::error::{Error, Result};
use crate::hub::{ChannelId, Fanout, Hub};
use crate::presence::PresenceSupervisor;
use crate::protocol::types::viewer;
use crate::protocol::{
    AssignNameRequest, AssignTaskRequest, Frame, LogMessage, RegisterPayload, RunTaskAck,
    RunTaskRequest, StatsReport, TaskEventPayload,
};
use crate::registry::{NodeSource, NodeUpdate, Registry, CONTROLLER_NODE_ID, IDLE};
use crate::relay::{CorrelationTable, SessionDirectory};
use crate::store::{OverrideStore, ASSIGNMENTS_FILE, LABELS_FILE};

const CONTROLLER_LABEL: &str = "Controller";

pub struct Controller {
    settings: Settings,
    catalog: Arc<TaskCatalog>,
    registry: Arc<Registry>,
    hub: Arc<Hub>,
    fanout: Fanout,
    sessions: Arc<SessionDirectory>,
    supervisor: Arc<TaskSupervisor>,
    engine: TaskEngine,
    presence: PresenceSupervisor,
}

impl Controller {
    /// Build a controller whose override stores live in the configured state directory.
    pub fn new(settings: Settings) -> Result<Self> {
        let state_dir = settings.server.resolved_state_dir()?;
        std::fs::create_dir_all(&state_dir)?;
        tracing::info!("Using state directory {}", state_dir.display());

        let labels = Arc::new(OverrideStore::open(state_dir.join(LABELS_FILE)));
        let assignments = Arc::new(OverrideStore::open(state_dir.join(ASSIGNMENTS_FILE)));
        Ok(Self::with_registry(
            settings,
            Arc::new(Registry::new(labels, assignments)),
        ))
    }

    pub fn with_registry(settings: Settings, registry: Arc<Registry>) -> Self {
        let catalog = Arc::new(settings.catalog());
        let hub = Arc::new(Hub::new());
        let fanout = Fanout::new(registry.clone(), hub.clone());
        let sessions = Arc::new(SessionDirectory::new());
        let correlations = Arc::new(CorrelationTable::new());
        let supervisor = Arc::new(TaskSupervisor::new());
        let engine = TaskEngine::new(
            catalog.clone(),
            registry.clone(),
            fanout.clone(),
            sessions.clone(),
            correlations.clone(),
            supervisor.clone(),
        );
        let presence = PresenceSupervisor::new(
            registry.clone(),
            sessions.clone(),
            correlations,
            supervisor.clone(),
            fanout.clone(),
        );

        registry.upsert(
            CONTROLLER_NODE_ID,
            NodeUpdate::new()
                .label(CONTROLLER_LABEL)
                .active_task(IDLE)
                .online(true)
                .source(NodeSource::Controller),
        );

        Self {
            settings,
            catalog,
            registry,
            hub,
            fanout,
            sessions,
            supervisor,
            engine,
            presence,
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn fanout(&self) -> &Fanout {
        &self.fanout
    }

    pub fn catalog_entries(&self) -> Vec<CatalogEntry> {
        self.catalog.entries()
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.settings.telemetry.sample_interval_secs.max(1))
    }

    /// Wait for running local tasks before exit.
    pub async fn shutdown(&self, timeout: Duration) {
        let unfinished = self.supervisor.shutdown(timeout).await;
        if unfinished > 0 {
            tracing::warn!("{} local task(s) still running at exit", unfinished);
        }
    }

    // Viewer events

    pub fn viewer_connected(&self, channel: ChannelId) {
        tracing::info!("Viewer connected on {}", channel);
        self.fanout.log(Some(channel), LogMessage::info("UI connected."));
        self.send_catalog(channel);
        self.fanout.broadcast_snapshot(Some(channel));
    }

    pub fn send_catalog(&self, channel: ChannelId) {
        self.hub.send(
            channel,
            Frame::with_payload(viewer::TASK_CATALOG, &self.catalog.entries()),
        );
    }

    pub fn run_task(&self, origin: ChannelId, request: RunTaskRequest) -> Result<Value> {
        let task_id = required(request.task, "Task id required.")?;
        let node_id = request
            .pi_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| CONTROLLER_NODE_ID.to_string());

        let ack = match self.engine.run_task(&task_id, &node_id, origin)? {
            Dispatch::Accepted { request_id } => {
                self.fanout.log(
                    Some(origin),
                    LogMessage::info(format!("Local task '{}' started.", task_id)),
                );
                RunTaskAck {
                    status: "accepted".to_string(),
                    request_id,
                    message: format!("Task '{}' running on controller.", task_id),
                }
            }
            Dispatch::Forwarded {
                request_id,
                node_id,
            } => {
                self.fanout.log(
                    Some(origin),
                    LogMessage::info(format!("Forwarded task '{}' to {}.", task_id, node_id)),
                );
                RunTaskAck {
                    status: "forwarded".to_string(),
                    request_id,
                    message: format!("Task '{}' forwarded to {}.", task_id, node_id),
                }
            }
        };
        Ok(serde_json::to_value(ack)?)
    }

    pub fn assign_task(&self, origin: ChannelId, request: AssignTaskRequest) -> Result<Value> {
        let reference = required(request.pi, "Machine reference is required.")?;
        let task = required(request.task, "Task label is required.")?;

        let (node_id, _) = self
            .registry
            .resolve_ref(&reference)
            .ok_or_else(|| Error::UnknownNode(reference.clone()))?;
        let updated = self
            .registry
            .set_assigned_task(&node_id, Some(&task))
            .ok_or_else(|| Error::UnknownNode(reference.clone()))?;
        self.fanout.broadcast_snapshot(None);

        let message = format!("Assigned '{}' to {}.", task, updated.label);
        tracing::info!("{}", message);
        self.fanout.log(Some(origin), LogMessage::info(message.clone()));
        Ok(json!({
            "status": "ok",
            "message": message,
            "pi_id": node_id,
            "task": updated.assigned_task,
        }))
    }

    pub fn assign_name(&self, origin: ChannelId, request: AssignNameRequest) -> Result<Value> {
        let reference = required(request.pi, "Machine reference is required.")?;
        let name = required(request.name, "New name is required.")?;

        let (node_id, previous) = self
            .registry
            .resolve_ref(&reference)
            .ok_or_else(|| Error::UnknownNode(reference.clone()))?;
        self.registry
            .set_label(&node_id, &name)
            .ok_or_else(|| Error::UnknownNode(reference.clone()))?;
        self.fanout.broadcast_snapshot(None);

        let message = format!("Renamed {} to '{}'.", previous.label, name);
        tracing::info!("{}", message);
        self.fanout.log(Some(origin), LogMessage::info(message.clone()));
        Ok(json!({
            "status": "ok",
            "message": message,
            "pi_id": node_id,
            "name": name,
        }))
    }

    // Agent events

    /// Bind the agent channel to its node. An empty node id is rejected and
    /// the caller closes the channel.
    pub fn register(&self, channel: ChannelId, payload: RegisterPayload) -> Result<()> {
        let node_id = payload.pi_id.trim().to_string();
        if node_id.is_empty() {
            return Err(Error::invalid("Pi id is required."));
        }

        self.sessions.bind(&node_id, channel);
        let mut update = NodeUpdate::new()
            .active_task(payload.active_task.unwrap_or_else(|| IDLE.to_string()))
            .online(true)
            .source(NodeSource::Pi);
        if let Some(label) = payload.label {
            update = update.label(label);
        }
        if let Some(total) = payload.ram_total_gb {
            update = update.ram_total_gb(total);
        }
        self.registry.upsert(&node_id, update);
        self.fanout.broadcast_snapshot(None);

        tracing::info!("Node '{}' registered on {}", node_id, channel);
        self.fanout.log(
            None,
            LogMessage::info(format!("Pi '{}' registered.", node_id)),
        );
        Ok(())
    }

    pub fn stats_report(&self, report: StatsReport) {
        let node_id = report.pi_id.trim();
        if node_id.is_empty() {
            tracing::debug!("Ignoring stats report without a node id");
            return;
        }

        let update = NodeUpdate {
            cpu_percent: report.cpu_percent,
            ram_percent: report.ram_percent,
            ram_used_gb: report.ram_used_gb,
            ram_total_gb: report.ram_total_gb,
            active_task: report.active_task,
            online: Some(true),
            source: Some(NodeSource::Pi),
            ..Default::default()
        };
        self.registry.upsert(node_id, update);
        self.fanout.broadcast_snapshot(None);
    }

    pub fn task_event(&self, event: &str, payload: TaskEventPayload) {
        self.engine.relay(event, payload);
    }

    pub fn channel_closed(&self, channel: ChannelId) {
        self.presence.channel_closed(channel);
    }
}

fn required(value: Option<String>, message: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::invalid(message))
}
