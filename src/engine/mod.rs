//! Task execution engine.
//!
//! Runs catalog commands on the controller itself or forwards them to the
//! node that should run them, and relays the resulting lifecycle events back
//! to the viewer that asked.

pub mod local;
pub mod remote;
pub mod runner;
pub mod supervisor;

use std::sync::Arc;

use crate::catalog::TaskCatalog;
use crate::error::{Error, Result};
use crate::hub::{ChannelId, Fanout};
use crate::protocol::{Frame, TaskEvent};
use crate::registry::{NodeSource, NodeUpdate, Registry, CONTROLLER_NODE_ID, IDLE};
use crate::relay::{CorrelationTable, SessionDirectory};

pub use runner::{run_streaming, CommandOutcome};
pub use supervisor::{TaskSnapshot, TaskState, TaskSupervisor};

/// How a `run_task` request was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Running on the controller.
    Accepted { request_id: String },
    /// Sent to an agent.
    Forwarded { request_id: String, node_id: String },
}

impl Dispatch {
    pub fn request_id(&self) -> &str {
        match self {
            Dispatch::Accepted { request_id } | Dispatch::Forwarded { request_id, .. } => {
                request_id
            }
        }
    }
}

#[derive(Clone)]
pub struct TaskEngine {
    catalog: Arc<TaskCatalog>,
    registry: Arc<Registry>,
    fanout: Fanout,
    sessions: Arc<SessionDirectory>,
    correlations: Arc<CorrelationTable>,
    supervisor: Arc<TaskSupervisor>,
}

impl TaskEngine {
    pub fn new(
        catalog: Arc<TaskCatalog>,
        registry: Arc<Registry>,
        fanout: Fanout,
        sessions: Arc<SessionDirectory>,
        correlations: Arc<CorrelationTable>,
        supervisor: Arc<TaskSupervisor>,
    ) -> Self {
        Self {
            catalog,
            registry,
            fanout,
            sessions,
            correlations,
            supervisor,
        }
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    /// Route a catalog task to the controller or to the node `node_id`.
    pub fn run_task(&self, task_id: &str, node_id: &str, origin: ChannelId) -> Result<Dispatch> {
        let task = self
            .catalog
            .get(task_id)
            .cloned()
            .ok_or_else(|| Error::UnknownTask(task_id.to_string()))?;

        if node_id.is_empty() || node_id == CONTROLLER_NODE_ID {
            let request_id = self.run_local(task, origin);
            Ok(Dispatch::Accepted { request_id })
        } else {
            let request_id = self.run_remote(&task, node_id, origin)?;
            Ok(Dispatch::Forwarded {
                request_id,
                node_id: node_id.to_string(),
            })
        }
    }

    /// Send one lifecycle event to the viewer that started the request.
    fn emit(&self, origin: ChannelId, request_id: &str, task_id: &str, node_id: &str, event: TaskEvent) {
        let name = event.name();
        let payload = event.into_payload(request_id, task_id, node_id);
        if !self.fanout.hub().send(origin, Frame::with_payload(name, &payload)) {
            tracing::debug!("Viewer {} gone, dropping {} for {}", origin, name, request_id);
        }
    }

    fn set_activity(&self, node_id: &str, activity: &str) {
        let mut update = NodeUpdate::new().active_task(activity);
        if node_id == CONTROLLER_NODE_ID {
            update = update.source(NodeSource::Controller);
        }
        self.registry.upsert(node_id, update);
        self.fanout.broadcast_snapshot(None);
    }

    fn set_idle(&self, node_id: &str) {
        self.set_activity(node_id, IDLE);
    }
}

pub(crate) fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::catalog::TaskSpec;
    use crate::hub::Hub;

    pub struct Fixture {
        pub engine: TaskEngine,
        pub registry: Arc<Registry>,
        pub hub: Arc<Hub>,
        pub sessions: Arc<SessionDirectory>,
        pub correlations: Arc<CorrelationTable>,
        pub supervisor: Arc<TaskSupervisor>,
    }

    pub fn fixture() -> Fixture {
        let catalog = Arc::new(TaskCatalog::new(vec![
            TaskSpec::new("echo", "Echo", "", &["sh", "-c", "echo hello; echo world"]),
            TaskSpec::new("fail", "Fail", "", &["sh", "-c", "echo bye; exit 4"]),
            TaskSpec::new("missing", "Missing", "", &["pistat-definitely-missing-binary"]),
        ]));
        let registry = Arc::new(Registry::in_memory());
        let hub = Arc::new(Hub::new());
        let sessions = Arc::new(SessionDirectory::new());
        let correlations = Arc::new(CorrelationTable::new());
        let supervisor = Arc::new(TaskSupervisor::new());
        let engine = TaskEngine::new(
            catalog,
            registry.clone(),
            Fanout::new(registry.clone(), hub.clone()),
            sessions.clone(),
            correlations.clone(),
            supervisor.clone(),
        );
        Fixture {
            engine,
            registry,
            hub,
            sessions,
            correlations,
            supervisor,
        }
    }
}
