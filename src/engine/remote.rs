//! Forwarding tasks to agents and relaying their events back.

use crate::catalog::TaskSpec;
use crate::error::{Error, Result};
use crate::hub::ChannelId;
use crate::protocol::types::agent;
use crate::protocol::{ExecuteTask, Frame, TaskEvent, TaskEventPayload};
use crate::relay::CorrelationEntry;

use super::{new_request_id, TaskEngine};

impl TaskEngine {
    /// Send `task` to the agent bound to `node_id`.
    ///
    /// Fails with `NodeOffline` when no live session exists, in which case
    /// nothing is recorded.
    pub fn run_remote(&self, task: &TaskSpec, node_id: &str, origin: ChannelId) -> Result<String> {
        let channel = self
            .sessions
            .lookup(node_id)
            .ok_or_else(|| Error::NodeOffline(node_id.to_string()))?;

        let request_id = new_request_id();
        self.correlations.insert(
            &request_id,
            CorrelationEntry {
                origin,
                node_id: node_id.to_string(),
                task_id: task.id.clone(),
                label: task.label.clone(),
            },
        );

        let command = ExecuteTask {
            request_id: request_id.clone(),
            task_id: Some(task.id.clone()),
            command: task.command.clone(),
            label: Some(task.label.clone()),
        };
        if !self
            .fanout
            .hub()
            .send(channel, Frame::with_payload(agent::EXECUTE_TASK, &command))
        {
            self.correlations.remove(&request_id);
            tracing::warn!("Agent channel {} for '{}' closed before dispatch", channel, node_id);
            return Err(Error::NodeOffline(node_id.to_string()));
        }

        self.supervisor.register(&request_id, &task.id, node_id);
        self.set_activity(node_id, &task.label);
        tracing::info!("Forwarded '{}' to {} as {}", task.id, node_id, request_id);
        Ok(request_id)
    }

    /// Route an agent's `task_*` event to the viewer that requested it.
    ///
    /// Returns false when the event is unknown or its request is not (or no
    /// longer) pending.
    pub fn relay(&self, event: &str, payload: TaskEventPayload) -> bool {
        let Some(event) = TaskEvent::from_wire(event, &payload) else {
            return false;
        };
        if payload.request_id.is_empty() {
            return false;
        }

        let terminal = event.is_terminal();
        let Some(entry) = self.correlations.resolve(&payload.request_id, terminal) else {
            tracing::debug!(
                "No pending request {} for {}, dropping",
                payload.request_id,
                event.name()
            );
            return false;
        };

        let task_id = non_empty(payload.task_id).unwrap_or_else(|| entry.task_id.clone());
        let node_id = non_empty(payload.pi_id).unwrap_or_else(|| entry.node_id.clone());

        let event = match event {
            TaskEvent::Started { label: None } => TaskEvent::Started {
                label: Some(entry.label.clone()),
            },
            other => other,
        };
        match &event {
            TaskEvent::Started { .. } => self.supervisor.mark_running(&payload.request_id),
            TaskEvent::Finished { exit_code } => {
                self.supervisor.mark_completed(&payload.request_id, *exit_code)
            }
            TaskEvent::Error { message, .. } => {
                self.supervisor.mark_failed(&payload.request_id, message.clone())
            }
            TaskEvent::Output { .. } => {}
        }

        self.emit(entry.origin, &payload.request_id, &task_id, &node_id, event);

        if terminal {
            self.set_idle(&entry.node_id);
        }
        true
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
