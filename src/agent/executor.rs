//! Agent-side execution of `execute_task` requests.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::engine::run_streaming;
use crate::protocol::{ExecuteTask, Frame, TaskEvent};
use crate::registry::IDLE;

/// Current activity reported in `register` and `stats_report`.
#[derive(Clone)]
pub struct Activity(Arc<Mutex<String>>);

impl Activity {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(IDLE.to_string())))
    }

    pub fn get(&self) -> String {
        self.0.lock().clone()
    }

    fn set(&self, value: &str) {
        *self.0.lock() = value.to_string();
    }
}

impl Default for Activity {
    fn default() -> Self {
        Self::new()
    }
}

/// Tags lifecycle events for one request and queues them for the controller.
struct Emitter {
    tx: mpsc::UnboundedSender<Frame>,
    request_id: String,
    task_id: String,
    node_id: String,
}

impl Emitter {
    fn emit(&self, event: TaskEvent) {
        let name = event.name();
        let payload = event.into_payload(&self.request_id, &self.task_id, &self.node_id);
        if self.tx.send(Frame::with_payload(name, &payload)).is_err() {
            tracing::debug!("Agent stopped, dropping {} for {}", name, self.request_id);
        }
    }
}

/// Run one forwarded task to completion, streaming its events into `tx`.
///
/// Always ends with `task_finished`; failures emit `task_error` first.
pub async fn execute(
    job: ExecuteTask,
    node_id: String,
    activity: Activity,
    tx: mpsc::UnboundedSender<Frame>,
) {
    let task_id = job.task_id.clone().unwrap_or_default();
    let label = job
        .label
        .clone()
        .filter(|l| !l.is_empty())
        .or_else(|| job.task_id.clone())
        .unwrap_or_else(|| "task".to_string());
    let emitter = Emitter {
        tx,
        request_id: job.request_id.clone(),
        task_id: if task_id.is_empty() { label.clone() } else { task_id },
        node_id,
    };

    tracing::info!("Running task {}: {}", job.request_id, job.command.join(" "));
    activity.set(&label);
    emitter.emit(TaskEvent::Started {
        label: Some(label.clone()),
    });

    let outcome = run_streaming(&job.command, |line| emitter.emit(TaskEvent::Output { line })).await;

    if let Some(message) = outcome.error {
        tracing::warn!("Task {} failed: {}", job.request_id, message);
        emitter.emit(TaskEvent::failed(message));
    } else {
        tracing::info!("Task {} exited with {}", job.request_id, outcome.exit_code);
    }
    emitter.emit(TaskEvent::Finished {
        exit_code: Some(outcome.exit_code),
    });
    activity.set(IDLE);
}
