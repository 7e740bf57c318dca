//! Lifecycle tracking for dispatched tasks.
//!
//! Every request, local or forwarded, gets a handle that moves through
//! `Pending -> Running -> Completed | Failed`. Finished handles are kept as a
//! short history so operators can list recent work.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Number of finished tasks retained for listing.
const HISTORY_LIMIT: usize = 64;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Completed { exit_code: Option<i32> },
    Failed { message: String },
}

impl TaskState {
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskState::Completed { .. } | TaskState::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TaskSnapshot {
    pub request_id: String,
    pub task_id: String,
    pub node_id: String,
    #[serde(flatten)]
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct TaskSupervisor {
    tasks: Mutex<HashMap<String, TaskSnapshot>>,
    handles: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, request_id: &str, task_id: &str, node_id: &str) {
        let now = Utc::now();
        self.tasks.lock().insert(
            request_id.to_string(),
            TaskSnapshot {
                request_id: request_id.to_string(),
                task_id: task_id.to_string(),
                node_id: node_id.to_string(),
                state: TaskState::Pending,
                created_at: now,
                updated_at: now,
            },
        );
    }

    /// Keep the join handle of a locally executing task.
    pub fn attach(&self, request_id: &str, handle: JoinHandle<()>) {
        let finished = self
            .tasks
            .lock()
            .get(request_id)
            .map_or(true, |t| t.state.is_finished());
        if !finished {
            self.handles.lock().insert(request_id.to_string(), handle);
        }
    }

    pub fn mark_running(&self, request_id: &str) {
        self.transition(request_id, TaskState::Running);
    }

    pub fn mark_completed(&self, request_id: &str, exit_code: Option<i32>) {
        self.transition(request_id, TaskState::Completed { exit_code });
    }

    pub fn mark_failed(&self, request_id: &str, message: impl Into<String>) {
        self.transition(
            request_id,
            TaskState::Failed {
                message: message.into(),
            },
        );
    }

    pub fn get(&self, request_id: &str) -> Option<TaskSnapshot> {
        self.tasks.lock().get(request_id).cloned()
    }

    /// All known tasks, oldest first.
    pub fn list(&self) -> Vec<TaskSnapshot> {
        let mut tasks: Vec<TaskSnapshot> = self.tasks.lock().values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Wait up to `timeout` for locally executing tasks to finish.
    ///
    /// Tasks are never killed; the count of those still running is returned.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        let handles: Vec<(String, JoinHandle<()>)> = self.handles.lock().drain().collect();
        if handles.is_empty() {
            return 0;
        }
        tracing::info!("Waiting for {} running task(s)", handles.len());

        let deadline = tokio::time::Instant::now() + timeout;
        let mut unfinished = 0;
        for (request_id, handle) in handles {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Task {} ended abnormally: {}", request_id, e),
                Err(_) => {
                    tracing::warn!("Task {} still running at shutdown", request_id);
                    unfinished += 1;
                }
            }
        }
        unfinished
    }

    fn transition(&self, request_id: &str, state: TaskState) {
        let finished = state.is_finished();
        {
            let mut tasks = self.tasks.lock();
            let Some(task) = tasks.get_mut(request_id) else {
                return;
            };
            if task.state.is_finished() {
                return;
            }
            task.state = state;
            task.updated_at = Utc::now();
            if finished {
                prune(&mut tasks);
            }
        }
        if finished {
            self.handles.lock().remove(request_id);
        }
    }
}

fn prune(tasks: &mut HashMap<String, TaskSnapshot>) {
    let mut finished: Vec<(DateTime<Utc>, String)> = tasks
        .values()
        .filter(|t| t.state.is_finished())
        .map(|t| (t.updated_at, t.request_id.clone()))
        .collect();
    if finished.len() <= HISTORY_LIMIT {
        return;
    }
    finished.sort();
    let excess = finished.len() - HISTORY_LIMIT;
    for (_, request_id) in finished.into_iter().take(excess) {
        tasks.remove(&request_id);
    }
}
