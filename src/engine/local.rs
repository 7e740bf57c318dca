//! Tasks executed on the controller host.

use crate::catalog::TaskSpec;
use crate::hub::ChannelId;
use crate::protocol::TaskEvent;
use crate::registry::CONTROLLER_NODE_ID;

use super::runner::run_streaming;
use super::{new_request_id, TaskEngine};

impl TaskEngine {
    /// Start `task` on the controller and return its request id.
    ///
    /// The command runs on its own tokio task; events go to `origin` only.
    pub fn run_local(&self, task: TaskSpec, origin: ChannelId) -> String {
        let request_id = new_request_id();
        self.supervisor
            .register(&request_id, &task.id, CONTROLLER_NODE_ID);

        let engine = self.clone();
        let id = request_id.clone();
        let handle = tokio::spawn(async move {
            engine.execute_local(&id, &task, origin).await;
        });
        self.supervisor.attach(&request_id, handle);
        request_id
    }

    async fn execute_local(&self, request_id: &str, task: &TaskSpec, origin: ChannelId) {
        tracing::info!("Running '{}' locally as {}", task.id, request_id);
        self.supervisor.mark_running(request_id);
        self.set_activity(CONTROLLER_NODE_ID, &task.label);

        self.emit(
            origin,
            request_id,
            &task.id,
            CONTROLLER_NODE_ID,
            TaskEvent::Started {
                label: Some(task.label.clone()),
            },
        );

        let outcome = run_streaming(&task.command, |line| {
            self.emit(
                origin,
                request_id,
                &task.id,
                CONTROLLER_NODE_ID,
                TaskEvent::Output { line },
            );
        })
        .await;

        self.set_idle(CONTROLLER_NODE_ID);

        match outcome.error {
            Some(message) => {
                tracing::warn!("Local task {} failed: {}", request_id, message);
                self.supervisor.mark_failed(request_id, message.clone());
                self.emit(
                    origin,
                    request_id,
                    &task.id,
                    CONTROLLER_NODE_ID,
                    TaskEvent::failed(message),
                );
            }
            None => {
                tracing::info!("Local task {} exited with {}", request_id, outcome.exit_code);
                self.supervisor.mark_completed(request_id, Some(outcome.exit_code));
            }
        }

        self.emit(
            origin,
            request_id,
            &task.id,
            CONTROLLER_NODE_ID,
            TaskEvent::Finished {
                exit_code: Some(outcome.exit_code),
            },
        );
    }
}
