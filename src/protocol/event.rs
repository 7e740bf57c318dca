//! Task lifecycle events.
//!
//! A request produces `Started`, zero or more `Output`, and then a terminal
//! event. Failures are reported as `Error` followed by `Finished`; the first
//! terminal event seen closes the request.

use super::types::{task, TaskEventPayload};

/// Exit code reported when a command could not be run to completion.
pub const FAILED_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Started { label: Option<String> },
    Output { line: String },
    /// `None` when an agent reported no exit code.
    Finished { exit_code: Option<i32> },
    Error { message: String, exit_code: i32 },
}

impl TaskEvent {
    pub fn failed(message: impl Into<String>) -> Self {
        TaskEvent::Error {
            message: message.into(),
            exit_code: FAILED_EXIT_CODE,
        }
    }

    /// Wire event name.
    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::Started { .. } => task::STARTED,
            TaskEvent::Output { .. } => task::OUTPUT,
            TaskEvent::Finished { .. } => task::FINISHED,
            TaskEvent::Error { .. } => task::ERROR,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskEvent::Finished { .. } | TaskEvent::Error { .. })
    }

    /// Tag the event with its request and build the wire payload.
    pub fn into_payload(self, request_id: &str, task_id: &str, pi_id: &str) -> TaskEventPayload {
        let mut payload = TaskEventPayload {
            request_id: request_id.to_string(),
            task_id: Some(task_id.to_string()),
            pi_id: Some(pi_id.to_string()),
            ..Default::default()
        };
        match self {
            TaskEvent::Started { label } => payload.label = label,
            TaskEvent::Output { line } => payload.line = Some(line),
            TaskEvent::Finished { exit_code } => payload.exit_code = exit_code,
            TaskEvent::Error { message, exit_code } => {
                payload.error = Some(message);
                payload.exit_code = Some(exit_code);
            }
        }
        payload
    }

    /// Rebuild an event from its wire name and payload.
    ///
    /// A missing line becomes empty and a missing error code becomes the
    /// failure exit code. A finished event keeps whatever code it carried.
    pub fn from_wire(event: &str, payload: &TaskEventPayload) -> Option<Self> {
        let event = match event {
            task::STARTED => TaskEvent::Started {
                label: payload.label.clone(),
            },
            task::OUTPUT => TaskEvent::Output {
                line: payload.line.clone().unwrap_or_default(),
            },
            task::FINISHED => TaskEvent::Finished {
                exit_code: payload.exit_code,
            },
            task::ERROR => TaskEvent::Error {
                message: payload.error.clone().unwrap_or_default(),
                exit_code: payload.exit_code.unwrap_or(FAILED_EXIT_CODE),
            },
            _ => return None,
        };
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(!TaskEvent::Started { label: None }.is_terminal());
        assert!(!TaskEvent::Output { line: "x".into() }.is_terminal());
        assert!(TaskEvent::Finished { exit_code: Some(0) }.is_terminal());
        assert!(TaskEvent::failed("boom").is_terminal());
    }

    #[test]
    fn test_error_payload_carries_message_and_code() {
        let payload = TaskEvent::failed("Executable not found.").into_payload("r1", "uptime", "local");
        assert_eq!(payload.error.as_deref(), Some("Executable not found."));
        assert_eq!(payload.exit_code, Some(FAILED_EXIT_CODE));
        assert!(payload.line.is_none());
    }

    #[test]
    fn test_from_wire_rejects_unknown_names() {
        let payload = TaskEventPayload::default();
        assert!(TaskEvent::from_wire("terminal_output", &payload).is_none());
        assert_eq!(
            TaskEvent::from_wire(task::FINISHED, &payload),
            Some(TaskEvent::Finished { exit_code: None })
        );
    }
}
