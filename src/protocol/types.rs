//! Typed payloads for viewer and agent events.

use serde::{Deserialize, Serialize};

/// Viewer-facing event names.
pub mod viewer {
    pub const RUN_TASK: &str = "run_task";
    pub const ASSIGN_TASK: &str = "assign_task";
    pub const ASSIGN_NAME: &str = "assign_name";
    pub const CATALOG_REQUEST: &str = "catalog:request";

    pub const STATS_SNAPSHOT: &str = "stats_snapshot";
    pub const TASK_CATALOG: &str = "task_catalog";
    pub const LOG: &str = "log";
}

/// Agent-facing event names.
pub mod agent {
    pub const REGISTER: &str = "register";
    pub const STATS_REPORT: &str = "stats_report";
    pub const EXECUTE_TASK: &str = "execute_task";
}

/// Task lifecycle event names, shared by both channel groups.
pub mod task {
    pub const STARTED: &str = "task_started";
    pub const OUTPUT: &str = "task_output";
    pub const FINISHED: &str = "task_finished";
    pub const ERROR: &str = "task_error";
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RunTaskRequest {
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub pi_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AssignTaskRequest {
    #[serde(default)]
    pub pi: Option<String>,
    #[serde(default)]
    pub task: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AssignNameRequest {
    #[serde(default)]
    pub pi: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Severity of a `log` push.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogMessage {
    pub level: LogLevel,
    pub message: String,
}

impl LogMessage {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Warning,
            message: message.into(),
        }
    }
}

/// Sent by an agent when it connects.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RegisterPayload {
    #[serde(default)]
    pub pi_id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub ram_total_gb: Option<f64>,
    #[serde(default)]
    pub active_task: Option<String>,
}

/// Periodic agent telemetry.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StatsReport {
    #[serde(default)]
    pub pi_id: String,
    #[serde(default)]
    pub cpu_percent: Option<f64>,
    #[serde(default)]
    pub ram_percent: Option<f64>,
    #[serde(default)]
    pub ram_used_gb: Option<f64>,
    #[serde(default)]
    pub ram_total_gb: Option<f64>,
    #[serde(default)]
    pub active_task: Option<String>,
}

/// Controller to agent command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecuteTask {
    pub request_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub label: Option<String>,
}

/// Body of every `task_*` event in either direction.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TaskEventPayload {
    pub request_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub pi_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Acknowledgment for `run_task`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunTaskAck {
    pub status: String,
    pub request_id: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_report_tolerates_missing_fields() {
        let report: StatsReport =
            serde_json::from_str(r#"{"pi_id":"rpi-07","cpu_percent":12.5}"#).unwrap();
        assert_eq!(report.cpu_percent, Some(12.5));
        assert_eq!(report.ram_percent, None);
    }

    #[test]
    fn test_task_event_payload_omits_unused_fields() {
        let payload = TaskEventPayload {
            request_id: "r1".to_string(),
            task_id: Some("uptime".to_string()),
            pi_id: Some("local".to_string()),
            line: Some("up 3 days".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["line"], "up 3 days");
        assert!(json.get("exit_code").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_log_level_wire_names() {
        let json = serde_json::to_value(LogMessage::warning("Pi 'x' disconnected.")).unwrap();
        assert_eq!(json["level"], "warning");
    }
}
