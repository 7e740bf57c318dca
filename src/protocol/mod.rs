//! Controller/viewer/agent wire protocol.
//!
//! - JSON frames with optional ack ids
//! - Typed request and telemetry payloads
//! - Task lifecycle events correlated by request id

pub mod envelope;
pub mod event;
pub mod types;

pub use envelope::{Frame, ACK_EVENT};

/// Websocket path for viewers.
pub const VIEWER_PATH: &str = "/ws/ui";

/// Websocket path for agents.
pub const AGENT_PATH: &str = "/ws/pi";
pub use event::{TaskEvent, FAILED_EXIT_CODE};
pub use types::{
    AssignNameRequest, AssignTaskRequest, ExecuteTask, LogLevel, LogMessage, RegisterPayload,
    RunTaskAck, RunTaskRequest, StatsReport, TaskEventPayload,
};
