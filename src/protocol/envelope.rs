//! Wire frames exchanged over viewer and agent websockets.
//!
//! Every websocket text message is one JSON `Frame`. A request that wants a
//! reply carries a numeric `ack`; the reply is an `ack` frame echoing it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Event name of acknowledgment frames.
pub const ACK_EVENT: &str = "ack";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            ack: None,
        }
    }

    /// Build a frame from any serializable payload.
    pub fn with_payload<T: Serialize>(event: impl Into<String>, payload: &T) -> Self {
        let event = event.into();
        let data = match serde_json::to_value(payload) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("Failed to encode payload for '{}': {}", event, e);
                Value::Null
            }
        };
        Self::new(event, data)
    }

    /// Reply to a request frame.
    pub fn ack_reply(ack: Option<u64>, data: Value) -> Self {
        Self {
            event: ACK_EVENT.to_string(),
            data,
            ack,
        }
    }

    /// Attach an ack id, used by clients that expect a reply.
    pub fn expecting_ack(mut self, ack: u64) -> Self {
        self.ack = Some(ack);
        self
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode `data` into a typed payload.
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_without_data_or_ack() {
        let frame = Frame::parse(r#"{"event":"catalog:request"}"#).unwrap();
        assert_eq!(frame.event, "catalog:request");
        assert_eq!(frame.data, Value::Null);
        assert_eq!(frame.ack, None);
    }

    #[test]
    fn test_ack_reply_echoes_id() {
        let reply = Frame::ack_reply(Some(7), json!({"status": "ok"}));
        let text = reply.to_text().unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["event"], "ack");
        assert_eq!(parsed["ack"], 7);
        assert_eq!(parsed["data"]["status"], "ok");
    }

    #[test]
    fn test_plain_frames_omit_ack() {
        let text = Frame::new("log", json!({"level": "info"})).to_text().unwrap();
        assert!(!text.contains("\"ack\""));
    }

    #[test]
    fn test_rejects_non_frame_json() {
        assert!(Frame::parse("[1,2]").is_err());
        assert!(Frame::parse("not json").is_err());
    }
}
