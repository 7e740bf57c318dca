//! Inbound event dispatch.
//!
//! Events are routed through one static table keyed by channel group and
//! event name. Anything not in the table is ignored.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::controller::Controller;
use crate::error::{Error, Result};
use crate::hub::{ChannelGroup, ChannelId};
use crate::protocol::types::{agent, task, viewer};
use crate::protocol::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    RunTask,
    AssignTask,
    AssignName,
    CatalogRequest,
    Register,
    StatsReport,
    TaskEvent,
}

const ROUTES: &[(ChannelGroup, &str, Route)] = &[
    (ChannelGroup::Viewer, viewer::RUN_TASK, Route::RunTask),
    (ChannelGroup::Viewer, viewer::ASSIGN_TASK, Route::AssignTask),
    (ChannelGroup::Viewer, viewer::ASSIGN_NAME, Route::AssignName),
    (ChannelGroup::Viewer, viewer::CATALOG_REQUEST, Route::CatalogRequest),
    (ChannelGroup::Agent, agent::REGISTER, Route::Register),
    (ChannelGroup::Agent, agent::STATS_REPORT, Route::StatsReport),
    (ChannelGroup::Agent, task::STARTED, Route::TaskEvent),
    (ChannelGroup::Agent, task::OUTPUT, Route::TaskEvent),
    (ChannelGroup::Agent, task::FINISHED, Route::TaskEvent),
    (ChannelGroup::Agent, task::ERROR, Route::TaskEvent),
];

pub fn route(group: ChannelGroup, event: &str) -> Option<Route> {
    ROUTES
        .iter()
        .find(|(g, name, _)| *g == group && *name == event)
        .map(|(_, _, route)| *route)
}

/// What the connection should do after an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// Handle one inbound frame from `channel`.
pub fn dispatch(ctl: &Controller, channel: ChannelId, group: ChannelGroup, frame: Frame) -> Flow {
    let Some(route) = route(group, &frame.event) else {
        tracing::debug!("Ignoring '{}' from {} {}", frame.event, group, channel);
        return Flow::Continue;
    };

    match route {
        Route::RunTask => {
            let result = decode(&frame).and_then(|req| ctl.run_task(channel, req));
            reply(ctl, channel, frame.ack, result);
        }
        Route::AssignTask => {
            let result = decode(&frame).and_then(|req| ctl.assign_task(channel, req));
            reply(ctl, channel, frame.ack, result);
        }
        Route::AssignName => {
            let result = decode(&frame).and_then(|req| ctl.assign_name(channel, req));
            reply(ctl, channel, frame.ack, result);
        }
        Route::CatalogRequest => ctl.send_catalog(channel),
        Route::Register => {
            if let Err(e) = decode(&frame).and_then(|payload| ctl.register(channel, payload)) {
                tracing::warn!("Rejecting registration on {}: {}", channel, e);
                return Flow::Close;
            }
        }
        Route::StatsReport => match decode(&frame) {
            Ok(report) => ctl.stats_report(report),
            Err(_) => tracing::debug!("Malformed stats report on {}", channel),
        },
        Route::TaskEvent => match decode(&frame) {
            Ok(payload) => ctl.task_event(&frame.event, payload),
            Err(_) => tracing::debug!("Malformed {} on {}", frame.event, channel),
        },
    }
    Flow::Continue
}

fn decode<T: DeserializeOwned>(frame: &Frame) -> Result<T> {
    frame
        .payload()
        .map_err(|_| Error::invalid("Invalid payload."))
}

fn reply(ctl: &Controller, channel: ChannelId, ack: Option<u64>, result: Result<Value>) {
    let data = match result {
        Ok(data) => data,
        Err(e) => {
            tracing::debug!("Request on {} failed: {}", channel, e);
            json!({ "error": e.to_string() })
        }
    };
    ctl.hub().send(channel, Frame::ack_reply(ack, data));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::hub::FrameReceiver;
    use crate::protocol::ACK_EVENT;
    use crate::registry::Registry;
    use std::sync::Arc;

    fn controller() -> Controller {
        Controller::with_registry(Settings::default(), Arc::new(Registry::in_memory()))
    }

    fn last_ack(rx: &mut FrameReceiver) -> Frame {
        let mut ack = None;
        while let Ok(frame) = rx.try_recv() {
            if frame.event == ACK_EVENT {
                ack = Some(frame);
            }
        }
        ack.expect("no ack frame")
    }

    #[test]
    fn test_routes_are_scoped_by_group() {
        assert_eq!(route(ChannelGroup::Viewer, "run_task"), Some(Route::RunTask));
        assert_eq!(route(ChannelGroup::Agent, "run_task"), None);
        assert_eq!(route(ChannelGroup::Viewer, "register"), None);
        assert_eq!(route(ChannelGroup::Agent, "task_error"), Some(Route::TaskEvent));
        assert_eq!(route(ChannelGroup::Agent, "terminal_output"), None);
    }

    #[test]
    fn test_invalid_payload_is_acked_with_error() {
        let ctl = controller();
        let (viewer, mut rx) = ctl.hub().open(ChannelGroup::Viewer);

        let frame = Frame::new("assign_task", json!("not an object")).expecting_ack(7);
        assert_eq!(dispatch(&ctl, viewer, ChannelGroup::Viewer, frame), Flow::Continue);

        let ack = last_ack(&mut rx);
        assert_eq!(ack.ack, Some(7));
        assert_eq!(ack.data["error"], "Invalid payload.");
    }

    #[test]
    fn test_reply_sent_without_ack_id() {
        let ctl = controller();
        let (viewer, mut rx) = ctl.hub().open(ChannelGroup::Viewer);

        let frame = Frame::new("run_task", json!({ "pi_id": "local" }));
        dispatch(&ctl, viewer, ChannelGroup::Viewer, frame);

        let ack = last_ack(&mut rx);
        assert_eq!(ack.ack, None);
        assert_eq!(ack.data["error"], "Task id required.");
    }

    #[test]
    fn test_catalog_request() {
        let ctl = controller();
        let (viewer, mut rx) = ctl.hub().open(ChannelGroup::Viewer);

        dispatch(
            &ctl,
            viewer,
            ChannelGroup::Viewer,
            Frame::new("catalog:request", Value::Null),
        );
        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.event, "task_catalog");
        assert_eq!(frame.data[0]["id"], "uptime");
    }

    #[test]
    fn test_bad_registration_closes_channel() {
        let ctl = controller();
        let (agent_ch, _rx) = ctl.hub().open(ChannelGroup::Agent);

        let flow = dispatch(
            &ctl,
            agent_ch,
            ChannelGroup::Agent,
            Frame::new("register", json!({ "pi_id": "  " })),
        );
        assert_eq!(flow, Flow::Close);

        let flow = dispatch(
            &ctl,
            agent_ch,
            ChannelGroup::Agent,
            Frame::new("register", json!({ "pi_id": "rpi-07", "label": "Garage" })),
        );
        assert_eq!(flow, Flow::Continue);
        assert_eq!(ctl.registry().get("rpi-07").unwrap().label, "Garage");
    }

    #[test]
    fn test_viewer_cannot_impersonate_agent() {
        let ctl = controller();
        let (viewer, _rx) = ctl.hub().open(ChannelGroup::Viewer);

        dispatch(
            &ctl,
            viewer,
            ChannelGroup::Viewer,
            Frame::new("register", json!({ "pi_id": "rpi-07" })),
        );
        assert!(ctl.registry().get("rpi-07").is_none());
    }
}
