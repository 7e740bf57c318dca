//! Push delivery of registry snapshots and log lines to viewers.

use std::sync::Arc;

use super::channels::{ChannelGroup, ChannelId, Hub};
use crate::protocol::types::viewer;
use crate::protocol::{Frame, LogMessage};
use crate::registry::Registry;

#[derive(Clone)]
pub struct Fanout {
    registry: Arc<Registry>,
    hub: Arc<Hub>,
}

impl Fanout {
    pub fn new(registry: Arc<Registry>, hub: Arc<Hub>) -> Self {
        Self { registry, hub }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Push the fleet snapshot to one viewer, or to all when `target` is None.
    ///
    /// The controller's own node is never part of the pushed snapshot.
    pub fn broadcast_snapshot(&self, target: Option<ChannelId>) {
        let frame = Frame::with_payload(viewer::STATS_SNAPSHOT, &self.registry.snapshot());
        match target {
            Some(id) => {
                self.hub.send(id, frame);
            }
            None => {
                self.hub.broadcast(ChannelGroup::Viewer, &frame);
            }
        }
    }

    /// Push a `log` line to one viewer, or to all when `target` is None.
    pub fn log(&self, target: Option<ChannelId>, message: LogMessage) {
        let frame = Frame::with_payload(viewer::LOG, &message);
        match target {
            Some(id) => {
                self.hub.send(id, frame);
            }
            None => {
                self.hub.broadcast(ChannelGroup::Viewer, &frame);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{NodeUpdate, CONTROLLER_NODE_ID};

    #[test]
    fn test_snapshot_filters_controller_node() {
        let registry = Arc::new(Registry::in_memory());
        let hub = Arc::new(Hub::new());
        let fanout = Fanout::new(registry.clone(), hub.clone());
        let (_id, mut rx) = hub.open(ChannelGroup::Viewer);

        registry.upsert(CONTROLLER_NODE_ID, NodeUpdate::new());
        registry.upsert("rpi-07", NodeUpdate::new());
        fanout.broadcast_snapshot(None);

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.event, "stats_snapshot");
        let nodes = frame.data.as_array().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0]["pi_id"], "rpi-07");
    }

    #[test]
    fn test_targeted_snapshot_skips_other_viewers() {
        let registry = Arc::new(Registry::in_memory());
        let hub = Arc::new(Hub::new());
        let fanout = Fanout::new(registry, hub.clone());
        let (first, mut rx_first) = hub.open(ChannelGroup::Viewer);
        let (_second, mut rx_second) = hub.open(ChannelGroup::Viewer);

        fanout.broadcast_snapshot(Some(first));
        assert!(rx_first.try_recv().is_ok());
        assert!(rx_second.try_recv().is_err());
    }
}
