//! Live transport channels.
//!
//! Each websocket connection owns an unbounded outbound queue. Handlers push
//! frames into it without waiting on the socket; a per-connection writer
//! task drains it in FIFO order.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::protocol::Frame;

pub type FrameReceiver = mpsc::UnboundedReceiver<Frame>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// Which side of the controller a channel belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelGroup {
    Viewer,
    Agent,
}

impl std::fmt::Display for ChannelGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelGroup::Viewer => write!(f, "viewer"),
            ChannelGroup::Agent => write!(f, "agent"),
        }
    }
}

struct Channel {
    group: ChannelGroup,
    sender: mpsc::UnboundedSender<Frame>,
}

#[derive(Default)]
pub struct Hub {
    next_id: AtomicU64,
    channels: Mutex<HashMap<ChannelId, Channel>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a channel and return its id plus the receiving end of its queue.
    pub fn open(&self, group: ChannelGroup) -> (ChannelId, FrameReceiver) {
        let id = ChannelId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.channels.lock().insert(id, Channel { group, sender });
        tracing::debug!("Opened {} channel {}", group, id);
        (id, receiver)
    }

    /// Forget a channel. Returns its group if it was open.
    pub fn close(&self, id: ChannelId) -> Option<ChannelGroup> {
        let closed = self.channels.lock().remove(&id).map(|c| c.group);
        if let Some(group) = closed {
            tracing::debug!("Closed {} channel {}", group, id);
        }
        closed
    }

    /// Queue a frame for one channel. Returns false if it is gone.
    pub fn send(&self, id: ChannelId, frame: Frame) -> bool {
        let channels = self.channels.lock();
        match channels.get(&id) {
            Some(channel) => channel.sender.send(frame).is_ok(),
            None => false,
        }
    }

    /// Queue a frame for every channel in `group`. Returns the delivery count.
    pub fn broadcast(&self, group: ChannelGroup, frame: &Frame) -> usize {
        let channels = self.channels.lock();
        channels
            .values()
            .filter(|c| c.group == group)
            .filter(|c| c.sender.send(frame.clone()).is_ok())
            .count()
    }

    /// Drop every channel so writer tasks close their sockets.
    pub fn close_all(&self) -> usize {
        let mut channels = self.channels.lock();
        let count = channels.len();
        channels.clear();
        count
    }

    pub fn count(&self, group: ChannelGroup) -> usize {
        self.channels.lock().values().filter(|c| c.group == group).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_send_reaches_only_target() {
        let hub = Hub::new();
        let (a, mut rx_a) = hub.open(ChannelGroup::Viewer);
        let (_b, mut rx_b) = hub.open(ChannelGroup::Viewer);

        assert!(hub.send(a, Frame::new("log", json!({}))));
        assert_eq!(rx_a.try_recv().unwrap().event, "log");
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_respects_group() {
        let hub = Hub::new();
        let (_v, mut viewer) = hub.open(ChannelGroup::Viewer);
        let (_a, mut agent) = hub.open(ChannelGroup::Agent);

        let delivered = hub.broadcast(ChannelGroup::Viewer, &Frame::new("stats_snapshot", json!([])));
        assert_eq!(delivered, 1);
        assert!(viewer.try_recv().is_ok());
        assert!(agent.try_recv().is_err());
    }

    #[test]
    fn test_send_after_close_fails() {
        let hub = Hub::new();
        let (id, _rx) = hub.open(ChannelGroup::Agent);
        assert_eq!(hub.close(id), Some(ChannelGroup::Agent));
        assert_eq!(hub.close(id), None);
        assert!(!hub.send(id, Frame::new("execute_task", json!({}))));
    }

    #[tokio::test]
    async fn test_close_all_ends_receivers() {
        let hub = Hub::new();
        let (_v, mut viewer) = hub.open(ChannelGroup::Viewer);
        let (_a, mut agent) = hub.open(ChannelGroup::Agent);

        assert_eq!(hub.close_all(), 2);
        assert!(viewer.recv().await.is_none());
        assert!(agent.recv().await.is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let hub = Hub::new();
        let (a, _ra) = hub.open(ChannelGroup::Viewer);
        let (b, _rb) = hub.open(ChannelGroup::Agent);
        assert_ne!(a, b);
        assert_eq!(hub.count(ChannelGroup::Viewer), 1);
        assert_eq!(hub.count(ChannelGroup::Agent), 1);
    }
}
