//! Presence tracking: a node is online while its agent channel is open.

use std::sync::Arc;

use crate::engine::TaskSupervisor;
use crate::hub::{ChannelGroup, ChannelId, Fanout};
use crate::protocol::LogMessage;
use crate::registry::Registry;
use crate::relay::{CorrelationTable, SessionDirectory};

/// Supervisor failure message for requests whose agent went away.
pub const NODE_DISCONNECTED: &str = "Node disconnected.";

#[derive(Clone)]
pub struct PresenceSupervisor {
    registry: Arc<Registry>,
    sessions: Arc<SessionDirectory>,
    correlations: Arc<CorrelationTable>,
    supervisor: Arc<TaskSupervisor>,
    fanout: Fanout,
}

impl PresenceSupervisor {
    pub fn new(
        registry: Arc<Registry>,
        sessions: Arc<SessionDirectory>,
        correlations: Arc<CorrelationTable>,
        supervisor: Arc<TaskSupervisor>,
        fanout: Fanout,
    ) -> Self {
        Self {
            registry,
            sessions,
            correlations,
            supervisor,
            fanout,
        }
    }

    /// Tear down a closed channel and return the node it spoke for.
    ///
    /// Only the channel currently bound to a node takes that node offline.
    /// Requests still pending on the node are left in the correlation table,
    /// so events the agent sends after reconnecting still reach their viewer,
    /// but their supervisor entries are marked failed.
    pub fn channel_closed(&self, channel: ChannelId) -> Option<String> {
        let group = self.fanout.hub().close(channel);
        if group != Some(ChannelGroup::Agent) {
            tracing::debug!("Channel {} closed", channel);
            return None;
        }

        let node_id = self.sessions.release_channel(channel, |node_id| {
            self.registry.mark_offline(node_id);
        })?;
        tracing::warn!("Node '{}' disconnected ({})", node_id, channel);

        let pending = self.correlations.pending_for_node(&node_id);
        if !pending.is_empty() {
            tracing::warn!(
                "{} request(s) on '{}' lost their agent: {}",
                pending.len(),
                node_id,
                pending.join(", ")
            );
        }
        for request_id in &pending {
            self.supervisor.mark_failed(request_id, NODE_DISCONNECTED);
        }
        self.fanout.broadcast_snapshot(None);
        self.fanout.log(
            None,
            LogMessage::warning(format!("Pi '{}' disconnected.", node_id)),
        );
        Some(node_id)
    }
}
