//! Registry of open channels and broadcast fan-out.

use std::sync::Arc;

use agentwire_frame::{AnyMessage, Broadcast};
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::engine::Channel;

/// The currently open channels of one server.
///
/// Fan-out lives here, not in the engine: a broadcast is written to every
/// open channel, and channels found closed along the way are dropped.
#[derive(Debug, Clone, Default)]
pub struct ChannelSet {
    channels: Arc<DashMap<u64, Channel>>,
}

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, channel: Channel) {
        self.channels.insert(channel.id(), channel);
    }

    pub fn remove(&self, id: u64) -> Option<Channel> {
        self.channels.remove(&id).map(|(_, channel)| channel)
    }

    pub fn get(&self, id: u64) -> Option<Channel> {
        self.channels.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Drop every channel that has closed. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.channels.len();
        self.channels.retain(|_, channel| channel.is_open());
        before.saturating_sub(self.channels.len())
    }

    /// Write `message` to every open channel.
    ///
    /// Returns how many channels accepted the write.
    pub fn broadcast<M: Broadcast>(&self, message: M) -> usize {
        self.broadcast_arc(Arc::new(message))
    }

    /// [`broadcast`](Self::broadcast) for an already shared message.
    /// Non-broadcast messages are not fanned out and return 0.
    pub fn broadcast_arc(&self, message: Arc<dyn AnyMessage>) -> usize {
        if message.kind() != agentwire_frame::MessageKind::Broadcast {
            debug!(message_type = message.type_name(), "refusing to fan out non-broadcast");
            return 0;
        }

        let mut delivered = 0;
        let mut dead = Vec::new();
        for entry in self.channels.iter() {
            match entry.value().write_arc(message.clone()) {
                Ok(_) => delivered += 1,
                Err(err) => {
                    trace!(channel = entry.key(), error = %err, "broadcast skipped");
                    dead.push(*entry.key());
                }
            }
        }
        for id in dead {
            self.channels.remove(&id);
        }

        trace!(delivered, message_type = message.type_name(), "broadcast fanned out");
        delivered
    }

    /// Shut down every channel and empty the set.
    pub fn close_all(&self) {
        for entry in self.channels.iter() {
            entry.value().shutdown();
        }
        self.channels.clear();
    }
}

/// Handle a collaborator uses to push broadcasts to every connected peer.
#[derive(Debug, Clone)]
pub struct BroadcastSource {
    channels: ChannelSet,
}

impl BroadcastSource {
    pub fn new(channels: ChannelSet) -> Self {
        Self { channels }
    }

    /// Push one broadcast. Returns how many channels it was queued on.
    pub fn push<M: Broadcast>(&self, message: M) -> usize {
        self.channels.broadcast(message)
    }

    /// Number of channels a push would currently reach.
    pub fn subscribers(&self) -> usize {
        self.channels.len()
    }
}
