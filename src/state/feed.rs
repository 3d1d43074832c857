use tokio::sync::broadcast;

use crate::dto::session::SessionPatch;

/// Broadcast hub fanning committed session patches out to SSE and WebSocket subscribers.
pub struct PatchFeed {
    sender: broadcast::Sender<SessionPatch>,
}

impl PatchFeed {
    /// Construct a new feed backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent patches.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionPatch> {
        self.sender.subscribe()
    }

    /// Send a patch to all current subscribers, ignoring the case where nobody listens.
    pub fn publish(&self, patch: SessionPatch) {
        let _ = self.sender.send(patch);
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
