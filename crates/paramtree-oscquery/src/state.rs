//! State shared by the HTTP, WebSocket and UDP sides of an endpoint

use std::sync::atomic::{AtomicU64, Ordering};

use paramtree_core::{Device, Origin, PeerId, ProtocolId, Value, WeakDevice};
use tokio::sync::broadcast;

use crate::document::HostInfo;

/// Events fanned out to connected WebSocket peers
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Value {
        address: String,
        value: Value,
        origin: Origin,
    },
    PathAdded(String),
    PathRemoved(String),
    /// The endpoint is stopping; peers disconnect
    Shutdown,
}

pub struct EndpointState {
    pub id: ProtocolId,
    pub device: WeakDevice,
    pub host: HostInfo,
    pub logger: bool,
    events: broadcast::Sender<Notification>,
    next_peer: AtomicU64,
}

impl EndpointState {
    pub fn new(id: ProtocolId, device: WeakDevice, host: HostInfo, logger: bool) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            id,
            device,
            host,
            logger,
            events,
            next_peer: AtomicU64::new(1),
        }
    }

    pub fn device(&self) -> Option<Device> {
        self.device.upgrade()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.events.subscribe()
    }

    /// Broadcast to every connected peer. Never blocks.
    pub fn notify(&self, notification: Notification) {
        // no receivers is fine
        let _ = self.events.send(notification);
    }

    pub fn next_peer(&self) -> PeerId {
        self.next_peer.fetch_add(1, Ordering::Relaxed)
    }

    /// Origin of writes made by `peer` through this endpoint
    pub fn origin_of(&self, peer: PeerId) -> Origin {
        Origin::peer(self.id, peer)
    }
}
