//! Seam between a device and the network endpoints that mirror it

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::node::Node;
use crate::parameter::Parameter;
use crate::value::Value;

/// Identifies one attached endpoint
pub type ProtocolId = u64;

/// Identifies one remote peer of an endpoint
pub type PeerId = u64;

static NEXT_PROTOCOL_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique endpoint identifier
pub fn next_protocol_id() -> ProtocolId {
    NEXT_PROTOCOL_ID.fetch_add(1, Ordering::Relaxed)
}

/// Who issued a value write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Origin {
    /// The local API
    #[default]
    Local,
    /// A network endpoint, optionally narrowed to one of its peers
    Remote {
        protocol: ProtocolId,
        peer: Option<PeerId>,
    },
}

impl Origin {
    pub fn remote(protocol: ProtocolId) -> Self {
        Origin::Remote {
            protocol,
            peer: None,
        }
    }

    pub fn peer(protocol: ProtocolId, peer: PeerId) -> Self {
        Origin::Remote {
            protocol,
            peer: Some(peer),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Origin::Remote { .. })
    }

    /// Whether the write came in through endpoint `id`
    pub fn is_from(&self, id: ProtocolId) -> bool {
        matches!(self, Origin::Remote { protocol, .. } if *protocol == id)
    }

    /// Peer of endpoint `id` the write came from, if any
    pub fn peer_of(&self, id: ProtocolId) -> Option<PeerId> {
        match self {
            Origin::Remote { protocol, peer } if *protocol == id => *peer,
            _ => None,
        }
    }
}

/// A network exposure attached to a device.
///
/// `push` is called for every accepted value write while the parameter is
/// still locked, so implementations must only enqueue work and must not
/// touch parameter values themselves.
pub trait Protocol: Send + Sync {
    fn id(&self) -> ProtocolId;

    /// Short protocol name, e.g. `"osc"`
    fn name(&self) -> &'static str;

    /// Forward an accepted value write to the network
    fn push(&self, parameter: &Parameter, value: &Value, origin: &Origin);

    /// A node became visible after `init()`
    fn node_created(&self, _node: &Arc<Node>) {}

    /// A previously announced node was removed
    fn node_removed(&self, _address: &str) {}

    /// Stop all network activity. Must be idempotent.
    fn stop(&self);

    fn is_running(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_matching() {
        let id = next_protocol_id();
        let other = next_protocol_id();
        assert_ne!(id, other);

        let origin = Origin::peer(id, 7);
        assert!(origin.is_remote());
        assert!(origin.is_from(id));
        assert!(!origin.is_from(other));
        assert_eq!(origin.peer_of(id), Some(7));
        assert_eq!(origin.peer_of(other), None);
        assert!(!Origin::Local.is_from(id));
    }
}
