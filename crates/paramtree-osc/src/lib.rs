//! paramtree OSC - expose a device over plain OSC/UDP
//!
//! Messages arriving on the listening port write the parameter at their
//! address. Local value changes are sent to a single remote peer.

pub mod error;
pub mod message;
pub mod protocol;
pub mod transport;

pub use error::OscError;
pub use message::{apply_message, args_to_value, decode_packet, encode_packet, value_message};
pub use protocol::{serve_inbound, OscConfig, OscProtocol};
pub use transport::OscSocket;
