//! paramtree OSCQuery - expose a device over OSCQuery
//!
//! One TCP port serves the namespace over HTTP and live updates over
//! WebSocket. A UDP port accepts plain OSC value writes.

pub mod api;
pub mod document;
pub mod error;
pub mod protocol;
pub mod server;
pub mod state;
pub mod ws;

pub use document::{node_document, Attribute, HostInfo};
pub use error::OscQueryError;
pub use protocol::{OscQueryConfig, OscQueryProtocol};
pub use state::{EndpointState, Notification};
pub use ws::WsCommand;
