//! paramtree core - typed parameter trees
//!
//! This crate provides the model that network endpoints mirror:
//! - Values with a closed set of types and explicit coercion rules
//! - Domains (numeric bounds or enumerations) and bounding modes
//! - Nodes forming an addressable, ordered tree
//! - Devices owning a tree and the endpoints attached to it

pub mod device;
pub mod domain;
pub mod node;
pub mod parameter;
pub mod protocol;
pub mod value;

pub use device::{Device, WeakDevice};
pub use domain::{BoundingMode, Domain, DomainError};
pub use node::{Children, Descendants, Node, NodeError};
pub use parameter::{AccessMode, CallbackId, Parameter, ParameterError, ParameterSpec};
pub use protocol::{next_protocol_id, Origin, PeerId, Protocol, ProtocolId};
pub use value::{approx_eq, Value, ValueError, ValueType, FLOAT_TOLERANCE};
