//! paramtree - typed parameter trees exposed over OSCQuery and OSC
//!
//! Build a [`Device`], declare parameters with [`ParameterSpec`], then
//! expose the tree with [`Expose::expose`]. Several endpoints may run on
//! one device at once; each sees every value change made elsewhere.
//!
//! ```no_run
//! use paramtree::{Device, Domain, Expose, ExposeConfig, ParameterSpec, ValueType};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let device = Device::new("synth");
//! let gain = device.add_param(
//!     ParameterSpec::new("out/gain", ValueType::Float)
//!         .domain(Domain::range(0.0, 1.0)?),
//! )?;
//! device.expose(ExposeConfig::oscquery(3456, 5678)).await?;
//! gain.set_value(0.5)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;

use std::future::Future;
use std::sync::Arc;

pub use config::{load_config, Config, DeviceSection, ExposeConfig, ProtocolKind};
pub use error::ExposeError;
pub use paramtree_core::{
    approx_eq, AccessMode, BoundingMode, CallbackId, Children, Descendants, Device, Domain,
    DomainError, Node, NodeError, Origin, Parameter, ParameterError, ParameterSpec, Protocol,
    ProtocolId, Value, ValueError, ValueType, WeakDevice,
};
pub use paramtree_osc::{OscConfig, OscProtocol};
pub use paramtree_oscquery::{OscQueryConfig, OscQueryProtocol};

use tracing::info;

/// A running endpoint returned by [`Expose::expose`]
#[derive(Debug, Clone)]
pub enum Endpoint {
    Osc(Arc<OscProtocol>),
    OscQuery(Arc<OscQueryProtocol>),
}

impl Endpoint {
    pub fn id(&self) -> ProtocolId {
        match self {
            Endpoint::Osc(p) => p.id(),
            Endpoint::OscQuery(p) => p.id(),
        }
    }

    pub fn kind(&self) -> ProtocolKind {
        match self {
            Endpoint::Osc(_) => ProtocolKind::Osc,
            Endpoint::OscQuery(_) => ProtocolKind::OscQuery,
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            Endpoint::Osc(p) => p.is_running(),
            Endpoint::OscQuery(p) => p.is_running(),
        }
    }

    /// Stop serving. The endpoint stays attached until the device detaches
    /// it or is dropped, but receives nothing.
    pub fn stop(&self) {
        match self {
            Endpoint::Osc(p) => p.stop(),
            Endpoint::OscQuery(p) => p.stop(),
        }
    }
}

/// Network exposure of a device
pub trait Expose {
    /// Start an endpoint and attach it. Repeated calls add endpoints that
    /// run concurrently. A bind failure affects only this endpoint.
    fn expose(
        &self,
        config: ExposeConfig,
    ) -> impl Future<Output = Result<Endpoint, ExposeError>> + Send;
}

impl Expose for Device {
    fn expose(
        &self,
        config: ExposeConfig,
    ) -> impl Future<Output = Result<Endpoint, ExposeError>> + Send {
        let device = self.clone();
        async move {
            info!(
                device = %device.name(),
                protocol = %config.protocol,
                listening_port = config.listening_port,
                sending_port = config.sending_port,
                "Exposing device"
            );
            let endpoint = match config.protocol {
                ProtocolKind::Osc => {
                    Endpoint::Osc(OscProtocol::start(&device, config.to_osc()).await?)
                }
                ProtocolKind::OscQuery => Endpoint::OscQuery(
                    OscQueryProtocol::start(&device, config.to_oscquery()).await?,
                ),
            };
            Ok(endpoint)
        }
    }
}
