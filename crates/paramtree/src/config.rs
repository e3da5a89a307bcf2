//! Configuration loading

use anyhow::Result;
use paramtree_core::Device;
use paramtree_osc::OscConfig;
use paramtree_oscquery::OscQueryConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::error::ExposeError;
use crate::{Endpoint, Expose};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceSection,
    /// One entry per endpoint to start
    #[serde(default)]
    pub expose: Vec<ExposeConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSection {
    /// Display name, advertised as `NAME` in OSCQuery host info
    #[serde(default = "default_device_name")]
    pub name: String,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            name: default_device_name(),
        }
    }
}

fn default_device_name() -> String {
    "paramtree".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolKind {
    #[serde(rename = "oscquery")]
    OscQuery,
    #[serde(rename = "osc")]
    Osc,
}

impl ProtocolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolKind::OscQuery => "oscquery",
            ProtocolKind::Osc => "osc",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolKind {
    type Err = ExposeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "oscquery" => Ok(ProtocolKind::OscQuery),
            "osc" => Ok(ProtocolKind::Osc),
            _ => Err(ExposeError::UnknownProtocol(s.to_string())),
        }
    }
}

/// Binding options for one endpoint.
///
/// For OSC, `listening_port` receives and `sending_port` is the remote
/// peer's port. For OSCQuery, `listening_port` is the UDP OSC port and
/// `sending_port` serves HTTP and WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposeConfig {
    pub protocol: ProtocolKind,
    #[serde(default = "default_listening_port")]
    pub listening_port: u16,
    #[serde(default = "default_sending_port")]
    pub sending_port: u16,
    /// OSC only: host outbound messages go to
    #[serde(default = "default_remote_host")]
    pub remote_host: String,
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    /// Log every message in and out
    #[serde(default)]
    pub logger: bool,
}

fn default_listening_port() -> u16 {
    3456
}

fn default_sending_port() -> u16 {
    5678
}

fn default_remote_host() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

impl ExposeConfig {
    pub fn new(protocol: ProtocolKind, listening_port: u16, sending_port: u16) -> Self {
        Self {
            protocol,
            listening_port,
            sending_port,
            remote_host: default_remote_host(),
            bind_host: default_bind_host(),
            logger: false,
        }
    }

    pub fn oscquery(listening_port: u16, sending_port: u16) -> Self {
        Self::new(ProtocolKind::OscQuery, listening_port, sending_port)
    }

    pub fn osc(listening_port: u16, sending_port: u16) -> Self {
        Self::new(ProtocolKind::Osc, listening_port, sending_port)
    }

    pub fn logger(mut self, enabled: bool) -> Self {
        self.logger = enabled;
        self
    }

    pub fn bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }

    pub fn remote_host(mut self, host: impl Into<String>) -> Self {
        self.remote_host = host.into();
        self
    }

    pub fn to_osc(&self) -> OscConfig {
        OscConfig {
            bind_host: self.bind_host.clone(),
            listening_port: self.listening_port,
            remote_host: self.remote_host.clone(),
            sending_port: self.sending_port,
            logger: self.logger,
        }
    }

    pub fn to_oscquery(&self) -> OscQueryConfig {
        OscQueryConfig {
            bind_host: self.bind_host.clone(),
            osc_port: self.listening_port,
            ws_port: self.sending_port,
            logger: self.logger,
        }
    }
}

impl Config {
    /// Create the device named in the configuration
    pub fn create_device(&self) -> Device {
        Device::new(self.device.name.clone())
    }

    /// Start every configured endpoint on `device`, in order.
    ///
    /// Stops at the first endpoint that fails to bind; the ones already
    /// started stay attached.
    pub async fn expose_all(
        &self,
        device: &Device,
    ) -> std::result::Result<Vec<Endpoint>, ExposeError> {
        let mut endpoints = Vec::with_capacity(self.expose.len());
        for config in &self.expose {
            endpoints.push(device.expose(config.clone()).await?);
        }
        Ok(endpoints)
    }
}

/// Load configuration from file, falling back to defaults when absent
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), endpoints = config.expose.len(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
