//! OSCQuery endpoint: HTTP + WebSocket on one port, OSC/UDP on another

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use paramtree_core::{
    next_protocol_id, Device, Node, Origin, Parameter, Protocol, ProtocolId, Value,
};
use paramtree_osc::{serve_inbound, OscSocket};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

use crate::document::HostInfo;
use crate::error::OscQueryError;
use crate::server;
use crate::state::{EndpointState, Notification};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OscQueryConfig {
    pub bind_host: String,
    /// UDP port accepting OSC value writes
    pub osc_port: u16,
    /// TCP port serving HTTP queries and WebSocket sessions
    pub ws_port: u16,
    pub logger: bool,
}

impl Default for OscQueryConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            osc_port: 1234,
            ws_port: 5678,
            logger: false,
        }
    }
}

pub struct OscQueryProtocol {
    id: ProtocolId,
    state: Arc<EndpointState>,
    osc_addr: SocketAddr,
    http_addr: SocketAddr,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl OscQueryProtocol {
    /// Bind both ports and attach a running endpoint to `device`.
    ///
    /// Nothing is attached if either port fails to bind.
    pub async fn start(
        device: &Device,
        config: OscQueryConfig,
    ) -> Result<Arc<Self>, OscQueryError> {
        let socket = Arc::new(OscSocket::listen(&config.bind_host, config.osc_port).await?);

        let http = format!("{}:{}", config.bind_host, config.ws_port);
        let http: SocketAddr = http.parse().map_err(|_| OscQueryError::InvalidAddress(http))?;
        let listener = TcpListener::bind(http)
            .await
            .map_err(|source| OscQueryError::Bind {
                addr: http.to_string(),
                source,
            })?;

        let osc_addr = socket.local_addr()?;
        let http_addr = listener.local_addr()?;
        let id = next_protocol_id();
        let host = HostInfo {
            name: device.name().to_string(),
            osc_ip: config.bind_host.clone(),
            osc_port: osc_addr.port(),
            ws_port: http_addr.port(),
        };
        let state = Arc::new(EndpointState::new(
            id,
            device.downgrade(),
            host,
            config.logger,
        ));

        let tasks = vec![
            tokio::spawn(server::run(listener, server::router(state.clone()))),
            tokio::spawn(serve_inbound(socket, device.downgrade(), id, config.logger)),
        ];

        let protocol = Arc::new(Self {
            id,
            state,
            osc_addr,
            http_addr,
            tasks: Mutex::new(tasks),
            running: AtomicBool::new(true),
        });
        device.attach_protocol(protocol.clone());

        info!(
            device = %device.name(),
            osc = %osc_addr,
            http = %http_addr,
            "OSCQuery endpoint started"
        );
        Ok(protocol)
    }

    /// Address of the UDP OSC socket
    pub fn osc_addr(&self) -> SocketAddr {
        self.osc_addr
    }

    /// Address of the HTTP/WebSocket listener
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn host_info(&self) -> &HostInfo {
        &self.state.host
    }

    /// Receive the notifications WebSocket peers are fed
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Notification> {
        self.state.subscribe()
    }
}

impl Protocol for OscQueryProtocol {
    fn id(&self) -> ProtocolId {
        self.id
    }

    fn name(&self) -> &'static str {
        "oscquery"
    }

    fn push(&self, parameter: &Parameter, value: &Value, origin: &Origin) {
        if !self.is_running() {
            return;
        }
        let address = parameter.address();
        if self.state.logger {
            info!(address = %address, value = %value, "OSCQuery out");
        }
        self.state.notify(Notification::Value {
            address,
            value: value.clone(),
            origin: *origin,
        });
    }

    fn node_created(&self, node: &Arc<Node>) {
        if self.is_running() {
            self.state.notify(Notification::PathAdded(node.address()));
        }
    }

    fn node_removed(&self, address: &str) {
        if self.is_running() {
            self.state.notify(Notification::PathRemoved(address.to_string()));
        }
    }

    fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.state.notify(Notification::Shutdown);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!(http = %self.http_addr, "OSCQuery endpoint stopped");
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for OscQueryProtocol {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for OscQueryProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OscQueryProtocol")
            .field("id", &self.id)
            .field("osc_addr", &self.osc_addr)
            .field("http_addr", &self.http_addr)
            .field("running", &self.is_running())
            .finish()
    }
}
