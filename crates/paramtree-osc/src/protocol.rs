//! Plain OSC endpoint
//!
//! Inbound datagrams on the listening port are routed to parameters by
//! address. Every value change not caused by this endpoint is sent to the
//! remote host. Sends go through a queue drained by a dedicated task so
//! that `push` never blocks the writer.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use paramtree_core::{
    next_protocol_id, Device, Origin, Parameter, Protocol, ProtocolId, Value, WeakDevice,
};
use parking_lot::Mutex;
use rosc::OscPacket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::OscError;
use crate::message::{apply_message, value_message, MAX_PACKET_SIZE};
use crate::transport::OscSocket;

/// Where an OSC endpoint listens and sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OscConfig {
    pub bind_host: String,
    pub listening_port: u16,
    pub remote_host: String,
    pub sending_port: u16,
    /// Emit an info record per message in either direction
    pub logger: bool,
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            listening_port: 9996,
            remote_host: "127.0.0.1".to_string(),
            sending_port: 9997,
            logger: false,
        }
    }
}

pub struct OscProtocol {
    id: ProtocolId,
    local_addr: SocketAddr,
    target: SocketAddr,
    logger: bool,
    outbound: mpsc::UnboundedSender<OscPacket>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl OscProtocol {
    /// Bind the sockets and attach a running endpoint to `device`.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(device: &Device, config: OscConfig) -> Result<Arc<Self>, OscError> {
        let socket = Arc::new(
            OscSocket::bind(
                &config.bind_host,
                config.listening_port,
                &config.remote_host,
                config.sending_port,
            )
            .await?,
        );
        let local_addr = socket.local_addr()?;
        let target = socket.target().ok_or(OscError::NoTarget)?;
        let id = next_protocol_id();
        let (outbound, queue) = mpsc::unbounded_channel();

        let tasks = vec![
            tokio::spawn(serve_inbound(
                socket.clone(),
                device.downgrade(),
                id,
                config.logger,
            )),
            tokio::spawn(drain_outbound(socket, queue)),
        ];

        let protocol = Arc::new(Self {
            id,
            local_addr,
            target,
            logger: config.logger,
            outbound,
            tasks: Mutex::new(tasks),
            running: AtomicBool::new(true),
        });
        device.attach_protocol(protocol.clone());

        info!(
            device = %device.name(),
            listening = %local_addr,
            sending = %target,
            "OSC endpoint started"
        );
        Ok(protocol)
    }

    /// Address the listening socket is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address outbound messages are sent to
    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl Protocol for OscProtocol {
    fn id(&self) -> ProtocolId {
        self.id
    }

    fn name(&self) -> &'static str {
        "osc"
    }

    fn push(&self, parameter: &Parameter, value: &Value, origin: &Origin) {
        if !self.is_running() || origin.is_from(self.id) {
            return;
        }
        let message = value_message(parameter.address(), value);
        if self.logger {
            info!(address = %message.addr, value = %value, "OSC out");
        }
        if self.outbound.send(OscPacket::Message(message)).is_err() {
            debug!("OSC send queue closed");
        }
    }

    fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!(listening = %self.local_addr, "OSC endpoint stopped");
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for OscProtocol {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for OscProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OscProtocol")
            .field("id", &self.id)
            .field("local_addr", &self.local_addr)
            .field("target", &self.target)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Receive loop: decode datagrams and apply each message to the tree with
/// `Origin::remote(id)`. Ends when the device is gone.
pub async fn serve_inbound(
    socket: Arc<OscSocket>,
    device: WeakDevice,
    id: ProtocolId,
    logger: bool,
) {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    loop {
        let received = socket.recv(&mut buf).await;
        let Some(device) = device.upgrade() else {
            break;
        };
        let (messages, from) = match received {
            Ok(received) => received,
            Err(OscError::Io(e)) => {
                warn!(error = %e, "OSC receive failed");
                continue;
            }
            Err(e) => {
                debug!(error = %e, "Dropped inbound packet");
                continue;
            }
        };

        for message in messages {
            let address = message.addr.clone();
            match apply_message(&device, message, Origin::remote(id)) {
                Ok(value) if logger => {
                    info!(address = %address, value = %value, from = %from, "OSC in");
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(address = %address, from = %from, error = %e, "Dropped inbound message");
                }
            }
        }
    }
}

async fn drain_outbound(socket: Arc<OscSocket>, mut queue: mpsc::UnboundedReceiver<OscPacket>) {
    while let Some(packet) = queue.recv().await {
        if let Err(e) = socket.send(&packet).await {
            debug!(error = %e, "Failed to send OSC packet");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paramtree_core::{Domain, ParameterSpec, ValueType};
    use rosc::{OscMessage, OscType};
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::time::{sleep, timeout};

    async fn remote_peer() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    fn config_for(peer: &UdpSocket) -> OscConfig {
        OscConfig {
            bind_host: "127.0.0.1".to_string(),
            listening_port: 0,
            remote_host: "127.0.0.1".to_string(),
            sending_port: peer.local_addr().unwrap().port(),
            logger: true,
        }
    }

    async fn recv_message(peer: &UdpSocket, wait: Duration) -> Option<OscMessage> {
        let mut buf = [0u8; 1024];
        let (len, _) = timeout(wait, peer.recv_from(&mut buf)).await.ok()?.ok()?;
        crate::message::decode_packet(&buf[..len])
            .ok()?
            .into_iter()
            .next()
    }

    async fn send_message(peer: &UdpSocket, to: SocketAddr, addr: &str, args: Vec<OscType>) {
        let packet = OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args,
        });
        let bytes = crate::message::encode_packet(&packet).unwrap();
        peer.send_to(&bytes, to).await.unwrap();
    }

    #[tokio::test]
    async fn test_local_write_is_sent() {
        let device = Device::new("test");
        let param = device
            .add_param(ParameterSpec::new("float", ValueType::Float))
            .unwrap();
        let peer = remote_peer().await;
        let _osc = OscProtocol::start(&device, config_for(&peer)).await.unwrap();

        param.set_value(0.5).unwrap();

        let message = recv_message(&peer, Duration::from_secs(2)).await.unwrap();
        assert_eq!(message.addr, "/float");
        assert_eq!(message.args, vec![OscType::Float(0.5)]);
    }

    #[tokio::test]
    async fn test_remote_write_is_applied_and_not_echoed() {
        let device = Device::new("test");
        let param = device
            .add_param(
                ParameterSpec::new("int", ValueType::Int).domain(Domain::range(-100, 100).unwrap()),
            )
            .unwrap();
        let peer = remote_peer().await;
        let osc = OscProtocol::start(&device, config_for(&peer)).await.unwrap();

        send_message(&peer, osc.local_addr(), "/int", vec![OscType::Int(500)]).await;

        let mut applied = false;
        for _ in 0..100 {
            if param.value() == Value::Int(100) {
                applied = true;
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        assert!(applied);
        assert!(recv_message(&peer, Duration::from_millis(200)).await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_input_is_dropped() {
        let device = Device::new("test");
        let param = device
            .add_param(ParameterSpec::new("int", ValueType::Int))
            .unwrap();
        let peer = remote_peer().await;
        let osc = OscProtocol::start(&device, config_for(&peer)).await.unwrap();

        peer.send_to(b"garbage", osc.local_addr()).await.unwrap();
        send_message(&peer, osc.local_addr(), "/nowhere", vec![OscType::Int(1)]).await;
        send_message(&peer, osc.local_addr(), "/int", vec![OscType::Int(3)]).await;

        let mut applied = false;
        for _ in 0..100 {
            if param.value() == Value::Int(3) {
                applied = true;
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        assert!(applied);
        assert!(osc.is_running());
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let taken = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let device = Device::new("test");

        let config = OscConfig {
            bind_host: "127.0.0.1".to_string(),
            listening_port: port,
            ..OscConfig::default()
        };
        let err = OscProtocol::start(&device, config).await.unwrap_err();
        assert!(matches!(err, OscError::Bind { .. }));
        assert!(device.protocols().is_empty());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let device = Device::new("test");
        let param = device
            .add_param(ParameterSpec::new("bool", ValueType::Bool))
            .unwrap();
        let peer = remote_peer().await;
        let osc = OscProtocol::start(&device, config_for(&peer)).await.unwrap();

        osc.stop();
        osc.stop();
        assert!(!osc.is_running());

        param.set_value(true).unwrap();
        assert!(recv_message(&peer, Duration::from_millis(200)).await.is_none());
    }
}
