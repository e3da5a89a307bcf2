//! Async UDP socket carrying OSC packets

use std::net::SocketAddr;

use rosc::{OscMessage, OscPacket};
use tokio::net::UdpSocket;
use tracing::trace;

use crate::error::OscError;
use crate::message::{decode_packet, encode_packet};

/// A bound UDP socket plus the peer outbound packets go to, if any
#[derive(Debug)]
pub struct OscSocket {
    socket: UdpSocket,
    target: Option<SocketAddr>,
}

impl OscSocket {
    /// Bind `bind_host:listening_port` and aim outbound traffic at
    /// `remote_host:sending_port`. Port 0 picks an ephemeral port.
    pub async fn bind(
        bind_host: &str,
        listening_port: u16,
        remote_host: &str,
        sending_port: u16,
    ) -> Result<Self, OscError> {
        let target = format!("{}:{}", remote_host, sending_port);
        let target: SocketAddr = target
            .parse()
            .map_err(|_| OscError::InvalidAddress(target))?;
        let mut socket = Self::listen(bind_host, listening_port).await?;
        socket.target = Some(target);
        Ok(socket)
    }

    /// Bind a receive-only socket
    pub async fn listen(bind_host: &str, listening_port: u16) -> Result<Self, OscError> {
        let local = format!("{}:{}", bind_host, listening_port);
        let local: SocketAddr = local.parse().map_err(|_| OscError::InvalidAddress(local))?;
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| OscError::Bind {
                addr: local.to_string(),
                source,
            })?;
        Ok(Self {
            socket,
            target: None,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, OscError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn target(&self) -> Option<SocketAddr> {
        self.target
    }

    pub async fn send(&self, packet: &OscPacket) -> Result<(), OscError> {
        let target = self.target.ok_or(OscError::NoTarget)?;
        let bytes = encode_packet(packet)?;
        trace!(target = %target, len = bytes.len(), "TX");
        self.socket.send_to(&bytes, target).await?;
        Ok(())
    }

    /// Wait for one datagram. Socket errors are returned as `Io`, a
    /// datagram that is not OSC as `Decode`.
    pub async fn recv(&self, buf: &mut [u8]) -> Result<(Vec<OscMessage>, SocketAddr), OscError> {
        let (len, from) = self.socket.recv_from(buf).await?;
        trace!(from = %from, len, "RX");
        let messages = decode_packet(&buf[..len])?;
        Ok((messages, from))
    }
}
