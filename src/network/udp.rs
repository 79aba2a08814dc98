//! Kernel UDP transport, for links where the client already has an address
//! (DHCPv6 over link-local, renewals).

use super::{new_tokio_socket_bound_to_device, SocketError, Transport};
use std::{io, net::SocketAddr};
use tokio::net::UdpSocket;

#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    interface: String,
}

impl UdpTransport {
    /// Binds to `addr` on `interface` only.
    pub fn open(interface: &str, addr: SocketAddr) -> Result<Self, SocketError> {
        let socket = new_tokio_socket_bound_to_device(interface, addr)?;
        tracing::debug!(interface, %addr, "UDP transport bound");
        Ok(Self {
            socket,
            interface: interface.to_string(),
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpTransport {
    async fn send_to(&self, payload: &[u8], destination: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(payload, destination).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }
}
