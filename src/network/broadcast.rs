//! Link-layer broadcast transport
//!
//! Before it has an address a client cannot receive unicast UDP through the
//! kernel, so DHCPv4 traffic goes through a raw packet socket: outbound
//! payloads are framed by [`frame`](super::frame::frame) and inbound frames
//! are filtered by [`unframe`](super::frame::unframe).

use super::frame::{self, MacAddr, Unframed};
use super::{SocketError, Transport};
use std::io;
use std::net::{SocketAddr, SocketAddrV4};
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;

/// 1500-byte MTU plus the untagged Ethernet header.
const UNTAGGED_FRAME_LEN: usize = 1500 + 14;
const VLAN_TAG_LEN: usize = 4;

/// Largest frame that can arrive carrying `vlan_count` tags.
fn max_frame_len(vlan_count: usize) -> usize {
    UNTAGGED_FRAME_LEN + VLAN_TAG_LEN * vlan_count
}

pub struct BroadcastTransport {
    socket: AsyncFd<socket2::Socket>,
    interface: String,
    mac: MacAddr,
    vlans: Vec<u16>,
    bound: SocketAddrV4,
}

impl BroadcastTransport {
    /// Opens a packet socket on `interface`.
    ///
    /// Outbound frames carry the VLAN stack `vlans` (outermost first) and the
    /// source `0.0.0.0:<bound port>`. Inbound frames must carry exactly the
    /// same stack and be addressed to `bound`.
    pub async fn open(
        interface: &str,
        vlans: &[u16],
        bound: SocketAddrV4,
    ) -> crate::error::Result<Self> {
        let mac = super::interface_mac(interface).await?;
        let socket = open_packet_socket(interface)?;
        let socket = AsyncFd::with_interest(socket, Interest::READABLE | Interest::WRITABLE)
            .map_err(SocketError::Register)?;
        tracing::info!(interface, %mac, ?vlans, %bound, "broadcast transport open");
        Ok(Self {
            socket,
            interface: interface.to_string(),
            mac,
            vlans: vlans.to_vec(),
            bound,
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    pub fn vlans(&self) -> &[u16] {
        &self.vlans
    }

    async fn write_frame(&self, frame: &[u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.socket.writable().await?;
            match guard.try_io(|inner| inner.get_ref().send(frame)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    async fn read_frame(&self, buf: &mut [u8]) -> io::Result<usize> {
        use std::io::Read;

        loop {
            let mut guard = self.socket.readable().await?;
            match guard.try_io(|inner| {
                let mut socket = inner.get_ref();
                socket.read(buf)
            }) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }
}

impl Transport for BroadcastTransport {
    async fn send_to(&self, payload: &[u8], destination: SocketAddr) -> io::Result<usize> {
        let SocketAddr::V4(destination) = destination else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "broadcast transport only carries IPv4",
            ));
        };
        let source = SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, self.bound.port());
        let frame = frame::frame(
            payload,
            MacAddr::BROADCAST,
            self.mac,
            destination,
            source,
            &self.vlans,
        )
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.write_frame(&frame).await?;
        tracing::trace!(bytes = payload.len(), %destination, "frame sent");
        Ok(payload.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut raw = vec![0u8; max_frame_len(self.vlans.len())];
        loop {
            let len = self.read_frame(&mut raw).await?;
            match frame::unframe(&raw[..len], &self.vlans, self.bound) {
                Unframed::Datagram(datagram) => {
                    let n = datagram.payload.len().min(buf.len());
                    buf[..n].copy_from_slice(&datagram.payload[..n]);
                    return Ok((n, SocketAddr::V4(datagram.source)));
                }
                Unframed::NotForUs(reason) => {
                    tracing::trace!(?reason, len, "frame discarded");
                }
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn open_packet_socket(interface: &str) -> Result<socket2::Socket, SocketError> {
    use socket2::{Domain, Protocol, Socket, Type};
    use std::os::fd::AsRawFd;

    let index = super::interface_index(interface)?;
    let protocol = (libc::ETH_P_ALL as u16).to_be();

    let socket = Socket::new(
        Domain::from(libc::AF_PACKET),
        Type::from(libc::SOCK_RAW),
        Some(Protocol::from(i32::from(protocol))),
    )
    .map_err(SocketError::CreateSocket)?;

    // SAFETY: `sockaddr_ll` is plain data; all-zero is a valid value.
    let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
    addr.sll_family = libc::AF_PACKET as libc::c_ushort;
    addr.sll_protocol = protocol;
    addr.sll_ifindex = index as libc::c_int;

    // SAFETY: the descriptor is owned by `socket` and `addr` outlives the call.
    let ret = unsafe {
        libc::bind(
            socket.as_raw_fd(),
            &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(SocketError::BindToDevice {
            interface: interface.to_string(),
            source: io::Error::last_os_error(),
        });
    }

    socket
        .set_nonblocking(true)
        .map_err(SocketError::SetNonBlocking)?;
    Ok(socket)
}

#[cfg(not(target_os = "linux"))]
fn open_packet_socket(_interface: &str) -> Result<socket2::Socket, SocketError> {
    Err(SocketError::NotImplemented)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_read_buffer_fits_full_mtu_with_deep_vlan_stack() {
        let payload = vec![0u8; 1500 - 28];
        let vlans = [10, 20, 30, 40];
        let full = frame::frame(
            &payload,
            MacAddr::BROADCAST,
            MacAddr([2, 0, 0, 0, 0, 1]),
            SocketAddrV4::new(Ipv4Addr::BROADCAST, 68),
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 67),
            &vlans,
        )
        .unwrap();
        assert_eq!(full.len(), max_frame_len(vlans.len()));
        assert_eq!(max_frame_len(0), 1514);
    }

    #[tokio::test]
    async fn test_open_unknown_interface_fails() {
        let bound = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 68);
        assert!(BroadcastTransport::open("no-such-iface0", &[], bound)
            .await
            .is_err());
    }
}
