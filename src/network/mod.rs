use std::{
    io,
    net::{SocketAddr, UdpSocket as StdUdpSocket},
};
use thiserror::Error;
use tokio::net::UdpSocket as TokioUdpSocket;

pub mod broadcast;
pub mod channel;
pub mod frame;
pub mod udp;

pub use broadcast::BroadcastTransport;
pub use channel::ChannelTransport;
pub use frame::{frame, unframe, Datagram, Discard, MacAddr, Unframed, VlanTag};
pub use udp::UdpTransport;

/// Defines all possible errors for socket operations.
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("Failed to create a new socket")]
    CreateSocket(#[source] io::Error),

    #[error("Failed to enable broadcast on socket")]
    SetBroadcast(#[source] io::Error),

    #[error("Failed to set SO_BINDTODEVICE on interface '{interface}'")]
    BindToDevice {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to bind socket to address")]
    BindSocket(#[source] io::Error),

    #[error("Failed to set SO_REUSEADDR on socket")]
    SetReuseAddress(#[source] io::Error),

    #[error("Failed to set socket to non-blocking mode")]
    SetNonBlocking(#[source] io::Error),

    #[error("Failed to convert socket to TokioUdpSocket")]
    ConvertToTokio(#[source] io::Error),

    #[error("No interface named '{0}'")]
    InterfaceIndex(String),

    #[error("Failed to read the hardware address of '{interface}'")]
    InterfaceAddress {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to register socket with the async runtime")]
    Register(#[source] io::Error),

    #[error("Raw packet sockets are not implemented on this platform")]
    NotImplemented,
}

/// A datagram endpoint the transaction engine can drive.
///
/// Implementations deliver whole DHCP payloads: whatever framing the
/// underlying socket needs is added on send and stripped on receive.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn send_to(&self, payload: &[u8], destination: SocketAddr) -> io::Result<usize>;

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

/// Creates a new `tokio::net::UdpSocket` bound to a specific network device and address.
///
/// IPv4 sockets additionally get `SO_BROADCAST` so they can reach
/// `255.255.255.255`.
#[cfg(target_os = "linux")]
pub fn new_tokio_socket_bound_to_device(
    interface: &str,
    addr: SocketAddr,
) -> Result<TokioUdpSocket, SocketError> {
    use socket2::{Domain, Socket, Type};
    use std::os::fd::AsRawFd;

    let socket2 = Socket::new(Domain::for_address(addr), Type::DGRAM, None)
        .map_err(SocketError::CreateSocket)?;

    if addr.is_ipv4() {
        socket2
            .set_broadcast(true)
            .map_err(SocketError::SetBroadcast)?;
    }

    socket2
        .set_reuse_address(true)
        .map_err(SocketError::SetReuseAddress)?;

    // SAFETY: the descriptor is owned by `socket2` and the option value is a
    // byte string of the given length.
    let ret = unsafe {
        libc::setsockopt(
            socket2.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_BINDTODEVICE,
            interface.as_ptr() as *const libc::c_void,
            interface.len() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(SocketError::BindToDevice {
            interface: interface.to_string(),
            source: io::Error::last_os_error(),
        });
    }

    socket2.bind(&addr.into()).map_err(SocketError::BindSocket)?;

    let std_socket: StdUdpSocket = socket2.into();
    std_socket
        .set_nonblocking(true)
        .map_err(SocketError::SetNonBlocking)?;
    TokioUdpSocket::from_std(std_socket).map_err(SocketError::ConvertToTokio)
}

/// Fallback for non-Linux systems where `SO_BINDTODEVICE` is not available.
#[cfg(not(target_os = "linux"))]
pub fn new_tokio_socket_bound_to_device(
    _interface: &str,
    _addr: SocketAddr,
) -> Result<TokioUdpSocket, SocketError> {
    Err(SocketError::NotImplemented)
}

/// Index of `interface`, as used for link-scoped addresses and packet sockets.
pub fn interface_index(interface: &str) -> Result<u32, SocketError> {
    let name = std::ffi::CString::new(interface)
        .map_err(|_| SocketError::InterfaceIndex(interface.to_string()))?;
    // SAFETY: `name` is a valid NUL-terminated string for the whole call.
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    if index == 0 {
        return Err(SocketError::InterfaceIndex(interface.to_string()));
    }
    Ok(index)
}

/// Reads the hardware address of `interface` from sysfs.
pub async fn interface_mac(interface: &str) -> crate::error::Result<MacAddr> {
    let path = format!("/sys/class/net/{interface}/address");
    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| SocketError::InterfaceAddress {
            interface: interface.to_string(),
            source,
        })?;
    text.parse()
}

impl Transport for TokioUdpSocket {
    async fn send_to(&self, payload: &[u8], destination: SocketAddr) -> io::Result<usize> {
        TokioUdpSocket::send_to(self, payload, destination).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        TokioUdpSocket::recv_from(self, buf).await
    }
}
