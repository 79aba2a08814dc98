//! DHCP client implementation
//!
//! This module drives whole exchanges on top of the transaction engine:
//! - DHCPv4 DORA (Discover, Offer, Request, Ack) over the broadcast transport
//! - DHCPv6 Solicit, Advertise, Request, Reply over link-local UDP
//! - Lease extraction from the final Ack

use crate::config::ClientConfig;
use crate::error::{DhcpError, Result};
use crate::network::{self, BroadcastTransport, Transport, UdpTransport};
use crate::options::DhcpOption;
use crate::transaction::{RetryPolicy, Transaction, TransactionEngine};
use crate::v4::{self, MessageType, OptionCode};
use crate::v6;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fresh Discover rounds allowed after a server NAKs our Request.
const MAX_NAK_RESTARTS: u32 = 3;

/// Configuration handed out in a DHCPACK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub offered_ip: Ipv4Addr,
    pub subnet_mask: Option<Ipv4Addr>,
    pub routers: Option<Vec<Ipv4Addr>>,
    pub dns_servers: Option<Vec<Ipv4Addr>>,
    pub lease_duration: Option<Duration>,
    pub server_identifier: Option<Ipv4Addr>,
}

impl Lease {
    pub fn from_ack(msg: &v4::Message) -> Self {
        let opts = &msg.options;
        Self {
            offered_ip: msg.yiaddr,
            subnet_mask: opts.get(OptionCode::SubnetMask).and_then(DhcpOption::as_ipv4),
            routers: opts
                .get(OptionCode::Router)
                .and_then(DhcpOption::as_ipv4_list)
                .map(<[Ipv4Addr]>::to_vec),
            dns_servers: opts
                .get(OptionCode::DomainNameServer)
                .and_then(DhcpOption::as_ipv4_list)
                .map(<[Ipv4Addr]>::to_vec),
            lease_duration: opts
                .get(OptionCode::AddressLeaseTime)
                .and_then(DhcpOption::as_u32)
                .map(|secs| Duration::from_secs(u64::from(secs))),
            server_identifier: msg.server_identifier(),
        }
    }
}

pub struct DhcpClient<T> {
    config: ClientConfig,
    transport: T,
    cancel: CancellationToken,
}

impl DhcpClient<BroadcastTransport> {
    /// Opens a broadcast transport on the configured interface.
    pub async fn new(config: ClientConfig) -> Result<Self> {
        let bound = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.client_port);
        let transport = BroadcastTransport::open(&config.interface, &config.vlans, bound).await?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> DhcpClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancelling this token aborts whichever exchange is in flight.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn engine(&self) -> TransactionEngine<'_, T> {
        let destination =
            SocketAddrV4::new(self.config.broadcast_address, self.config.server_port);
        TransactionEngine::new(
            &self.transport,
            SocketAddr::V4(destination),
            self.config.retry,
            self.cancel.clone(),
        )
    }

    /// Broadcasts a Discover with `xid` and returns the first Offer.
    pub async fn discover(&self, xid: u32) -> Result<v4::Message> {
        let engine = self.engine();
        let mut txn = Transaction::new(
            v4::build_discover(&self.config.mac_address, xid),
            engine.policy(),
        );
        tracing::info!("Sending DHCPDISCOVER with xid 0x{:08x}", xid);
        let offer = engine
            .run(&mut txn, |m: &v4::Message| {
                m.message_type() == Some(MessageType::Offer)
            })
            .await?;
        tracing::info!(
            "Received DHCPOFFER of {} from {:?}",
            offer.yiaddr,
            offer.server_identifier()
        );
        Ok(offer)
    }

    /// Requests the address in `offer` from the server that made it.
    ///
    /// Returns the Ack; a NAK from that server becomes [`DhcpError::Nak`].
    pub async fn request(&self, offer: &v4::Message) -> Result<v4::Message> {
        let server = offer.server_identifier().ok_or_else(|| {
            DhcpError::Critical("offer carries no server identifier".to_string())
        })?;
        let engine = self.engine();
        let mut txn = Transaction::new(
            v4::build_request(&self.config.mac_address, offer.xid, offer.yiaddr, server),
            engine.policy(),
        );
        tracing::info!("Sending DHCPREQUEST for {} to {}", offer.yiaddr, server);
        let reply = engine
            .run(&mut txn, |m: &v4::Message| {
                matches!(
                    m.message_type(),
                    Some(MessageType::Ack) | Some(MessageType::Nak)
                ) && m.server_identifier().map_or(true, |id| id == server)
            })
            .await?;

        if reply.message_type() == Some(MessageType::Nak) {
            tracing::warn!("Received DHCPNAK from {}", server);
            return Err(DhcpError::Nak {
                server: reply.server_identifier(),
            });
        }
        Ok(reply)
    }

    /// Runs DORA until a lease is bound, starting over after a NAK.
    pub async fn run(&self) -> Result<Lease> {
        for round in 0..=MAX_NAK_RESTARTS {
            let xid: u32 = rand::random();
            let offer = self.discover(xid).await?;
            match self.request(&offer).await {
                Ok(ack) => {
                    let lease = Lease::from_ack(&ack);
                    tracing::info!("DHCP Bind Successful! Lease: {:?}", lease);
                    return Ok(lease);
                }
                Err(DhcpError::Nak { server }) => {
                    tracing::warn!(
                        "Request declined by {:?}, restarting discovery ({}/{})",
                        server,
                        round + 1,
                        MAX_NAK_RESTARTS
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Err(DhcpError::Critical(format!(
            "request declined {} times",
            MAX_NAK_RESTARTS + 1
        )))
    }
}

pub struct DhcpV6Client<T> {
    mac_address: network::MacAddr,
    transport: T,
    destination: SocketAddr,
    policy: RetryPolicy,
    cancel: CancellationToken,
    iaid: u32,
}

impl DhcpV6Client<UdpTransport> {
    /// Binds `[::]:546` on the configured interface and targets the
    /// link-scoped server multicast group.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let index = network::interface_index(&config.interface)?;
        let bind = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, v6::message::CLIENT_PORT, 0, 0);
        let transport = UdpTransport::open(&config.interface, SocketAddr::V6(bind))?;
        Ok(Self::with_transport(
            config,
            transport,
            v6::message::server_multicast(index),
        ))
    }
}

impl<T: Transport> DhcpV6Client<T> {
    pub fn with_transport(config: &ClientConfig, transport: T, destination: SocketAddr) -> Self {
        Self {
            mac_address: config.mac_address,
            transport,
            destination,
            policy: config.retry,
            cancel: CancellationToken::new(),
            iaid: rand::random(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn engine(&self) -> TransactionEngine<'_, T> {
        TransactionEngine::new(
            &self.transport,
            self.destination,
            self.policy,
            self.cancel.clone(),
        )
    }

    /// Multicasts a Solicit and returns the first Advertise.
    pub async fn solicit(&self) -> Result<v6::Message> {
        let engine = self.engine();
        let solicit = v6::build_solicit(&self.mac_address, v6::message::random_xid(), self.iaid);
        tracing::info!("Sending SOLICIT to {}", self.destination);
        let mut txn = Transaction::new(solicit, engine.policy());
        let advertise = engine
            .run(&mut txn, |m: &v6::Message| {
                m.msg_type == v6::MessageType::Advertise && m.server_id().is_some()
            })
            .await?;
        tracing::info!(
            "Received ADVERTISE with preference {}",
            advertise.preference()
        );
        Ok(advertise)
    }

    /// Requests the identity associations offered in `advertise`.
    pub async fn request(&self, advertise: &v6::Message) -> Result<v6::Message> {
        let request = v6::build_request(advertise, &self.mac_address)?;
        let server_id = advertise.server_id().map(<[u8]>::to_vec);
        let engine = self.engine();
        let mut txn = Transaction::new(request, engine.policy());
        tracing::info!("Sending REQUEST to {}", self.destination);
        engine
            .run(&mut txn, |m: &v6::Message| {
                m.msg_type == v6::MessageType::Reply && m.server_id() == server_id.as_deref()
            })
            .await
    }

    pub async fn run(&self) -> Result<v6::Message> {
        let advertise = self.solicit().await?;
        let reply = self.request(&advertise).await?;
        tracing::info!("DHCPv6 exchange complete:\n{}", reply);
        Ok(reply)
    }
}
