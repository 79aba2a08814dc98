//! # rawdhcp - DHCP over raw link-layer sockets
//!
//! rawdhcp speaks DHCPv4 (with Apple's BSDP carried in vendor options) and
//! DHCPv6 from a host that has no address yet. It builds its own Ethernet,
//! 802.1Q, IPv4 and UDP headers, sends them through a packet socket bound to
//! one interface, and retries each exchange until a matching reply arrives.
//!
//! ## Layers
//!
//! - [`options`]: TLV option codec shared by DHCPv4, DHCPv6 and BSDP
//! - [`v4`], [`v6`], [`bsdp`]: message models and builders
//! - [`network`]: link framing and transports
//! - [`transaction`]: retransmission, timeouts and cancellation
//! - [`client`]: DORA and Solicit/Request exchanges
//!
//! ## Example
//!
//! ```rust,no_run
//! use rawdhcp::{network, ClientConfig, DhcpClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mac = network::interface_mac("eth0").await?;
//!     let config = ClientConfig::new("eth0".to_string(), mac);
//!     let client = DhcpClient::new(config).await?;
//!     let lease = client.run().await?;
//!     println!("Obtained lease: {:?}", lease);
//!     Ok(())
//! }
//! ```

pub mod bsdp;
pub mod client;
pub mod config;
pub mod error;
pub mod network;
pub mod options;
pub mod transaction;
pub mod v4;
pub mod v6;

pub use client::{DhcpClient, DhcpV6Client, Lease};
pub use config::{Args, ClientConfig};
pub use error::{DhcpError, Result};
pub use transaction::{RetryPolicy, Transaction, TransactionEngine, TransactionState};
