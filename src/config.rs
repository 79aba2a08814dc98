use crate::network::MacAddr;
use crate::transaction::RetryPolicy;
use clap::Parser;
use std::net::Ipv4Addr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// The network interface to bind to (e.g., 'eth0', 'lo')
    #[arg(short, long)]
    pub interface: String,

    /// VLAN ID to tag frames with; repeat for stacked tags, outermost first
    #[arg(long = "vlan", value_parser = clap::value_parser!(u16).range(0..4096))]
    pub vlans: Vec<u16>,

    /// Initial reply timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub timeout_ms: u64,

    /// Retransmissions before giving up on an exchange
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Use DHCPv6 (Solicit/Request) instead of DHCPv4
    #[arg(long)]
    pub v6: bool,

    /// Hardware address to use instead of the interface's own
    #[arg(long)]
    pub mac: Option<MacAddr>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub interface: String,
    pub mac_address: MacAddr,
    pub client_port: u16,
    pub server_port: u16,
    pub broadcast_address: Ipv4Addr,
    pub vlans: Vec<u16>,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new(interface: String, mac_address: MacAddr) -> Self {
        Self {
            interface,
            mac_address,
            client_port: 68,
            server_port: 67,
            broadcast_address: Ipv4Addr::BROADCAST,
            vlans: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Builds a configuration from the command line. `mac_address` is used
    /// unless `--mac` overrides it.
    pub fn from_args(args: &Args, mac_address: MacAddr) -> Self {
        let mut config = Self::new(args.interface.clone(), args.mac.unwrap_or(mac_address));
        config.vlans = args.vlans.clone();
        config.retry.timeout = Duration::from_millis(args.timeout_ms);
        config.retry.max_retries = args.retries;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: MacAddr = MacAddr([0x00, 0x0c, 0x29, 0xa8, 0x92, 0xf4]);

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["rawdhcp", "-i", "eth0"]).unwrap();
        assert_eq!(args.interface, "eth0");
        assert!(args.vlans.is_empty());
        assert!(!args.v6);

        let config = ClientConfig::from_args(&args, MAC);
        assert_eq!(config.mac_address, MAC);
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::try_parse_from([
            "rawdhcp",
            "--interface",
            "eth1",
            "--vlan",
            "100",
            "--vlan",
            "200",
            "--timeout-ms",
            "250",
            "--retries",
            "1",
            "--mac",
            "02:00:00:00:00:01",
        ])
        .unwrap();
        let config = ClientConfig::from_args(&args, MAC);
        assert_eq!(config.vlans, vec![100, 200]);
        assert_eq!(config.retry.timeout, Duration::from_millis(250));
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.mac_address, MacAddr([2, 0, 0, 0, 0, 1]));
    }

    #[test]
    fn test_vlan_id_range() {
        assert!(Args::try_parse_from(["rawdhcp", "-i", "eth0", "--vlan", "4096"]).is_err());
        assert!(Args::try_parse_from(["rawdhcp", "-i", "eth0", "--mac", "nope"]).is_err());
    }
}
