//! DHCPv6 client/server messages: `msg-type(1) | transaction-id(3) | options`.

use super::options::{MessageType, OptionCode, CODEC};
use crate::error::{DhcpError, Result};
use crate::network::MacAddr;
use crate::options::{DhcpOption, OptionSequence, OptionValue};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};

pub const CLIENT_PORT: u16 = 546;
pub const SERVER_PORT: u16 = 547;
pub const ALL_DHCP_RELAY_AGENTS_AND_SERVERS: Ipv6Addr =
    Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 1, 2);

const HEADER_LEN: usize = 4;
const DUID_LL: u16 = 3;
const HWTYPE_ETHERNET: u16 = 1;

/// Destination for client messages on the link identified by `scope_id`.
pub fn server_multicast(scope_id: u32) -> SocketAddr {
    SocketAddr::V6(SocketAddrV6::new(
        ALL_DHCP_RELAY_AGENTS_AND_SERVERS,
        SERVER_PORT,
        0,
        scope_id,
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub msg_type: MessageType,
    pub xid: [u8; 3],
    pub options: OptionSequence,
}

impl Message {
    pub fn new(msg_type: MessageType, xid: [u8; 3]) -> Self {
        Self {
            msg_type,
            xid,
            options: OptionSequence::new(),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.is_empty() {
            return Err(DhcpError::ZeroLength("DHCPv6 message"));
        }
        if buf.len() < HEADER_LEN {
            return Err(DhcpError::short("DHCPv6 header", HEADER_LEN, buf.len()));
        }
        let msg_type = MessageType::from(buf[0]);
        if matches!(msg_type, MessageType::RelayForw | MessageType::RelayRepl) {
            return Err(DhcpError::Unsupported(format!("{msg_type} messages")));
        }
        Ok(Self {
            msg_type,
            xid: [buf[1], buf[2], buf[3]],
            options: CODEC.decode(&buf[HEADER_LEN..])?,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = BytesMut::with_capacity(HEADER_LEN + 64);
        out.put_u8(self.msg_type.into());
        out.put_slice(&self.xid);
        CODEC.encode(&self.options, &mut out)?;
        Ok(out.to_vec())
    }

    pub fn server_id(&self) -> Option<&[u8]> {
        self.options
            .get(OptionCode::ServerId)
            .and_then(DhcpOption::as_bytes)
    }

    pub fn preference(&self) -> u8 {
        self.options
            .get(OptionCode::Preference)
            .and_then(DhcpOption::as_u8)
            .unwrap_or(0)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DHCPv6 Message")?;
        writeln!(f, "  messageType: {}", self.msg_type)?;
        writeln!(
            f,
            "  transactionID: 0x{:02x}{:02x}{:02x}",
            self.xid[0], self.xid[1], self.xid[2]
        )?;
        writeln!(f, "  options:")?;
        for option in &self.options {
            writeln!(f, "    {}: {}", option.code, option.value)?;
        }
        Ok(())
    }
}

pub fn random_xid() -> [u8; 3] {
    rand::random()
}

/// DUID-LL (RFC 8415 §11.4) for an Ethernet interface.
pub fn duid_ll(mac: &MacAddr) -> Bytes {
    let mut duid = BytesMut::with_capacity(10);
    duid.put_u16(DUID_LL);
    duid.put_u16(HWTYPE_ETHERNET);
    duid.put_slice(&mac.octets());
    duid.freeze()
}

/// An IA_NA with no addresses and T1/T2 left to the server.
fn ia_na(iaid: u32) -> DhcpOption {
    let mut ia = BytesMut::with_capacity(12);
    ia.put_u32(iaid);
    ia.put_u32(0);
    ia.put_u32(0);
    DhcpOption::new(OptionCode::IaNa, OptionValue::Bytes(ia.freeze()))
}

fn client_message(msg_type: MessageType, mac: &MacAddr, xid: [u8; 3]) -> Message {
    let mut msg = Message::new(msg_type, xid);
    msg.options.push(DhcpOption::new(
        OptionCode::ClientId,
        OptionValue::Bytes(duid_ll(mac)),
    ));
    msg.options
        .push(DhcpOption::new(OptionCode::ElapsedTime, OptionValue::U16(0)));
    let mut oro = BytesMut::with_capacity(4);
    oro.put_u16(OptionCode::DnsServers.into());
    oro.put_u16(OptionCode::DomainList.into());
    msg.options
        .push(DhcpOption::new(OptionCode::Oro, OptionValue::Bytes(oro.freeze())));
    msg
}

pub fn build_solicit(mac: &MacAddr, xid: [u8; 3], iaid: u32) -> Message {
    let mut msg = client_message(MessageType::Solicit, mac, xid);
    msg.options.push(ia_na(iaid));
    msg
}

/// Builds the Request answering `advertise`, echoing its server identifier
/// and the identity associations it offered.
pub fn build_request(advertise: &Message, mac: &MacAddr) -> Result<Message> {
    let server_id = advertise
        .options
        .get(OptionCode::ServerId)
        .ok_or_else(|| DhcpError::InvalidValue("Advertise carries no server identifier".into()))?;

    let mut msg = client_message(MessageType::Request, mac, advertise.xid);
    msg.options.push(server_id.clone());
    for ia in advertise.options.get_all(OptionCode::IaNa) {
        msg.options.push(ia.clone());
    }
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac() -> MacAddr {
        MacAddr([0x00, 0x0c, 0x29, 0xa8, 0x92, 0xf4])
    }

    #[test]
    fn test_solicit_layout() {
        let msg = build_solicit(&mac(), [1, 2, 3], 0xcafe);
        let wire = msg.encode().unwrap();
        assert_eq!(&wire[..4], [1, 1, 2, 3]);
        assert_eq!(
            &wire[4..18],
            [0, 1, 0, 10, 0, 3, 0, 1, 0x00, 0x0c, 0x29, 0xa8, 0x92, 0xf4]
        );
        assert_eq!(Message::decode(&wire).unwrap(), msg);
    }

    #[test]
    fn test_vendor_opts_are_nested() {
        let mut msg = Message::new(MessageType::Advertise, [9, 9, 9]);
        msg.options.push(DhcpOption::new(
            OptionCode::VendorOpts,
            OptionValue::Vendor {
                enterprise: 4874,
                options: [DhcpOption::new(1u16, OptionValue::Bytes(b"ztp".to_vec().into()))]
                    .into_iter()
                    .collect(),
            },
        ));
        let wire = msg.encode().unwrap();
        assert_eq!(
            &wire[4..],
            [0, 17, 0, 11, 0, 0, 0x13, 0x0a, 0, 1, 0, 3, b'z', b't', b'p']
        );
        assert_eq!(Message::decode(&wire).unwrap(), msg);
    }

    #[test]
    fn test_short_vendor_opts_fail() {
        let wire = [2, 0, 0, 1, 0, 17, 0, 2, 0, 0];
        assert!(matches!(
            Message::decode(&wire),
            Err(DhcpError::MalformedLength { needed: 4, .. })
        ));
    }

    #[test]
    fn test_request_echoes_advertise() {
        let mut advertise = Message::new(MessageType::Advertise, [4, 5, 6]);
        advertise.options.push(DhcpOption::new(
            OptionCode::ServerId,
            OptionValue::Bytes(vec![0, 1, 2, 3].into()),
        ));
        advertise.options.push(ia_na(7));
        advertise
            .options
            .push(DhcpOption::new(OptionCode::Preference, OptionValue::U8(255)));

        let request = build_request(&advertise, &mac()).unwrap();
        assert_eq!(request.msg_type, MessageType::Request);
        assert_eq!(request.xid, advertise.xid);
        assert_eq!(request.server_id(), Some(&[0, 1, 2, 3][..]));
        assert_eq!(request.options.get_all(OptionCode::IaNa).count(), 1);
        assert_eq!(advertise.preference(), 255);

        advertise.options.remove(OptionCode::ServerId);
        assert!(build_request(&advertise, &mac()).is_err());
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(Message::decode(&[]), Err(DhcpError::ZeroLength(_))));
        assert!(matches!(
            Message::decode(&[1, 0, 0]),
            Err(DhcpError::MalformedLength { needed: 4, .. })
        ));
        assert!(matches!(
            Message::decode(&[12, 0, 0, 0]),
            Err(DhcpError::Unsupported(_))
        ));
        assert!(matches!(
            Message::decode(&[7, 0, 0, 0, 0, 23, 0, 5, 0, 0, 0, 0, 0]),
            Err(DhcpError::MalformedLength { .. })
        ));
    }
}
