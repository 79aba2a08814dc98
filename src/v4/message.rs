//! DHCPv4 message model (RFC 2131)
//!
//! ```text
//! op(1) htype(1) hlen(1) hops(1) | xid(4) | secs(2) flags(2)
//! ciaddr(4) | yiaddr(4) | siaddr(4) | giaddr(4)
//! chaddr(16) | sname(64) | file(128) | magic cookie(4) | options
//! ```
//!
//! All multi-byte fields are big-endian.

use super::options::{MessageType, OptionCode, CODEC};
use crate::error::{DhcpError, Result};
use crate::network::MacAddr;
use crate::options::{DhcpOption, OptionCodec, OptionSequence, OptionValue};
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;
use std::net::Ipv4Addr;

pub const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];
pub const BROADCAST_FLAG: u16 = 0x8000;
pub const HTYPE_ETHERNET: u8 = 1;

const CHADDR_LEN: usize = 16;
const SNAME_LEN: usize = 64;
const FILE_LEN: usize = 128;
const HEADER_LEN: usize = 236;
const OPTIONS_OFFSET: usize = HEADER_LEN + MAGIC_COOKIE.len();

/// BOOTP relay agents expect at least this many bytes.
const MIN_PACKET_LEN: usize = 300;
const ENCODE_CAPACITY: usize = 576;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    BootRequest,
    BootReply,
    Unknown(u8),
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::BootRequest,
            2 => Self::BootReply,
            other => Self::Unknown(other),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::BootRequest => 1,
            Opcode::BootReply => 2,
            Opcode::Unknown(other) => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub opcode: Opcode,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: [u8; CHADDR_LEN],
    pub sname: [u8; SNAME_LEN],
    pub file: [u8; FILE_LEN],
    pub options: OptionSequence,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            opcode: Opcode::BootRequest,
            htype: HTYPE_ETHERNET,
            hlen: 6,
            hops: 0,
            xid: 0,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: [0; CHADDR_LEN],
            sname: [0; SNAME_LEN],
            file: [0; FILE_LEN],
            options: OptionSequence::new(),
        }
    }
}

impl Message {
    /// Decodes a message using the standard DHCPv4 option table.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        Self::decode_with(buf, &CODEC)
    }

    /// Decodes a message, dispatching options through `codec`.
    pub fn decode_with(buf: &[u8], codec: &OptionCodec) -> Result<Self> {
        if buf.is_empty() {
            return Err(DhcpError::ZeroLength("DHCPv4 message"));
        }
        if buf.len() < OPTIONS_OFFSET {
            return Err(DhcpError::short("DHCPv4 header", OPTIONS_OFFSET, buf.len()));
        }
        let cookie = [
            buf[HEADER_LEN],
            buf[HEADER_LEN + 1],
            buf[HEADER_LEN + 2],
            buf[HEADER_LEN + 3],
        ];
        if cookie != MAGIC_COOKIE {
            return Err(DhcpError::InvalidMagicCookie(cookie));
        }

        let mut header = &buf[..HEADER_LEN];
        let mut msg = Message {
            opcode: Opcode::from(header.get_u8()),
            htype: header.get_u8(),
            hlen: header.get_u8(),
            hops: header.get_u8(),
            xid: header.get_u32(),
            secs: header.get_u16(),
            flags: header.get_u16(),
            ciaddr: Ipv4Addr::from(header.get_u32()),
            yiaddr: Ipv4Addr::from(header.get_u32()),
            siaddr: Ipv4Addr::from(header.get_u32()),
            giaddr: Ipv4Addr::from(header.get_u32()),
            ..Default::default()
        };
        header.copy_to_slice(&mut msg.chaddr);
        header.copy_to_slice(&mut msg.sname);
        header.copy_to_slice(&mut msg.file);

        msg.options = codec.decode(&buf[OPTIONS_OFFSET..])?;
        Ok(msg)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        self.encode_with(&CODEC)
    }

    pub fn encode_with(&self, codec: &OptionCodec) -> Result<Vec<u8>> {
        let mut out = BytesMut::with_capacity(ENCODE_CAPACITY);
        out.put_u8(self.opcode.into());
        out.put_u8(self.htype);
        out.put_u8(self.hlen);
        out.put_u8(self.hops);
        out.put_u32(self.xid);
        out.put_u16(self.secs);
        out.put_u16(self.flags);
        out.put_slice(&self.ciaddr.octets());
        out.put_slice(&self.yiaddr.octets());
        out.put_slice(&self.siaddr.octets());
        out.put_slice(&self.giaddr.octets());
        out.put_slice(&self.chaddr);
        out.put_slice(&self.sname);
        out.put_slice(&self.file);
        out.put_slice(&MAGIC_COOKIE);
        codec.encode(&self.options, &mut out)?;
        if out.len() < MIN_PACKET_LEN {
            out.resize(MIN_PACKET_LEN, 0);
        }
        Ok(out.to_vec())
    }

    /// Starts a reply to `request`, carrying over every field the client
    /// and relays use to correlate it. The caller adds the rest.
    pub fn new_reply(request: &Message) -> Self {
        let mut reply = Message {
            opcode: Opcode::BootReply,
            htype: request.htype,
            hlen: request.hlen,
            xid: request.xid,
            flags: request.flags,
            giaddr: request.giaddr,
            chaddr: request.chaddr,
            ..Default::default()
        };
        if let Some(relay) = request.options.get(OptionCode::RelayAgentInformation) {
            reply.options.push(relay.clone());
        }
        reply
    }

    pub fn set_chaddr(&mut self, hwaddr: &[u8]) -> &mut Self {
        let len = hwaddr.len().min(CHADDR_LEN);
        self.chaddr = [0; CHADDR_LEN];
        self.chaddr[..len].copy_from_slice(&hwaddr[..len]);
        self.hlen = len as u8;
        self
    }

    /// The client hardware address, `hlen` bytes long.
    pub fn client_hwaddr(&self) -> &[u8] {
        &self.chaddr[..usize::from(self.hlen).min(CHADDR_LEN)]
    }

    pub fn is_broadcast(&self) -> bool {
        self.flags & BROADCAST_FLAG != 0
    }

    pub fn set_broadcast(&mut self, broadcast: bool) -> &mut Self {
        if broadcast {
            self.flags |= BROADCAST_FLAG;
        } else {
            self.flags &= !BROADCAST_FLAG;
        }
        self
    }

    pub fn server_name(&self) -> Option<&str> {
        c_string(&self.sname)
    }

    pub fn set_server_name(&mut self, name: &str) -> Result<&mut Self> {
        put_c_string(&mut self.sname, name, "server host name")?;
        Ok(self)
    }

    pub fn boot_file_name(&self) -> Option<&str> {
        c_string(&self.file)
    }

    pub fn set_boot_file_name(&mut self, name: &str) -> Result<&mut Self> {
        put_c_string(&mut self.file, name, "boot file name")?;
        Ok(self)
    }

    pub fn message_type(&self) -> Option<MessageType> {
        self.options
            .get(OptionCode::MessageType)
            .and_then(DhcpOption::as_u8)
            .and_then(|t| MessageType::try_from(t).ok())
    }

    pub fn set_message_type(&mut self, kind: MessageType) -> &mut Self {
        self.options.insert(DhcpOption::new(
            OptionCode::MessageType,
            OptionValue::U8(kind as u8),
        ));
        self
    }

    pub fn server_identifier(&self) -> Option<Ipv4Addr> {
        self.options
            .get(OptionCode::ServerIdentifier)
            .and_then(DhcpOption::as_ipv4)
    }
}

/// NUL-terminated field contents, `None` when empty or not UTF-8.
fn c_string(field: &[u8]) -> Option<&str> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    match std::str::from_utf8(&field[..end]) {
        Ok(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}

fn put_c_string(field: &mut [u8], value: &str, context: &'static str) -> Result<()> {
    // One byte is kept for the terminating NUL.
    if value.len() >= field.len() {
        return Err(DhcpError::InvalidValue(format!(
            "{context} of {} bytes exceeds {} bytes",
            value.len(),
            field.len() - 1
        )));
    }
    field.fill(0);
    field[..value.len()].copy_from_slice(value.as_bytes());
    Ok(())
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DHCPv4 Message")?;
        writeln!(f, "  opcode: {:?}", self.opcode)?;
        writeln!(f, "  hwtype: {}", self.htype)?;
        writeln!(f, "  hopcount: {}", self.hops)?;
        writeln!(f, "  transaction ID: {:#010x}", self.xid)?;
        writeln!(f, "  num seconds: {}", self.secs)?;
        let flags = if self.is_broadcast() { "Broadcast" } else { "Unicast" };
        writeln!(f, "  flags: {} ({:#06x})", flags, self.flags)?;
        writeln!(f, "  client IP: {}", self.ciaddr)?;
        writeln!(f, "  your IP: {}", self.yiaddr)?;
        writeln!(f, "  server IP: {}", self.siaddr)?;
        writeln!(f, "  gateway IP: {}", self.giaddr)?;
        let hwaddr: Vec<String> = self
            .client_hwaddr()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        writeln!(f, "  client MAC: {}", hwaddr.join(":"))?;
        writeln!(f, "  server hostname: {}", self.server_name().unwrap_or(""))?;
        writeln!(f, "  bootfile name: {}", self.boot_file_name().unwrap_or(""))?;
        writeln!(f, "  options:")?;
        for option in &self.options {
            let name = OptionCode::describe(option.code);
            match (option.code, option.as_u8()) {
                (53, Some(t)) => match MessageType::try_from(t) {
                    Ok(kind) => writeln!(f, "    {name}: {kind}")?,
                    Err(other) => writeln!(f, "    {name}: unknown ({other})")?,
                },
                _ => writeln!(f, "    {name}: {}", option.value)?,
            }
        }
        Ok(())
    }
}

fn client_identifier(mac: &MacAddr) -> DhcpOption {
    let mut id = Vec::with_capacity(7);
    id.push(HTYPE_ETHERNET);
    id.extend_from_slice(&mac.octets());
    DhcpOption::new(OptionCode::ClientIdentifier, OptionValue::Bytes(id.into()))
}

fn parameter_request_list() -> DhcpOption {
    DhcpOption::new(
        OptionCode::ParameterRequestList,
        OptionValue::Bytes(
            vec![
                OptionCode::SubnetMask as u8,
                OptionCode::Router as u8,
                OptionCode::DomainNameServer as u8,
                OptionCode::DomainName as u8,
            ]
            .into(),
        ),
    )
}

fn client_message(mac: &MacAddr, xid: u32, kind: MessageType) -> Message {
    let mut msg = Message {
        xid,
        ..Default::default()
    };
    msg.set_chaddr(&mac.octets()).set_message_type(kind);
    msg
}

/// Constructs a DHCP Discover message.
pub fn build_discover(mac: &MacAddr, xid: u32) -> Message {
    let mut msg = client_message(mac, xid, MessageType::Discover);
    msg.set_broadcast(true);
    msg.options.push(client_identifier(mac));
    msg.options.push(parameter_request_list());
    msg
}

/// Constructs a DHCP Request for the address offered by `server_ip`.
pub fn build_request(
    mac: &MacAddr,
    xid: u32,
    offered_ip: Ipv4Addr,
    server_ip: Ipv4Addr,
) -> Message {
    let mut msg = client_message(mac, xid, MessageType::Request);
    msg.set_broadcast(true);
    msg.options.push(DhcpOption::new(
        OptionCode::RequestedIpAddress,
        OptionValue::Ipv4(offered_ip),
    ));
    msg.options.push(DhcpOption::new(
        OptionCode::ServerIdentifier,
        OptionValue::Ipv4(server_ip),
    ));
    msg.options.push(client_identifier(mac));
    msg.options.push(parameter_request_list());
    msg
}

/// Constructs a DHCP Inform from a client that already owns `client_ip`.
pub fn build_inform(mac: &MacAddr, xid: u32, client_ip: Ipv4Addr) -> Message {
    let mut msg = client_message(mac, xid, MessageType::Inform);
    msg.ciaddr = client_ip;
    msg.options.push(client_identifier(mac));
    msg.options.push(parameter_request_list());
    msg
}
