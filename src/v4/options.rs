//! DHCPv4 option codes (RFC 2132) and their dispatch table.

use crate::options::{Layout, OptionCodec, OptionKind, Registry, GENERIC};
use std::fmt;

/// DHCP option codes used by this crate. Other codes are carried as raw
/// bytes and displayed by number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OptionCode {
    Pad = 0,
    SubnetMask = 1,
    TimeOffset = 2,
    Router = 3,
    DomainNameServer = 6,
    Hostname = 12,
    DomainName = 15,
    InterfaceMtu = 26,
    BroadcastAddress = 28,
    NtpServers = 42,
    VendorSpecificInformation = 43,
    RequestedIpAddress = 50,
    AddressLeaseTime = 51,
    OptionOverload = 52,
    MessageType = 53,
    ServerIdentifier = 54,
    ParameterRequestList = 55,
    Message = 56,
    MaximumMessageSize = 57,
    RenewalTime = 58,
    RebindingTime = 59,
    ClassIdentifier = 60,
    ClientIdentifier = 61,
    TftpServerName = 66,
    BootfileName = 67,
    UserClass = 77,
    RelayAgentInformation = 82,
    End = 255,
}

impl OptionCode {
    const ALL: [OptionCode; 28] = [
        Self::Pad,
        Self::SubnetMask,
        Self::TimeOffset,
        Self::Router,
        Self::DomainNameServer,
        Self::Hostname,
        Self::DomainName,
        Self::InterfaceMtu,
        Self::BroadcastAddress,
        Self::NtpServers,
        Self::VendorSpecificInformation,
        Self::RequestedIpAddress,
        Self::AddressLeaseTime,
        Self::OptionOverload,
        Self::MessageType,
        Self::ServerIdentifier,
        Self::ParameterRequestList,
        Self::Message,
        Self::MaximumMessageSize,
        Self::RenewalTime,
        Self::RebindingTime,
        Self::ClassIdentifier,
        Self::ClientIdentifier,
        Self::TftpServerName,
        Self::BootfileName,
        Self::UserClass,
        Self::RelayAgentInformation,
        Self::End,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Pad => "Pad",
            Self::SubnetMask => "Subnet Mask",
            Self::TimeOffset => "Time Offset",
            Self::Router => "Router",
            Self::DomainNameServer => "Domain Name Server",
            Self::Hostname => "Host Name",
            Self::DomainName => "Domain Name",
            Self::InterfaceMtu => "Interface MTU",
            Self::BroadcastAddress => "Broadcast Address",
            Self::NtpServers => "NTP Servers",
            Self::VendorSpecificInformation => "Vendor Specific Information",
            Self::RequestedIpAddress => "Requested IP Address",
            Self::AddressLeaseTime => "IP Addresses Lease Time",
            Self::OptionOverload => "Option Overload",
            Self::MessageType => "DHCP Message Type",
            Self::ServerIdentifier => "Server Identifier",
            Self::ParameterRequestList => "Parameter Request List",
            Self::Message => "Message",
            Self::MaximumMessageSize => "Maximum DHCP Message Size",
            Self::RenewalTime => "Renew Time Value",
            Self::RebindingTime => "Rebinding Time Value",
            Self::ClassIdentifier => "Class Identifier",
            Self::ClientIdentifier => "Client identifier",
            Self::TftpServerName => "TFTP Server Name",
            Self::BootfileName => "Bootfile Name",
            Self::UserClass => "User Class Information",
            Self::RelayAgentInformation => "Relay Agent Information",
            Self::End => "End",
        }
    }

    /// Display name for any code, falling back to the number.
    pub fn describe(code: u16) -> String {
        match u8::try_from(code).ok().and_then(|c| Self::try_from(c).ok()) {
            Some(known) => known.name().to_owned(),
            None => format!("Option {code}"),
        }
    }
}

impl TryFrom<u8> for OptionCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|code| *code as u8 == value)
            .ok_or(value)
    }
}

impl From<OptionCode> for u16 {
    fn from(code: OptionCode) -> Self {
        code as u16
    }
}

/// DHCP message types (option 53).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Discover),
            2 => Ok(Self::Offer),
            3 => Ok(Self::Request),
            4 => Ok(Self::Decline),
            5 => Ok(Self::Ack),
            6 => Ok(Self::Nak),
            7 => Ok(Self::Release),
            8 => Ok(Self::Inform),
            other => Err(other),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Discover => "DISCOVER",
            Self::Offer => "OFFER",
            Self::Request => "REQUEST",
            Self::Decline => "DECLINE",
            Self::Ack => "ACK",
            Self::Nak => "NAK",
            Self::Release => "RELEASE",
            Self::Inform => "INFORM",
        })
    }
}

/// Relay agent sub-options (circuit ID, remote ID, ...) stay raw.
pub static RELAY_AGENT_CODEC: OptionCodec = OptionCodec {
    layout: Layout::Narrow,
    terminated: false,
    registry: &GENERIC,
};

pub static REGISTRY: Registry = Registry {
    name: "dhcpv4",
    entries: &[
        (OptionCode::SubnetMask as u16, OptionKind::Ipv4),
        (OptionCode::TimeOffset as u16, OptionKind::U32),
        (OptionCode::Router as u16, OptionKind::Ipv4List),
        (OptionCode::DomainNameServer as u16, OptionKind::Ipv4List),
        (OptionCode::Hostname as u16, OptionKind::Text),
        (OptionCode::DomainName as u16, OptionKind::Text),
        (OptionCode::InterfaceMtu as u16, OptionKind::U16),
        (OptionCode::BroadcastAddress as u16, OptionKind::Ipv4),
        (OptionCode::NtpServers as u16, OptionKind::Ipv4List),
        (OptionCode::RequestedIpAddress as u16, OptionKind::Ipv4),
        (OptionCode::AddressLeaseTime as u16, OptionKind::U32),
        (OptionCode::OptionOverload as u16, OptionKind::U8),
        (OptionCode::MessageType as u16, OptionKind::U8),
        (OptionCode::ServerIdentifier as u16, OptionKind::Ipv4),
        (OptionCode::Message as u16, OptionKind::Text),
        (OptionCode::MaximumMessageSize as u16, OptionKind::U16),
        (OptionCode::RenewalTime as u16, OptionKind::U32),
        (OptionCode::RebindingTime as u16, OptionKind::U32),
        (OptionCode::ClassIdentifier as u16, OptionKind::Text),
        (OptionCode::TftpServerName as u16, OptionKind::Text),
        (OptionCode::BootfileName as u16, OptionKind::Text),
        (
            OptionCode::RelayAgentInformation as u16,
            OptionKind::Nested(&RELAY_AGENT_CODEC),
        ),
    ],
    fallback: None,
};

/// Top-level DHCPv4 option area: pad/end markers, option 43 left raw.
pub static CODEC: OptionCodec = OptionCodec {
    layout: Layout::Narrow,
    terminated: true,
    registry: &REGISTRY,
};
