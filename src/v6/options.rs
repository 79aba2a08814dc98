//! DHCPv6 option codes (RFC 8415) and their dispatch table.

use crate::options::{Layout, OptionCodec, OptionKind, Registry, GENERIC};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum OptionCode {
    ClientId = 1,
    ServerId = 2,
    IaNa = 3,
    IaTa = 4,
    IaAddr = 5,
    Oro = 6,
    Preference = 7,
    ElapsedTime = 8,
    RelayMsg = 9,
    StatusCode = 13,
    RapidCommit = 14,
    UserClass = 15,
    VendorClass = 16,
    VendorOpts = 17,
    InterfaceId = 18,
    DnsServers = 23,
    DomainList = 24,
    IaPd = 25,
}

impl From<OptionCode> for u16 {
    fn from(code: OptionCode) -> Self {
        code as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Solicit,
    Advertise,
    Request,
    Confirm,
    Renew,
    Rebind,
    Reply,
    Release,
    Decline,
    Reconfigure,
    InformationRequest,
    RelayForw,
    RelayRepl,
    Unknown(u8),
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Solicit,
            2 => Self::Advertise,
            3 => Self::Request,
            4 => Self::Confirm,
            5 => Self::Renew,
            6 => Self::Rebind,
            7 => Self::Reply,
            8 => Self::Release,
            9 => Self::Decline,
            10 => Self::Reconfigure,
            11 => Self::InformationRequest,
            12 => Self::RelayForw,
            13 => Self::RelayRepl,
            other => Self::Unknown(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Solicit => 1,
            MessageType::Advertise => 2,
            MessageType::Request => 3,
            MessageType::Confirm => 4,
            MessageType::Renew => 5,
            MessageType::Rebind => 6,
            MessageType::Reply => 7,
            MessageType::Release => 8,
            MessageType::Decline => 9,
            MessageType::Reconfigure => 10,
            MessageType::InformationRequest => 11,
            MessageType::RelayForw => 12,
            MessageType::RelayRepl => 13,
            MessageType::Unknown(other) => other,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Solicit => f.write_str("SOLICIT"),
            Self::Advertise => f.write_str("ADVERTISE"),
            Self::Request => f.write_str("REQUEST"),
            Self::Confirm => f.write_str("CONFIRM"),
            Self::Renew => f.write_str("RENEW"),
            Self::Rebind => f.write_str("REBIND"),
            Self::Reply => f.write_str("REPLY"),
            Self::Release => f.write_str("RELEASE"),
            Self::Decline => f.write_str("DECLINE"),
            Self::Reconfigure => f.write_str("RECONFIGURE"),
            Self::InformationRequest => f.write_str("INFORMATION-REQUEST"),
            Self::RelayForw => f.write_str("RELAY-FORW"),
            Self::RelayRepl => f.write_str("RELAY-REPL"),
            Self::Unknown(v) => write!(f, "unknown ({v})"),
        }
    }
}

/// Sub-options of a vendor-opts option, after the enterprise number.
pub static VENDOR_CODEC: OptionCodec = OptionCodec {
    layout: Layout::Wide,
    terminated: false,
    registry: &GENERIC,
};

pub static REGISTRY: Registry = Registry {
    name: "dhcpv6",
    entries: &[
        (OptionCode::Preference as u16, OptionKind::U8),
        (OptionCode::ElapsedTime as u16, OptionKind::U16),
        (OptionCode::VendorOpts as u16, OptionKind::Vendor(&VENDOR_CODEC)),
        (OptionCode::DnsServers as u16, OptionKind::Ipv6List),
    ],
    fallback: None,
};

pub static CODEC: OptionCodec = OptionCodec {
    layout: Layout::Wide,
    terminated: false,
    registry: &REGISTRY,
};
