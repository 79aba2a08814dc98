//! Boot Server Discovery Protocol
//!
//! BSDP rides inside DHCPv4 INFORM/ACK messages: its parameters are
//! sub-options packed into the vendor-specific information option (43),
//! using the same TLV layout as the outer option area but a private code
//! space.

use crate::error::{DhcpError, Result};
use crate::network::MacAddr;
use crate::options::{
    DhcpOption, Layout, OptionCodec, OptionKind, OptionSequence, OptionValue, Registry, GENERIC,
};
use crate::v4::{self, Message, MessageType as DhcpMessageType, OptionCode};
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::net::Ipv4Addr;

/// BSDP protocol version 1.1, as sent by every known client.
pub const VERSION_1_1: u16 = 0x0101;
pub const DEFAULT_REPLY_PORT: u16 = 68;

/// Maximum DHCP message size advertised by clients.
const MAX_MESSAGE_SIZE: u16 = 1500;

/// Bit 7 of the first BootImageId byte.
const INSTALL_SHIFT: u8 = 7;
/// Bits 0-6 of the first BootImageId byte.
const IMAGE_TYPE_MASK: u8 = 0x7f;

/// BSDP sub-option codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BsdpCode {
    MessageType = 1,
    Version = 2,
    ServerIdentifier = 3,
    ServerPriority = 4,
    ReplyPort = 5,
    BootImageListPath = 6,
    DefaultBootImageId = 7,
    SelectedBootImageId = 8,
    BootImageList = 9,
    NetBoot1Firmware = 10,
    BootImageAttributesFilterList = 11,
    MaxMessageSize = 12,
    MachineName = 130,
}

impl From<BsdpCode> for u16 {
    fn from(code: BsdpCode) -> Self {
        code as u16
    }
}

pub static REGISTRY: Registry = Registry {
    name: "bsdp",
    entries: &[
        (BsdpCode::MessageType as u16, OptionKind::U8),
        (BsdpCode::Version as u16, OptionKind::U16),
        (BsdpCode::ServerIdentifier as u16, OptionKind::Ipv4),
        (BsdpCode::ServerPriority as u16, OptionKind::U16),
        (BsdpCode::ReplyPort as u16, OptionKind::U16),
        (BsdpCode::DefaultBootImageId as u16, OptionKind::BootImageId),
        (BsdpCode::SelectedBootImageId as u16, OptionKind::BootImageId),
        (BsdpCode::BootImageList as u16, OptionKind::BootImageList),
        (BsdpCode::MachineName as u16, OptionKind::Text),
    ],
    fallback: Some(&GENERIC),
};

/// Codec for the contents of option 43. Sub-option areas have no end marker.
pub static CODEC: OptionCodec = OptionCodec {
    layout: Layout::Narrow,
    terminated: false,
    registry: &REGISTRY,
};

/// DHCPv4 registry where option 43 is always decoded as a BSDP container.
pub static MESSAGE_REGISTRY: Registry = Registry {
    name: "dhcpv4+bsdp",
    entries: &[(OptionCode::VendorSpecificInformation as u16, OptionKind::Nested(&CODEC))],
    fallback: Some(&v4::options::REGISTRY),
};

pub static MESSAGE_CODEC: OptionCodec = OptionCodec {
    layout: Layout::Narrow,
    terminated: true,
    registry: &MESSAGE_REGISTRY,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    List,
    Select,
    Failed,
    Unknown(u8),
}

impl MessageType {
    pub fn from_option(option: &DhcpOption) -> Result<Self> {
        let value = option
            .expect_code(BsdpCode::MessageType)?
            .as_u8()
            .ok_or_else(|| DhcpError::InvalidValue("BSDP message type is not a byte".into()))?;
        Ok(Self::from(value))
    }
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::List,
            2 => Self::Select,
            3 => Self::Failed,
            other => Self::Unknown(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::List => 1,
            MessageType::Select => 2,
            MessageType::Failed => 3,
            MessageType::Unknown(other) => other,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::List => f.write_str("LIST"),
            MessageType::Select => f.write_str("SELECT"),
            MessageType::Failed => f.write_str("FAILED"),
            MessageType::Unknown(v) => write!(f, "unknown ({v})"),
        }
    }
}

/// Image type carried in the low 7 bits of a [`BootImageId`]. Values 4-127
/// are reserved and kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootImageType {
    MacOs9,
    MacOsX,
    MacOsXServer,
    HardwareDiagnostics,
    Reserved(u8),
}

impl BootImageType {
    pub fn name(self) -> &'static str {
        match self {
            BootImageType::MacOs9 => "macOS 9",
            BootImageType::MacOsX => "macOS",
            BootImageType::MacOsXServer => "macOS Server",
            BootImageType::HardwareDiagnostics => "Hardware Diagnostics",
            BootImageType::Reserved(_) => "unknown",
        }
    }
}

impl From<u8> for BootImageType {
    fn from(value: u8) -> Self {
        match value & IMAGE_TYPE_MASK {
            0 => Self::MacOs9,
            1 => Self::MacOsX,
            2 => Self::MacOsXServer,
            3 => Self::HardwareDiagnostics,
            other => Self::Reserved(other),
        }
    }
}

impl From<BootImageType> for u8 {
    fn from(value: BootImageType) -> Self {
        match value {
            BootImageType::MacOs9 => 0,
            BootImageType::MacOsX => 1,
            BootImageType::MacOsXServer => 2,
            BootImageType::HardwareDiagnostics => 3,
            BootImageType::Reserved(other) => other & IMAGE_TYPE_MASK,
        }
    }
}

/// Packed 4-byte boot image identifier.
///
/// ```text
/// byte 0: install(1) | image type(7)
/// byte 1: reserved, zero
/// byte 2-3: index, big-endian
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootImageId {
    pub install: bool,
    pub image_type: BootImageType,
    pub index: u16,
}

impl BootImageId {
    pub fn to_bytes(&self) -> [u8; 4] {
        let [hi, lo] = self.index.to_be_bytes();
        [
            (u8::from(self.install) << INSTALL_SHIFT) | u8::from(self.image_type),
            0,
            hi,
            lo,
        ]
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            install: bytes[0] >> INSTALL_SHIFT == 1,
            image_type: BootImageType::from(bytes[0]),
            index: u16::from_be_bytes([bytes[2], bytes[3]]),
        }
    }

    /// Extracts the identifier from a default (7) or selected (8) boot image
    /// sub-option, whichever `code` names.
    pub fn from_option(option: &DhcpOption, code: BsdpCode) -> Result<Self> {
        match option.expect_code(code)?.value {
            OptionValue::BootImageId(id) => Ok(id),
            OptionValue::Bytes(ref raw) => {
                let bytes: [u8; 4] = raw[..]
                    .try_into()
                    .map_err(|_| DhcpError::short("boot image ID", 4, raw.len()))?;
                Ok(Self::from_bytes(bytes))
            }
            _ => Err(DhcpError::InvalidValue(
                "boot image ID has an unexpected value type".into(),
            )),
        }
    }
}

impl fmt::Display for BootImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let install = if self.install {
            "installable"
        } else {
            "uninstallable"
        };
        write!(f, "[{}] {} {} image", self.index, install, self.image_type.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootImageListEntry {
    pub id: BootImageId,
    pub name: String,
}

impl fmt::Display for BootImageListEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.id, self.name)
    }
}

/// Decodes the value of a boot image list sub-option: a run of
/// `id(4) | name length(1) | name` records.
pub(crate) fn decode_boot_image_list(mut value: &[u8]) -> Result<Vec<BootImageListEntry>> {
    let mut entries = Vec::new();
    while !value.is_empty() {
        if value.len() < 5 {
            return Err(DhcpError::short("boot image list entry", 5, value.len()));
        }
        let id = BootImageId::from_bytes([value[0], value[1], value[2], value[3]]);
        let name_len = usize::from(value[4]);
        let name = value[5..]
            .get(..name_len)
            .ok_or_else(|| DhcpError::short("boot image name", name_len, value.len() - 5))?;
        // Names are display strings; a bad byte must not cost the other entries.
        let name = String::from_utf8_lossy(name).into_owned();
        entries.push(BootImageListEntry { id, name });
        value = &value[5 + name_len..];
    }
    Ok(entries)
}

pub(crate) fn encode_boot_image_list(
    entries: &[BootImageListEntry],
    out: &mut BytesMut,
) -> Result<()> {
    for entry in entries {
        let name_len = u8::try_from(entry.name.len()).map_err(|_| DhcpError::ValueTooLong {
            code: BsdpCode::BootImageList.into(),
            len: entry.name.len(),
            max: u8::MAX as usize,
        })?;
        out.put_slice(&entry.id.to_bytes());
        out.put_u8(name_len);
        out.put_slice(entry.name.as_bytes());
    }
    Ok(())
}

/// Returns the BSDP sub-options of `msg`, decoding option 43 if it was left
/// raw by the plain DHCPv4 codec.
pub fn vendor_options(msg: &Message) -> Result<Option<OptionSequence>> {
    let Some(option) = msg.options.get(OptionCode::VendorSpecificInformation) else {
        return Ok(None);
    };
    match &option.value {
        OptionValue::Nested(options) => Ok(Some(options.clone())),
        OptionValue::Bytes(raw) if raw.is_empty() => {
            Err(DhcpError::ZeroLength("vendor-specific information"))
        }
        OptionValue::Bytes(raw) => CODEC.decode(raw).map(Some),
        _ => Err(DhcpError::InvalidValue(
            "vendor-specific information has an unexpected value type".into(),
        )),
    }
}

/// Collects the boot images advertised in an ACK[LIST], across every boot
/// image list sub-option present.
pub fn parse_boot_image_list(ack: &Message) -> Result<Vec<BootImageListEntry>> {
    let options = vendor_options(ack)?
        .ok_or_else(|| DhcpError::InvalidValue("ACK carries no BSDP options".into()))?;
    let mut images = Vec::new();
    for option in options.get_all(BsdpCode::BootImageList) {
        match &option.value {
            OptionValue::BootImageList(entries) => images.extend(entries.iter().cloned()),
            _ => {
                return Err(DhcpError::InvalidValue(
                    "boot image list has an unexpected value type".into(),
                ))
            }
        }
    }
    Ok(images)
}

/// The BSDP message type of `msg`, if it carries BSDP options at all.
pub fn message_type(msg: &Message) -> Result<Option<MessageType>> {
    let Some(options) = vendor_options(msg)? else {
        return Ok(None);
    };
    options
        .get(BsdpCode::MessageType)
        .map(MessageType::from_option)
        .transpose()
}

fn inform(mac: &MacAddr, xid: u32, client_ip: Ipv4Addr, vendor_class: &str) -> Message {
    let mut msg = v4::build_inform(mac, xid, client_ip);
    msg.options.insert(DhcpOption::new(
        OptionCode::ParameterRequestList,
        OptionValue::Bytes(
            vec![
                OptionCode::VendorSpecificInformation as u8,
                OptionCode::ClassIdentifier as u8,
            ]
            .into(),
        ),
    ));
    msg.options.insert(DhcpOption::new(
        OptionCode::MaximumMessageSize,
        OptionValue::U16(MAX_MESSAGE_SIZE),
    ));
    msg.options.insert(DhcpOption::new(
        OptionCode::ClassIdentifier,
        OptionValue::Text(vendor_class.to_owned()),
    ));
    msg
}

fn base_vendor_options(kind: MessageType, reply_port: u16) -> OptionSequence {
    let mut options: OptionSequence = [
        DhcpOption::new(BsdpCode::MessageType, OptionValue::U8(kind.into())),
        DhcpOption::new(BsdpCode::Version, OptionValue::U16(VERSION_1_1)),
    ]
    .into_iter()
    .collect();
    if reply_port != DEFAULT_REPLY_PORT {
        options.push(DhcpOption::new(
            BsdpCode::ReplyPort,
            OptionValue::U16(reply_port),
        ));
    }
    options
}

/// Builds an INFORM[LIST] asking boot servers for their image lists.
pub fn build_inform_list(
    mac: &MacAddr,
    xid: u32,
    client_ip: Ipv4Addr,
    vendor_class: &str,
    reply_port: u16,
) -> Message {
    let mut msg = inform(mac, xid, client_ip, vendor_class);
    msg.options.insert(DhcpOption::new(
        OptionCode::VendorSpecificInformation,
        OptionValue::Nested(base_vendor_options(MessageType::List, reply_port)),
    ));
    msg
}

/// Builds an INFORM[SELECT] choosing `image` from `server`.
pub fn build_inform_select(
    mac: &MacAddr,
    xid: u32,
    client_ip: Ipv4Addr,
    vendor_class: &str,
    reply_port: u16,
    server: Ipv4Addr,
    image: BootImageId,
) -> Message {
    let mut vendor = base_vendor_options(MessageType::Select, reply_port);
    vendor.push(DhcpOption::new(
        BsdpCode::ServerIdentifier,
        OptionValue::Ipv4(server),
    ));
    vendor.push(DhcpOption::new(
        BsdpCode::SelectedBootImageId,
        OptionValue::BootImageId(image),
    ));

    let mut msg = inform(mac, xid, client_ip, vendor_class);
    msg.options.insert(DhcpOption::new(
        OptionCode::VendorSpecificInformation,
        OptionValue::Nested(vendor),
    ));
    msg
}

/// Builds the ACK[LIST] a boot server sends in answer to `request`.
pub fn build_ack_list(
    request: &Message,
    server: Ipv4Addr,
    priority: u16,
    default_image: Option<BootImageId>,
    images: Vec<BootImageListEntry>,
) -> Message {
    let mut reply = Message::new_reply(request);
    reply.options.insert(DhcpOption::new(
        OptionCode::MessageType,
        OptionValue::U8(DhcpMessageType::Ack as u8),
    ));
    reply.options.insert(DhcpOption::new(
        OptionCode::ServerIdentifier,
        OptionValue::Ipv4(server),
    ));

    let mut vendor: OptionSequence = [
        DhcpOption::new(BsdpCode::MessageType, OptionValue::U8(MessageType::List.into())),
        DhcpOption::new(BsdpCode::ServerPriority, OptionValue::U16(priority)),
    ]
    .into_iter()
    .collect();
    if let Some(id) = default_image {
        vendor.push(DhcpOption::new(
            BsdpCode::DefaultBootImageId,
            OptionValue::BootImageId(id),
        ));
    }
    if !images.is_empty() {
        vendor.push(DhcpOption::new(
            BsdpCode::BootImageList,
            OptionValue::BootImageList(images),
        ));
    }
    reply.options.insert(DhcpOption::new(
        OptionCode::VendorSpecificInformation,
        OptionValue::Nested(vendor),
    ));
    reply
}
