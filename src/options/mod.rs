//! Generic TLV option codec
//!
//! Every option area handled by this crate (the DHCPv4 option field, BSDP
//! vendor sub-options, relay agent sub-options, DHCPv6 options and DHCPv6
//! vendor options) is a sequence of `code | length | value` records. An
//! [`OptionCodec`] describes one such area: the width of the code and length
//! fields, whether the area uses the DHCPv4 pad/end markers, and a
//! [`Registry`] mapping codes to typed decoders.
//!
//! Container options ([`OptionKind::Nested`], [`OptionKind::Vendor`]) carry a
//! reference to the codec of their inner area and are decoded recursively on
//! the bounded value slice.

use crate::bsdp::{self, BootImageId, BootImageListEntry};
use crate::error::{DhcpError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Single-byte padding code, only meaningful in a terminated area.
pub const PAD: u8 = 0;
/// Terminates a DHCPv4 option area.
pub const END: u8 = 255;

/// Width of the code and length fields of each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// 1-byte code, 1-byte length (DHCPv4, BSDP, relay agent information).
    Narrow,
    /// 2-byte code, 2-byte length, big-endian (DHCPv6).
    Wide,
}

impl Layout {
    pub const fn header_len(self) -> usize {
        match self {
            Layout::Narrow => 2,
            Layout::Wide => 4,
        }
    }

    pub const fn max_value_len(self) -> usize {
        match self {
            Layout::Narrow => u8::MAX as usize,
            Layout::Wide => u16::MAX as usize,
        }
    }

    const fn max_code(self) -> u16 {
        match self {
            Layout::Narrow => u8::MAX as u16,
            Layout::Wide => u16::MAX,
        }
    }

    fn read_header(self, buf: &[u8]) -> Result<(u16, usize)> {
        let header_len = self.header_len();
        if buf.len() < header_len {
            return Err(DhcpError::short("option header", header_len, buf.len()));
        }
        Ok(match self {
            Layout::Narrow => (u16::from(buf[0]), usize::from(buf[1])),
            Layout::Wide => (
                u16::from_be_bytes([buf[0], buf[1]]),
                usize::from(u16::from_be_bytes([buf[2], buf[3]])),
            ),
        })
    }

    fn put_header(self, out: &mut BytesMut, code: u16, len: usize) {
        // Callers have already checked code and len against the layout limits.
        match self {
            Layout::Narrow => {
                out.put_u8(code as u8);
                out.put_u8(len as u8);
            }
            Layout::Wide => {
                out.put_u16(code);
                out.put_u16(len as u16);
            }
        }
    }
}

/// How the value bytes of a registered code are interpreted.
#[derive(Debug, Clone, Copy)]
pub enum OptionKind {
    Bytes,
    U8,
    U16,
    U32,
    Ipv4,
    Ipv4List,
    Ipv6List,
    Text,
    /// The value is itself an option area described by the given codec.
    Nested(&'static OptionCodec),
    /// A 4-byte enterprise number followed by an option area.
    Vendor(&'static OptionCodec),
    BootImageId,
    BootImageList,
}

impl OptionKind {
    /// Decodes `value`, which is exactly the bytes declared by the record.
    pub fn decode(self, value: &[u8]) -> Result<OptionValue> {
        Ok(match self {
            OptionKind::Bytes => OptionValue::Bytes(Bytes::copy_from_slice(value)),
            OptionKind::U8 => OptionValue::U8(u8::from_be_bytes(fixed(value)?)),
            OptionKind::U16 => OptionValue::U16(u16::from_be_bytes(fixed(value)?)),
            OptionKind::U32 => OptionValue::U32(u32::from_be_bytes(fixed(value)?)),
            OptionKind::Ipv4 => OptionValue::Ipv4(Ipv4Addr::from(fixed::<4>(value)?)),
            OptionKind::Ipv4List => OptionValue::Ipv4List(
                chunked::<4>(value, "IPv4 address list")?
                    .map(Ipv4Addr::from)
                    .collect(),
            ),
            OptionKind::Ipv6List => OptionValue::Ipv6List(
                chunked::<16>(value, "IPv6 address list")?
                    .map(Ipv6Addr::from)
                    .collect(),
            ),
            OptionKind::Text => {
                if value.is_empty() {
                    return Err(DhcpError::ZeroLength("text option"));
                }
                match std::str::from_utf8(value) {
                    Ok(text) => OptionValue::Text(text.to_owned()),
                    Err(_) => OptionValue::Bytes(Bytes::copy_from_slice(value)),
                }
            }
            OptionKind::Nested(codec) => {
                if value.is_empty() {
                    return Err(DhcpError::ZeroLength("container option"));
                }
                OptionValue::Nested(codec.decode(value)?)
            }
            OptionKind::Vendor(codec) => {
                let enterprise: [u8; 4] = value
                    .get(..4)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| DhcpError::short("enterprise number", 4, value.len()))?;
                OptionValue::Vendor {
                    enterprise: u32::from_be_bytes(enterprise),
                    options: codec.decode(&value[4..])?,
                }
            }
            OptionKind::BootImageId => {
                OptionValue::BootImageId(BootImageId::from_bytes(fixed(value)?))
            }
            OptionKind::BootImageList => {
                OptionValue::BootImageList(bsdp::decode_boot_image_list(value)?)
            }
        })
    }
}

fn fixed<const N: usize>(value: &[u8]) -> Result<[u8; N]> {
    value
        .try_into()
        .map_err(|_| DhcpError::short("option value", N, value.len()))
}

fn chunked<'a, const N: usize>(
    value: &'a [u8],
    context: &'static str,
) -> Result<impl Iterator<Item = [u8; N]> + 'a> {
    if value.is_empty() {
        return Err(DhcpError::ZeroLength(context));
    }
    if value.len() % N != 0 {
        return Err(DhcpError::short(
            context,
            value.len().next_multiple_of(N),
            value.len(),
        ));
    }
    Ok(value.chunks_exact(N).map(|chunk| {
        let mut out = [0u8; N];
        out.copy_from_slice(chunk);
        out
    }))
}

/// Per-protocol dispatch table. Codes missing from `entries` are looked up in
/// `fallback`, and finally decoded as raw bytes.
#[derive(Debug)]
pub struct Registry {
    pub name: &'static str,
    pub entries: &'static [(u16, OptionKind)],
    pub fallback: Option<&'static Registry>,
}

impl Registry {
    pub fn lookup(&self, code: u16) -> Option<OptionKind> {
        self.entries
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, kind)| *kind)
            .or_else(|| self.fallback.and_then(|f| f.lookup(code)))
    }

    pub fn kind(&self, code: u16) -> OptionKind {
        self.lookup(code).unwrap_or(OptionKind::Bytes)
    }
}

/// Registry with no typed entries: every option stays raw.
pub static GENERIC: Registry = Registry {
    name: "generic",
    entries: &[],
    fallback: None,
};

#[derive(Debug, Clone, Copy)]
pub struct OptionCodec {
    pub layout: Layout,
    /// Honour [`PAD`]/[`END`] on decode and append [`END`] on encode.
    pub terminated: bool,
    pub registry: &'static Registry,
}

impl OptionCodec {
    pub fn decode(&self, mut buf: &[u8]) -> Result<OptionSequence> {
        let mut options = OptionSequence::new();
        while let Some(&first) = buf.first() {
            if self.terminated {
                if first == END {
                    break;
                }
                if first == PAD {
                    buf = &buf[1..];
                    continue;
                }
            }
            let (code, len) = self.layout.read_header(buf)?;
            let rest = &buf[self.layout.header_len()..];
            let value = rest
                .get(..len)
                .ok_or_else(|| DhcpError::short("option value", len, rest.len()))?;
            options.push(DhcpOption {
                code,
                value: self.registry.kind(code).decode(value)?,
            });
            buf = &rest[len..];
        }
        Ok(options)
    }

    pub fn encode(&self, options: &OptionSequence, out: &mut BytesMut) -> Result<()> {
        for option in options.iter() {
            self.encode_option(option, out)?;
        }
        if self.terminated {
            out.put_u8(END);
        }
        Ok(())
    }

    pub fn encode_to_vec(&self, options: &OptionSequence) -> Result<Vec<u8>> {
        let mut out = BytesMut::new();
        self.encode(options, &mut out)?;
        Ok(out.to_vec())
    }

    /// Serializes a single record. The length is always computed from the
    /// value as serialized here.
    pub fn encode_option(&self, option: &DhcpOption, out: &mut BytesMut) -> Result<()> {
        if option.code > self.layout.max_code()
            || (self.terminated && (option.code == u16::from(PAD) || option.code == u16::from(END)))
        {
            return Err(DhcpError::InvalidValue(format!(
                "option code {} is not usable in a {} area",
                option.code, self.registry.name
            )));
        }
        let mut value = BytesMut::new();
        option.value.encode_into(&self.inner_codec(option.code), &mut value)?;
        if value.len() > self.layout.max_value_len() {
            return Err(DhcpError::ValueTooLong {
                code: option.code,
                len: value.len(),
                max: self.layout.max_value_len(),
            });
        }
        self.layout.put_header(out, option.code, value.len());
        out.put_slice(&value);
        Ok(())
    }

    /// Codec used for a container value stored under `code`.
    fn inner_codec(&self, code: u16) -> OptionCodec {
        match self.registry.lookup(code) {
            Some(OptionKind::Nested(codec)) | Some(OptionKind::Vendor(codec)) => *codec,
            _ => OptionCodec {
                layout: self.layout,
                terminated: false,
                registry: &GENERIC,
            },
        }
    }
}

/// The typed interpretation of an option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Bytes(Bytes),
    U8(u8),
    U16(u16),
    U32(u32),
    Ipv4(Ipv4Addr),
    Ipv4List(Vec<Ipv4Addr>),
    Ipv6List(Vec<Ipv6Addr>),
    Text(String),
    Nested(OptionSequence),
    Vendor {
        enterprise: u32,
        options: OptionSequence,
    },
    BootImageId(BootImageId),
    BootImageList(Vec<BootImageListEntry>),
}

impl OptionValue {
    fn encode_into(&self, inner: &OptionCodec, out: &mut BytesMut) -> Result<()> {
        match self {
            OptionValue::Bytes(bytes) => out.put_slice(bytes),
            OptionValue::U8(v) => out.put_u8(*v),
            OptionValue::U16(v) => out.put_u16(*v),
            OptionValue::U32(v) => out.put_u32(*v),
            OptionValue::Ipv4(ip) => out.put_slice(&ip.octets()),
            OptionValue::Ipv4List(ips) => {
                if ips.is_empty() {
                    return Err(DhcpError::ZeroLength("IPv4 address list"));
                }
                ips.iter().for_each(|ip| out.put_slice(&ip.octets()));
            }
            OptionValue::Ipv6List(ips) => {
                if ips.is_empty() {
                    return Err(DhcpError::ZeroLength("IPv6 address list"));
                }
                ips.iter().for_each(|ip| out.put_slice(&ip.octets()));
            }
            OptionValue::Text(text) => {
                if text.is_empty() {
                    return Err(DhcpError::ZeroLength("text option"));
                }
                out.put_slice(text.as_bytes());
            }
            OptionValue::Nested(options) => {
                if options.is_empty() {
                    return Err(DhcpError::ZeroLength("container option"));
                }
                inner.encode(options, out)?;
            }
            OptionValue::Vendor {
                enterprise,
                options,
            } => {
                out.put_u32(*enterprise);
                inner.encode(options, out)?;
            }
            OptionValue::BootImageId(id) => out.put_slice(&id.to_bytes()),
            OptionValue::BootImageList(entries) => bsdp::encode_boot_image_list(entries, out)?,
        }
        Ok(())
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bytes(bytes) => {
                let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
                write!(f, "[{}]", hex.join(" "))
            }
            OptionValue::U8(v) => write!(f, "{v}"),
            OptionValue::U16(v) => write!(f, "{v}"),
            OptionValue::U32(v) => write!(f, "{v}"),
            OptionValue::Ipv4(ip) => write!(f, "{ip}"),
            OptionValue::Ipv4List(ips) => write_list(f, ips),
            OptionValue::Ipv6List(ips) => write_list(f, ips),
            OptionValue::Text(text) => write!(f, "{text:?}"),
            OptionValue::Nested(options) => write!(f, "{{{options}}}"),
            OptionValue::Vendor {
                enterprise,
                options,
            } => write!(f, "enterprise {enterprise} {{{options}}}"),
            OptionValue::BootImageId(id) => write!(f, "{id}"),
            OptionValue::BootImageList(entries) => write_list(f, entries),
        }
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpOption {
    pub code: u16,
    pub value: OptionValue,
}

impl DhcpOption {
    pub fn new(code: impl Into<u16>, value: OptionValue) -> Self {
        Self {
            code: code.into(),
            value,
        }
    }

    /// Checks that this option carries `expected`, for decoders bound to a
    /// single code.
    pub fn expect_code(&self, expected: impl Into<u16>) -> Result<&Self> {
        let expected = expected.into();
        if self.code == expected {
            Ok(self)
        } else {
            Err(DhcpError::CodeMismatch {
                expected,
                actual: self.code,
            })
        }
    }

    pub fn as_u8(&self) -> Option<u8> {
        match self.value {
            OptionValue::U8(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match self.value {
            OptionValue::U16(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self.value {
            OptionValue::U32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ipv4(&self) -> Option<Ipv4Addr> {
        match self.value {
            OptionValue::Ipv4(ip) => Some(ip),
            _ => None,
        }
    }

    pub fn as_ipv4_list(&self) -> Option<&[Ipv4Addr]> {
        match &self.value {
            OptionValue::Ipv4List(ips) => Some(ips),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            OptionValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.value {
            OptionValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_nested(&self) -> Option<&OptionSequence> {
        match &self.value {
            OptionValue::Nested(options) => Some(options),
            OptionValue::Vendor { options, .. } => Some(options),
            _ => None,
        }
    }
}

/// Ordered option list. Codes may repeat; order is preserved on encode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionSequence(Vec<DhcpOption>);

impl OptionSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends, keeping any earlier option with the same code.
    pub fn push(&mut self, option: DhcpOption) {
        self.0.push(option);
    }

    /// Replaces the first option with the same code, or appends.
    pub fn insert(&mut self, option: DhcpOption) {
        match self.0.iter_mut().find(|o| o.code == option.code) {
            Some(existing) => *existing = option,
            None => self.0.push(option),
        }
    }

    pub fn get(&self, code: impl Into<u16>) -> Option<&DhcpOption> {
        let code = code.into();
        self.0.iter().find(|o| o.code == code)
    }

    pub fn get_all(&self, code: impl Into<u16>) -> impl Iterator<Item = &DhcpOption> {
        let code = code.into();
        self.0.iter().filter(move |o| o.code == code)
    }

    /// Removes every option with `code`, returning how many were removed.
    pub fn remove(&mut self, code: impl Into<u16>) -> usize {
        let code = code.into();
        let before = self.0.len();
        self.0.retain(|o| o.code != code);
        before - self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DhcpOption> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<DhcpOption> for OptionSequence {
    fn from_iter<I: IntoIterator<Item = DhcpOption>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for OptionSequence {
    type Item = DhcpOption;
    type IntoIter = std::vec::IntoIter<DhcpOption>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a OptionSequence {
    type Item = &'a DhcpOption;
    type IntoIter = std::slice::Iter<'a, DhcpOption>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for OptionSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, option) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", option.code, option.value)?;
        }
        Ok(())
    }
}
