//! Ethernet / 802.1Q / IPv4 / UDP framing for sockets below the IP layer
//!
//! A client without an address cannot use the kernel's UDP stack to reach a
//! DHCP server, so it builds whole frames itself and filters inbound frames
//! by VLAN stack and UDP destination.
//!
//! ```text
//! dst MAC(6) src MAC(6) [TPID 0x8100(2) TCI(2)]* EtherType(2) | IPv4 | UDP | payload
//! TCI = PCP(3) DEI(1) VID(12)
//! ```
//!
//! Every header field is big-endian.

use crate::error::{DhcpError, Result};
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const TPID_8021Q: u16 = 0x8100;

const MAC_LEN: usize = 6;
const ETHERTYPE_LEN: usize = 2;
const VLAN_TAG_LEN: usize = 4;
const IPV4_MIN_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;

const IPV4_VERSION: u8 = 4;
const IPV4_VERSION_IHL: u8 = (IPV4_VERSION << 4) | (IPV4_MIN_HEADER_LEN / 4) as u8;
const IPPROTO_UDP: u8 = 17;
const DEFAULT_TTL: u8 = 64;

const PCP_SHIFT: u16 = 13;
const PCP_MASK: u16 = 0x7;
const DEI_SHIFT: u16 = 12;
const VID_MASK: u16 = 0x0fff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; MAC_LEN]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; MAC_LEN]);

    pub fn octets(&self) -> [u8; MAC_LEN] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Parses `0a:1b:2c:3d:4e:5f`.
impl FromStr for MacAddr {
    type Err = DhcpError;

    fn from_str(s: &str) -> Result<Self> {
        let mut octets = [0u8; MAC_LEN];
        let mut parts = s.trim().split(':');
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| DhcpError::MacParse(s.to_string()))?;
            *octet =
                u8::from_str_radix(part, 16).map_err(|_| DhcpError::MacParse(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(DhcpError::MacParse(s.to_string()));
        }
        Ok(MacAddr(octets))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VlanTag {
    pub priority: u8,
    pub drop_eligible: bool,
    pub vid: u16,
}

impl VlanTag {
    /// Best-effort, not drop-eligible tag for `vid`.
    pub fn new(vid: u16) -> Self {
        Self {
            priority: 0,
            drop_eligible: false,
            vid: vid & VID_MASK,
        }
    }

    pub fn tci(&self) -> u16 {
        ((u16::from(self.priority) & PCP_MASK) << PCP_SHIFT)
            | (u16::from(self.drop_eligible) << DEI_SHIFT)
            | (self.vid & VID_MASK)
    }

    pub fn from_tci(tci: u16) -> Self {
        Self {
            priority: ((tci >> PCP_SHIFT) & PCP_MASK) as u8,
            drop_eligible: (tci >> DEI_SHIFT) & 1 == 1,
            vid: tci & VID_MASK,
        }
    }
}

/// Why an inbound frame was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    Truncated,
    VlanMismatch,
    EtherType(u16),
    NotIpv4,
    BadIpv4Header,
    NotUdp,
    BadUdpHeader,
    DestinationMismatch(SocketAddrV4),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datagram<'a> {
    pub payload: &'a [u8],
    pub source: SocketAddrV4,
    pub destination: SocketAddrV4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unframed<'a> {
    Datagram(Datagram<'a>),
    /// Unrelated traffic; not an error.
    NotForUs(Discard),
}

/// Wraps `payload` in UDP, IPv4, the VLAN tags of `vlans` (outermost first)
/// and an Ethernet header.
pub fn frame(
    payload: &[u8],
    dst_mac: MacAddr,
    src_mac: MacAddr,
    dst: SocketAddrV4,
    src: SocketAddrV4,
    vlans: &[u16],
) -> Result<Vec<u8>> {
    let udp_len = UDP_HEADER_LEN + payload.len();
    let total_len = u16::try_from(IPV4_MIN_HEADER_LEN + udp_len)
        .map_err(|_| DhcpError::PayloadTooLarge(payload.len()))?;

    let mut out = BytesMut::with_capacity(
        2 * MAC_LEN + vlans.len() * VLAN_TAG_LEN + ETHERTYPE_LEN + usize::from(total_len),
    );
    out.put_slice(&dst_mac.0);
    out.put_slice(&src_mac.0);
    for &vid in vlans {
        out.put_u16(TPID_8021Q);
        out.put_u16(VlanTag::new(vid).tci());
    }
    out.put_u16(ETHERTYPE_IPV4);

    let ip_start = out.len();
    out.put_u8(IPV4_VERSION_IHL);
    out.put_u8(0); // DSCP/ECN
    out.put_u16(total_len);
    out.put_u16(0); // identification
    out.put_u16(0); // flags, fragment offset
    out.put_u8(DEFAULT_TTL);
    out.put_u8(IPPROTO_UDP);
    out.put_u16(0); // checksum, filled below
    out.put_slice(&src.ip().octets());
    out.put_slice(&dst.ip().octets());
    let ip_checksum = fold(sum_words(&out[ip_start..], 0));
    out[ip_start + 10..ip_start + 12].copy_from_slice(&ip_checksum.to_be_bytes());

    let udp_start = out.len();
    out.put_u16(src.port());
    out.put_u16(dst.port());
    out.put_u16(udp_len as u16);
    out.put_u16(0); // checksum, filled below
    out.put_slice(payload);
    let udp_checksum = udp_checksum(*src.ip(), *dst.ip(), &out[udp_start..]);
    out[udp_start + 6..udp_start + 8].copy_from_slice(&udp_checksum.to_be_bytes());

    Ok(out.to_vec())
}

/// Strips the link, VLAN, IPv4 and UDP layers from `frame`.
///
/// The VLAN stack must equal `vlans` exactly, and the UDP destination must
/// match `bound`, where `0.0.0.0` and port 0 match anything. The payload is
/// cut to the lengths declared in the headers so link-layer padding never
/// reaches the caller.
pub fn unframe<'a>(frame: &'a [u8], vlans: &[u16], bound: SocketAddrV4) -> Unframed<'a> {
    match parse(frame, vlans, bound) {
        Ok(datagram) => Unframed::Datagram(datagram),
        Err(reason) => Unframed::NotForUs(reason),
    }
}

fn read_u16(buf: &[u8], offset: usize) -> std::result::Result<u16, Discard> {
    buf.get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(Discard::Truncated)
}

fn parse<'a>(
    frame: &'a [u8],
    vlans: &[u16],
    bound: SocketAddrV4,
) -> std::result::Result<Datagram<'a>, Discard> {
    let mut offset = 2 * MAC_LEN;
    for &expected in vlans {
        if read_u16(frame, offset)? != TPID_8021Q {
            return Err(Discard::VlanMismatch);
        }
        let tag = VlanTag::from_tci(read_u16(frame, offset + 2)?);
        if tag.vid != expected & VID_MASK {
            return Err(Discard::VlanMismatch);
        }
        offset += VLAN_TAG_LEN;
    }
    match read_u16(frame, offset)? {
        ETHERTYPE_IPV4 => {}
        TPID_8021Q => return Err(Discard::VlanMismatch),
        other => return Err(Discard::EtherType(other)),
    }
    offset += ETHERTYPE_LEN;

    let ip = &frame[offset..];
    if ip.len() < IPV4_MIN_HEADER_LEN {
        return Err(Discard::Truncated);
    }
    if ip[0] >> 4 != IPV4_VERSION {
        return Err(Discard::NotIpv4);
    }
    let header_len = usize::from(ip[0] & 0x0f) * 4;
    let total_len = usize::from(read_u16(ip, 2)?);
    if header_len < IPV4_MIN_HEADER_LEN
        || header_len > ip.len()
        || total_len < header_len + UDP_HEADER_LEN
        || total_len > ip.len()
    {
        return Err(Discard::BadIpv4Header);
    }
    if ip[9] != IPPROTO_UDP {
        return Err(Discard::NotUdp);
    }
    let src_ip = Ipv4Addr::new(ip[12], ip[13], ip[14], ip[15]);
    let dst_ip = Ipv4Addr::new(ip[16], ip[17], ip[18], ip[19]);

    // Everything past the IPv4 total length is link padding.
    let udp = &ip[header_len..total_len];
    let source = SocketAddrV4::new(src_ip, read_u16(udp, 0)?);
    let destination = SocketAddrV4::new(dst_ip, read_u16(udp, 2)?);
    let udp_len = usize::from(read_u16(udp, 4)?);
    if udp_len < UDP_HEADER_LEN || udp_len > udp.len() {
        return Err(Discard::BadUdpHeader);
    }

    let ip_matches = bound.ip().is_unspecified() || bound.ip() == destination.ip();
    let port_matches = bound.port() == 0 || bound.port() == destination.port();
    if !ip_matches || !port_matches {
        return Err(Discard::DestinationMismatch(destination));
    }

    Ok(Datagram {
        payload: &udp[UDP_HEADER_LEN..udp_len],
        source,
        destination,
    })
}

fn sum_words(data: &[u8], mut sum: u32) -> u32 {
    for chunk in data.chunks(2) {
        let word = match *chunk {
            [hi, lo] => u16::from_be_bytes([hi, lo]),
            [hi] => u16::from_be_bytes([hi, 0]),
            _ => 0,
        };
        sum += u32::from(word);
    }
    sum
}

fn fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

fn udp_checksum(src: Ipv4Addr, dst: Ipv4Addr, segment: &[u8]) -> u16 {
    let mut pseudo = [0u8; 12];
    pseudo[..4].copy_from_slice(&src.octets());
    pseudo[4..8].copy_from_slice(&dst.octets());
    pseudo[9] = IPPROTO_UDP;
    pseudo[10..12].copy_from_slice(&(segment.len() as u16).to_be_bytes());
    match fold(sum_words(segment, sum_words(&pseudo, 0))) {
        // Zero means "no checksum" in IPv4 UDP.
        0 => 0xffff,
        checksum => checksum,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT: MacAddr = MacAddr([0x00, 0x0c, 0x29, 0xa8, 0x92, 0xf4]);

    fn server() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 67)
    }

    fn client() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::BROADCAST, 68)
    }

    fn any_port(port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)
    }

    fn reply(vlans: &[u16], payload: &[u8]) -> Vec<u8> {
        frame(payload, MacAddr::BROADCAST, CLIENT, client(), server(), vlans).unwrap()
    }

    #[test]
    fn test_double_vlan_round_trip() {
        let payload = b"dhcp payload";
        let raw = reply(&[100, 200], payload);
        assert_eq!(&raw[12..14], [0x81, 0x00]);
        assert_eq!(&raw[14..16], [0x00, 100]);
        assert_eq!(&raw[16..18], [0x81, 0x00]);
        assert_eq!(&raw[18..20], [0x00, 200]);
        assert_eq!(&raw[20..22], [0x08, 0x00]);

        match unframe(&raw, &[100, 200], any_port(68)) {
            Unframed::Datagram(d) => {
                assert_eq!(d.payload, payload);
                assert_eq!(d.source, server());
                assert_eq!(d.destination, client());
            }
            other => panic!("expected datagram, got {other:?}"),
        }
        assert_eq!(
            unframe(&raw, &[100], any_port(68)),
            Unframed::NotForUs(Discard::VlanMismatch)
        );
    }

    #[test]
    fn test_vlan_truth_table() {
        let cases: &[(&[u16], &[u16], bool)] = &[
            (&[], &[], true),
            (&[10], &[10], true),
            (&[10, 20], &[10, 20], true),
            (&[10, 20], &[20, 10], false),
            (&[10], &[], false),
            (&[], &[10], false),
            (&[10], &[10, 20], false),
            (&[10, 20], &[10], false),
            (&[10], &[11], false),
        ];
        for (configured, packet, expected) in cases {
            let raw = reply(packet, b"x");
            let matched = matches!(
                unframe(&raw, configured, any_port(0)),
                Unframed::Datagram(_)
            );
            assert_eq!(matched, *expected, "configured {configured:?} packet {packet:?}");
        }
    }

    #[test]
    fn test_wrong_tpid_mid_stack() {
        let mut raw = reply(&[10, 20], b"x");
        raw[16] = 0x88;
        raw[17] = 0xa8;
        assert_eq!(
            unframe(&raw, &[10, 20], any_port(0)),
            Unframed::NotForUs(Discard::VlanMismatch)
        );
    }

    #[test]
    fn test_tci_fields() {
        assert_eq!(VlanTag::new(100).tci(), 100);
        assert_eq!(VlanTag::new(0x1fff).vid, 0x0fff);
        let tag = VlanTag::from_tci(0xb064);
        assert_eq!(tag.priority, 5);
        assert!(tag.drop_eligible);
        assert_eq!(tag.vid, 100);
        assert_eq!(tag.tci(), 0xb064);
    }

    #[test]
    fn test_non_ipv4_ethertype() {
        let mut raw = reply(&[], b"x");
        raw[12] = 0x86;
        raw[13] = 0xdd;
        assert_eq!(
            unframe(&raw, &[], any_port(0)),
            Unframed::NotForUs(Discard::EtherType(0x86dd))
        );
    }

    #[test]
    fn test_not_udp() {
        let mut raw = reply(&[], b"x");
        raw[14 + 9] = 6;
        assert_eq!(
            unframe(&raw, &[], any_port(0)),
            Unframed::NotForUs(Discard::NotUdp)
        );
    }

    #[test]
    fn test_destination_filter() {
        let raw = reply(&[], b"x");
        assert!(matches!(
            unframe(&raw, &[], any_port(67)),
            Unframed::NotForUs(Discard::DestinationMismatch(_))
        ));
        assert!(matches!(
            unframe(&raw, &[], SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 9), 68)),
            Unframed::NotForUs(Discard::DestinationMismatch(_))
        ));
        assert!(matches!(
            unframe(&raw, &[], client()),
            Unframed::Datagram(_)
        ));
    }

    #[test]
    fn test_link_padding_is_stripped() {
        let payload = [1u8, 2, 3];
        let mut raw = reply(&[], &payload);
        raw.resize(60, 0);
        match unframe(&raw, &[], any_port(68)) {
            Unframed::Datagram(d) => assert_eq!(d.payload, payload),
            other => panic!("expected datagram, got {other:?}"),
        }
    }

    #[test]
    fn test_inconsistent_lengths() {
        let raw = reply(&[], b"abcdef");
        assert_eq!(
            unframe(&raw[..raw.len() - 1], &[], any_port(0)),
            Unframed::NotForUs(Discard::BadIpv4Header)
        );
        assert_eq!(
            unframe(&raw[..20], &[], any_port(0)),
            Unframed::NotForUs(Discard::Truncated)
        );
        assert_eq!(
            unframe(&raw[..5], &[], any_port(0)),
            Unframed::NotForUs(Discard::Truncated)
        );

        let mut bad_udp = raw.clone();
        bad_udp[14 + 20 + 4..14 + 20 + 6].copy_from_slice(&100u16.to_be_bytes());
        assert_eq!(
            unframe(&bad_udp, &[], any_port(0)),
            Unframed::NotForUs(Discard::BadUdpHeader)
        );
    }

    #[test]
    fn test_checksums_verify() {
        let raw = reply(&[], b"odd");
        let ip = &raw[14..34];
        assert_eq!(fold(sum_words(ip, 0)), 0);
        let udp = &raw[34..];
        let mut pseudo = [0u8; 12];
        pseudo[..4].copy_from_slice(&server().ip().octets());
        pseudo[4..8].copy_from_slice(&client().ip().octets());
        pseudo[9] = IPPROTO_UDP;
        pseudo[10..12].copy_from_slice(&(udp.len() as u16).to_be_bytes());
        assert_eq!(fold(sum_words(udp, sum_words(&pseudo, 0))), 0);
    }

    #[test]
    fn test_mac_parse() {
        let mac: MacAddr = "00:0c:29:a8:92:f4\n".parse().unwrap();
        assert_eq!(mac, CLIENT);
        assert_eq!(mac.to_string(), "00:0c:29:a8:92:f4");
        assert!("00:0c:29:a8:92".parse::<MacAddr>().is_err());
        assert!("00:0c:29:a8:92:f4:01".parse::<MacAddr>().is_err());
        assert!("zz:0c:29:a8:92:f4".parse::<MacAddr>().is_err());
    }
}
