use super::*;
use crate::error::DhcpError;
use crate::network::MacAddr;
use crate::options::{DhcpOption, OptionSequence, OptionValue};
use std::net::Ipv4Addr;

fn mac() -> MacAddr {
    MacAddr([0x00, 0x0c, 0x29, 0xa8, 0x92, 0xf4])
}

fn offer(request: &Message) -> Message {
    let mut reply = Message::new_reply(request);
    reply.yiaddr = Ipv4Addr::new(192, 168, 1, 100);
    reply.set_message_type(MessageType::Offer);
    reply.options.push(DhcpOption::new(
        OptionCode::ServerIdentifier,
        OptionValue::Ipv4(Ipv4Addr::new(192, 168, 1, 1)),
    ));
    reply.options.push(DhcpOption::new(
        OptionCode::SubnetMask,
        OptionValue::Ipv4(Ipv4Addr::new(255, 255, 255, 0)),
    ));
    reply.options.push(DhcpOption::new(
        OptionCode::Router,
        OptionValue::Ipv4List(vec![Ipv4Addr::new(192, 168, 1, 1)]),
    ));
    reply.options.push(DhcpOption::new(
        OptionCode::AddressLeaseTime,
        OptionValue::U32(3600),
    ));
    reply
}

#[test]
fn test_build_dhcp_discover() {
    let xid = 0x12345678;
    let packet = build_discover(&mac(), xid).encode().unwrap();

    let msg = Message::decode(&packet).unwrap();
    assert_eq!(msg.xid, xid);
    assert_eq!(msg.client_hwaddr(), &mac().octets()[..]);
    assert_eq!(msg.opcode, Opcode::BootRequest);
    assert_eq!(msg.message_type(), Some(MessageType::Discover));
    assert!(msg.options.get(OptionCode::ClientIdentifier).is_some());
    assert!(msg.is_broadcast());
}

#[test]
fn test_build_dhcp_request() {
    let xid = 0x87654321;
    let offered_ip = Ipv4Addr::new(192, 168, 1, 100);
    let server_ip = Ipv4Addr::new(192, 168, 1, 1);

    let packet = build_request(&mac(), xid, offered_ip, server_ip)
        .encode()
        .unwrap();
    let msg = Message::decode(&packet).unwrap();

    assert_eq!(msg.xid, xid);
    assert_eq!(msg.message_type(), Some(MessageType::Request));
    assert_eq!(
        msg.options
            .get(OptionCode::RequestedIpAddress)
            .and_then(DhcpOption::as_ipv4),
        Some(offered_ip)
    );
    assert_eq!(msg.server_identifier(), Some(server_ip));
    assert!(msg.is_broadcast());
}

#[test]
fn test_encoded_layout() {
    let packet = build_discover(&mac(), 0x01020304).encode().unwrap();
    assert_eq!(packet.len(), 300);
    assert_eq!(&packet[..4], [1, 1, 6, 0]);
    assert_eq!(&packet[4..8], [1, 2, 3, 4]);
    assert_eq!(&packet[10..12], [0x80, 0x00]);
    assert_eq!(&packet[28..34], mac().octets());
    assert_eq!(&packet[236..240], message::MAGIC_COOKIE);
    assert_eq!(&packet[240..243], [53, 1, 1]);
}

#[test]
fn test_message_round_trip() {
    let mut msg = offer(&build_discover(&mac(), 7));
    msg.hops = 2;
    msg.secs = 9;
    msg.siaddr = Ipv4Addr::new(10, 1, 1, 1);
    msg.set_server_name("boot.example").unwrap();
    msg.set_boot_file_name("pxelinux.0").unwrap();
    msg.options.push(DhcpOption::new(
        OptionCode::Hostname,
        OptionValue::Text("client-7".into()),
    ));
    msg.options.push(DhcpOption::new(200u16, OptionValue::Bytes(vec![1, 2, 3].into())));

    let decoded = Message::decode(&msg.encode().unwrap()).unwrap();
    assert_eq!(decoded, msg);
    assert_eq!(decoded.server_name(), Some("boot.example"));
    assert_eq!(decoded.boot_file_name(), Some("pxelinux.0"));
}

#[test]
fn test_relay_agent_information_is_nested() {
    let relay: OptionSequence = [
        DhcpOption::new(1u16, OptionValue::Bytes(b"eth0/1".to_vec().into())),
        DhcpOption::new(2u16, OptionValue::Bytes(b"switch-a".to_vec().into())),
    ]
    .into_iter()
    .collect();
    let mut request = build_discover(&mac(), 99);
    request.giaddr = Ipv4Addr::new(10, 0, 0, 254);
    request.options.push(DhcpOption::new(
        OptionCode::RelayAgentInformation,
        OptionValue::Nested(relay.clone()),
    ));

    let request = Message::decode(&request.encode().unwrap()).unwrap();
    let option = request.options.get(OptionCode::RelayAgentInformation).unwrap();
    assert_eq!(option.as_nested(), Some(&relay));

    let reply = Message::new_reply(&request);
    assert_eq!(reply.giaddr, request.giaddr);
    assert_eq!(reply.options.get(OptionCode::RelayAgentInformation), Some(option));
}

#[test]
fn test_new_reply_copies_correlation_fields() {
    let request = build_discover(&mac(), 0xdeadbeef);
    let reply = Message::new_reply(&request);
    assert_eq!(reply.opcode, Opcode::BootReply);
    assert_eq!(reply.xid, request.xid);
    assert_eq!(reply.client_hwaddr(), request.client_hwaddr());
    assert!(reply.is_broadcast());
    assert_eq!(reply.message_type(), None);
}

#[test]
fn test_rejects_bad_magic_cookie() {
    let mut packet = build_discover(&mac(), 1).encode().unwrap();
    packet[239] = 0x64;
    assert!(matches!(
        Message::decode(&packet),
        Err(DhcpError::InvalidMagicCookie([0x63, 0x82, 0x53, 0x64]))
    ));
}

#[test]
fn test_rejects_short_and_empty_input() {
    assert!(matches!(Message::decode(&[]), Err(DhcpError::ZeroLength(_))));
    assert!(matches!(
        Message::decode(&[0u8; 239]),
        Err(DhcpError::MalformedLength {
            needed: 240,
            available: 239,
            ..
        })
    ));
}

#[test]
fn test_truncated_option_rejects_whole_message() {
    let mut packet = build_discover(&mac(), 1).encode().unwrap();
    packet.truncate(240);
    packet.extend_from_slice(&[53, 1, 1, 61, 7, 1, 0, 0x0c]);
    assert!(matches!(
        Message::decode(&packet),
        Err(DhcpError::MalformedLength { needed: 7, .. })
    ));
}

#[test]
fn test_missing_end_marker_is_tolerated() {
    let mut packet = build_discover(&mac(), 1).encode().unwrap();
    packet.truncate(240);
    packet.extend_from_slice(&[53, 1, 3]);
    let msg = Message::decode(&packet).unwrap();
    assert_eq!(msg.message_type(), Some(MessageType::Request));
}

#[test]
fn test_server_name_must_fit() {
    let mut msg = Message::default();
    assert!(msg.set_server_name(&"x".repeat(64)).is_err());
    assert!(msg.set_server_name(&"x".repeat(63)).is_ok());
}

#[test]
fn test_summary_is_deterministic() {
    let msg = offer(&build_discover(&mac(), 0x2a));
    let summary = msg.to_string();
    assert_eq!(summary, msg.clone().to_string());
    assert!(summary.contains("transaction ID: 0x0000002a"));
    assert!(summary.contains("DHCP Message Type: OFFER"));
    assert!(summary.contains("Subnet Mask: 255.255.255.0"));
    assert!(summary.contains("client MAC: 00:0c:29:a8:92:f4"));
}

#[test]
fn test_option_code_names() {
    assert_eq!(OptionCode::describe(51), "IP Addresses Lease Time");
    assert_eq!(OptionCode::describe(250), "Option 250");
    assert_eq!(OptionCode::try_from(82), Ok(OptionCode::RelayAgentInformation));
    assert_eq!(OptionCode::try_from(4), Err(4));
}
