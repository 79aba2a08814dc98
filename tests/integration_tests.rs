use rawdhcp::bsdp::{self, BootImageId, BootImageListEntry, BootImageType};
use rawdhcp::network::{self, ChannelTransport, MacAddr, Unframed};
use rawdhcp::{ClientConfig, DhcpClient, RetryPolicy};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

const MAC: MacAddr = MacAddr([0x00, 0x0c, 0x29, 0xa8, 0x92, 0xf4]);

#[tokio::test]
async fn test_client_creation() {
    let config = ClientConfig::new("lo".to_string(), MAC);

    // Opening a packet socket needs CAP_NET_RAW; without it this must fail
    // cleanly rather than panic.
    match DhcpClient::new(config).await {
        Ok(client) => assert_eq!(client.config().interface, "lo"),
        Err(e) => println!("Expected error in test environment: {}", e),
    }
}

#[test]
fn test_config_creation() {
    let config = ClientConfig::new("eth0".to_string(), MAC);

    assert_eq!(config.interface, "eth0");
    assert_eq!(config.mac_address, MAC);
    assert_eq!(config.client_port, 68);
    assert_eq!(config.server_port, 67);
    assert_eq!(config.broadcast_address, Ipv4Addr::BROADCAST);
    assert!(config.vlans.is_empty());
    assert_eq!(config.retry, RetryPolicy::default());
    assert_eq!(config.retry.timeout, Duration::from_secs(5));
}

#[test]
fn test_mac_address_handling() {
    let mac: MacAddr = "00:0c:29:a8:92:f4".parse().unwrap();
    assert_eq!(mac, MAC);
    assert_eq!(mac.octets().len(), 6);
    assert_eq!(mac.to_string(), "00:0c:29:a8:92:f4");
}

/// A BSDP INFORM[LIST] travels through VLAN framing and back, then the boot
/// server's ACK[LIST] is read back out of the reply.
#[test]
fn test_bsdp_list_over_tagged_frames() {
    let client_ip = Ipv4Addr::new(10, 0, 0, 42);
    let server_ip = Ipv4Addr::new(10, 0, 0, 1);
    let inform = bsdp::build_inform_list(&MAC, 0x1234, client_ip, "AAPLBSDPC/i386/MacPro", 68);

    let frame = network::frame(
        &inform.encode().unwrap(),
        MacAddr::BROADCAST,
        MAC,
        SocketAddrV4::new(Ipv4Addr::BROADCAST, 67),
        SocketAddrV4::new(client_ip, 68),
        &[100, 200],
    )
    .unwrap();
    let Unframed::Datagram(datagram) =
        network::unframe(&frame, &[100, 200], SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 67))
    else {
        panic!("tagged inform was not delivered");
    };
    let received = rawdhcp::v4::Message::decode(datagram.payload).unwrap();
    assert_eq!(
        bsdp::message_type(&received).unwrap(),
        Some(bsdp::MessageType::List)
    );

    let image = BootImageId {
        install: false,
        image_type: BootImageType::MacOsX,
        index: 0x1000,
    };
    let ack = bsdp::build_ack_list(
        &received,
        server_ip,
        0x8000,
        Some(image),
        vec![BootImageListEntry {
            id: image,
            name: "NetBoot".to_string(),
        }],
    );
    let ack = rawdhcp::v4::Message::decode(&ack.encode().unwrap()).unwrap();
    let images = bsdp::parse_boot_image_list(&ack).unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].id, image);
    assert_eq!(images[0].name, "NetBoot");
}

#[tokio::test]
async fn test_cancelled_client_stops() {
    let (client_end, _server) = ChannelTransport::pair(
        "0.0.0.0:68".parse().unwrap(),
        "10.0.0.1:67".parse().unwrap(),
    );
    let client = DhcpClient::with_transport(ClientConfig::new("test0".to_string(), MAC), client_end);
    client.cancellation_token().cancel();
    assert!(matches!(
        client.run().await,
        Err(rawdhcp::DhcpError::Cancelled)
    ));
}
