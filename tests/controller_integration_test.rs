/// Integration tests for the controller loop
///
/// Runs a real controller on an ephemeral loopback port and talks to it
/// with raw UDP sockets acting as clients:
/// 1. Join admission and first virtual IP assignment
/// 2. Peer-table gossip to both sides on a second join
/// 3. Network-id mismatch refusal
/// 4. Address reuse after BYE (first-free allocation)
/// 5. LIST_REQUEST / LIST_DONE round
/// 6. DATA relay through the controller
/// 7. The client handler's own join handshake
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use meshtun::client::client::{ClientConfig, ClientHandler};
use meshtun::codec::packet::{NETWORK_ID_SIZE, PacketHeader, PacketType, PeerInfo};
use meshtun::codec::parser::Parser;
use meshtun::controller::config::{Config, ControllerConfig};
use meshtun::controller::controller::Controller;
use meshtun::crypto::CryptoConfig;
use meshtun::crypto::plain::PlainCipher;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

fn test_config() -> Config {
    Config {
        controller_config: ControllerConfig {
            listen_port: 0,
            name: "testnet".to_string(),
            network_id: "0".repeat(NETWORK_ID_SIZE * 2),
            subnet: "10.0.0.0/24".to_string(),
            max_peers: 16,
        },
        crypto_config: CryptoConfig::Plain,
    }
}

/// Starts a controller on an ephemeral port, returns its loopback address
async fn start_controller() -> SocketAddr {
    let mut controller = Controller::new(&test_config())
        .await
        .expect("controller startup");
    let port = controller.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _ = controller.run().await;
    });
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// A bare-socket protocol speaker standing in for a client
struct MockClient {
    socket: UdpSocket,
    id: u64,
    sequence: u32,
}

impl MockClient {
    async fn new(id: u64) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("bind mock client");
        MockClient {
            socket,
            id,
            sequence: 0,
        }
    }

    fn addr(&self) -> SocketAddr {
        self.socket.local_addr().unwrap()
    }

    async fn send(&mut self, dest: SocketAddr, ty: PacketType, dest_id: u64, payload: &[u8]) {
        let datagram = Parser::encode(ty, self.id, dest_id, self.sequence, payload).unwrap();
        self.sequence += 1;
        self.socket.send_to(&datagram, dest).await.expect("send");
    }

    async fn recv(&self) -> (PacketHeader, Vec<u8>) {
        let mut buf = vec![0u8; 2048];
        let (len, _) = timeout(RECV_TIMEOUT, self.socket.recv_from(&mut buf))
            .await
            .expect("timed out waiting for a packet")
            .expect("recv");
        let (header, payload) = Parser::decode(&buf[..len]).expect("decode");
        (header, payload)
    }

    /// HELLO / HELLO_ACK / JOIN_REQUEST, returns the JOIN_RESPONSE payload
    async fn join(&mut self, controller: SocketAddr, network_id: &[u8]) -> Vec<u8> {
        self.send(controller, PacketType::Hello, 0, &[]).await;
        let (header, _) = self.recv().await;
        assert_eq!(header.packet_type, PacketType::HelloAck);

        self.send(controller, PacketType::JoinRequest, 0, network_id)
            .await;
        let (header, payload) = self.recv().await;
        assert_eq!(header.packet_type, PacketType::JoinResponse);
        payload
    }
}

#[tokio::test]
async fn test_first_joiner_gets_first_host_address() {
    let controller = start_controller().await;
    let mut a = MockClient::new(1).await;

    let vip = a.join(controller, &[0u8; NETWORK_ID_SIZE]).await;
    assert_eq!(vip, vec![10, 0, 0, 2]);
}

#[tokio::test]
async fn test_second_join_gossips_both_ways() {
    let controller = start_controller().await;
    let mut a = MockClient::new(1).await;
    let mut b = MockClient::new(2).await;

    assert_eq!(a.join(controller, &[0u8; NETWORK_ID_SIZE]).await, vec![10, 0, 0, 2]);
    assert_eq!(b.join(controller, &[0u8; NETWORK_ID_SIZE]).await, vec![10, 0, 0, 3]);

    // the joiner learns about the existing member
    let (header, payload) = b.recv().await;
    assert_eq!(header.packet_type, PacketType::PeerInfo);
    let info = PeerInfo::decode(&payload).unwrap();
    assert_eq!(info.id, 1);
    assert_eq!(info.virtual_ip.octets(), [10, 0, 0, 2]);
    assert_eq!(info.endpoint(), a.addr());

    // the existing member learns about the joiner
    let (header, payload) = a.recv().await;
    assert_eq!(header.packet_type, PacketType::PeerInfo);
    let info = PeerInfo::decode(&payload).unwrap();
    assert_eq!(info.id, 2);
    assert_eq!(info.virtual_ip.octets(), [10, 0, 0, 3]);
    assert_eq!(info.endpoint(), b.addr());
}

#[tokio::test]
async fn test_wrong_network_id_is_refused() {
    let controller = start_controller().await;
    let mut a = MockClient::new(1).await;
    let mut c = MockClient::new(3).await;

    assert_eq!(a.join(controller, &[0u8; NETWORK_ID_SIZE]).await, vec![10, 0, 0, 2]);

    // refusal is an empty JOIN_RESPONSE
    let denied = c.join(controller, &[0xFFu8; NETWORK_ID_SIZE]).await;
    assert!(denied.is_empty());

    // and the table is unchanged
    let mut admin = MockClient::new(99).await;
    admin
        .send(controller, PacketType::ListRequest, 0, &[])
        .await;
    let mut listed = Vec::new();
    loop {
        let (header, payload) = admin.recv().await;
        match header.packet_type {
            PacketType::PeerInfo => listed.push(PeerInfo::decode(&payload).unwrap().id),
            PacketType::ListDone => break,
            other => panic!("unexpected {} during listing", other),
        }
    }
    assert_eq!(listed, vec![1]);
}

#[tokio::test]
async fn test_departed_address_is_reused_first_free() {
    let controller = start_controller().await;
    let mut a = MockClient::new(1).await;
    let mut b = MockClient::new(2).await;

    assert_eq!(a.join(controller, &[0u8; NETWORK_ID_SIZE]).await, vec![10, 0, 0, 2]);
    assert_eq!(b.join(controller, &[0u8; NETWORK_ID_SIZE]).await, vec![10, 0, 0, 3]);

    b.send(controller, PacketType::Bye, 0, &[]).await;

    // give the single-threaded loop a beat to process the BYE
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut c = MockClient::new(4).await;
    assert_eq!(c.join(controller, &[0u8; NETWORK_ID_SIZE]).await, vec![10, 0, 0, 3]);
}

#[tokio::test]
async fn test_list_round() {
    let controller = start_controller().await;
    let mut a = MockClient::new(10).await;
    let mut b = MockClient::new(11).await;

    a.join(controller, &[0u8; NETWORK_ID_SIZE]).await;
    b.join(controller, &[0u8; NETWORK_ID_SIZE]).await;
    // drain the gossip about b
    let _ = a.recv().await;

    let mut admin = MockClient::new(99).await;
    admin
        .send(controller, PacketType::ListRequest, 0, &[])
        .await;

    let mut listed = Vec::new();
    loop {
        let (header, payload) = admin.recv().await;
        match header.packet_type {
            PacketType::PeerInfo => listed.push(PeerInfo::decode(&payload).unwrap()),
            PacketType::ListDone => break,
            other => panic!("unexpected {} during listing", other),
        }
    }
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, 10);
    assert_eq!(listed[1].id, 11);
    assert_eq!(listed[0].endpoint(), a.addr());
}

#[tokio::test]
async fn test_data_is_relayed_verbatim() {
    let controller = start_controller().await;
    let mut a = MockClient::new(1).await;
    let mut b = MockClient::new(2).await;

    a.join(controller, &[0u8; NETWORK_ID_SIZE]).await;
    b.join(controller, &[0u8; NETWORK_ID_SIZE]).await;
    let _ = a.recv().await; // gossip about b
    let _ = b.recv().await; // gossip about a

    let datagram = b"\x45\x00\x00\x1c fake ip datagram".to_vec();
    a.send(controller, PacketType::Data, 2, &datagram).await;

    let (header, payload) = b.recv().await;
    assert_eq!(header.packet_type, PacketType::Data);
    assert_eq!(header.sender_id, 1);
    assert_eq!(header.dest_id, 2);
    assert_eq!(payload, datagram);
}

#[tokio::test]
async fn test_client_handler_joins() {
    let controller = start_controller().await;

    let cipher = Arc::new(Box::new(PlainCipher::new()) as Box<dyn meshtun::crypto::DataCipher>);
    let mut handler = ClientHandler::new(
        ClientConfig {
            controller_addr: controller,
            network_id: [0u8; NETWORK_ID_SIZE],
            id: 42,
            bind_port: 0,
            keepalive_interval: Duration::from_secs(30),
        },
        cipher,
    )
    .await
    .expect("client startup");

    let vip = handler.join().await.expect("join");
    assert_eq!(vip.octets(), [10, 0, 0, 2]);
    assert_eq!(handler.virtual_ip(), Some(vip));
}

#[tokio::test]
async fn test_repeat_join_converges_on_same_address() {
    let controller = start_controller().await;
    let mut a = MockClient::new(1).await;

    assert_eq!(a.join(controller, &[0u8; NETWORK_ID_SIZE]).await, vec![10, 0, 0, 2]);

    // a retried JOIN_REQUEST (lost response) does not burn a new address
    a.send(controller, PacketType::JoinRequest, 0, &[0u8; NETWORK_ID_SIZE])
        .await;
    let (header, payload) = a.recv().await;
    assert_eq!(header.packet_type, PacketType::JoinResponse);
    assert_eq!(payload, vec![10, 0, 0, 2]);
}
