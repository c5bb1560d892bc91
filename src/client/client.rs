//! Overlay client
//!
//! Joins the network through the controller, then bridges the local TUN
//! interface to the overlay: outbound IP datagrams are routed to the peer
//! owning the destination virtual IP, inbound DATA payloads are written
//! back into the kernel. One cooperative loop multiplexes the device, the
//! socket and the keepalive timer.

use std::fmt;
use std::fmt::Display;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, timeout};

use crate::client::{JOIN_ATTEMPTS, JOIN_TIMEOUT};
use crate::codec::packet::{NETWORK_ID_SIZE, PacketHeader, PacketType, PeerInfo};
use crate::crypto::DataCipher;
use crate::peers::{PeerRecord, PeerTable};
use crate::transport::UdpTransport;
use crate::utils::device::DeviceHandler;

/// Client lifecycle errors
#[derive(Debug, PartialEq, Eq)]
pub enum ClientError {
    /// No JOIN_RESPONSE arrived within the attempt budget
    NotJoined,
    /// The controller answered with an empty JOIN_RESPONSE
    JoinDenied,
}

impl std::error::Error for ClientError {}

impl Display for ClientError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ClientError::NotJoined => "no join response from controller".fmt(fmt),
            ClientError::JoinDenied => "controller refused the join".fmt(fmt),
        }
    }
}

#[derive(Clone)]
pub struct ClientConfig {
    pub controller_addr: SocketAddr,
    pub network_id: [u8; NETWORK_ID_SIZE],
    pub id: u64,
    pub bind_port: u16,
    pub keepalive_interval: Duration,
}

enum Event {
    Packet(crate::Result<(PacketHeader, Vec<u8>, SocketAddr)>),
    Datagram(Option<Vec<u8>>),
    Keepalive,
    Shutdown,
}

pub struct ClientHandler {
    cfg: ClientConfig,
    transport: UdpTransport,
    cipher: Arc<Box<dyn DataCipher>>,
    /// Local, eventually consistent view of every other member
    view: PeerTable,
    virtual_ip: Option<Ipv4Addr>,
}

impl ClientHandler {
    pub async fn new(cfg: ClientConfig, cipher: Arc<Box<dyn DataCipher>>) -> crate::Result<Self> {
        let transport = UdpTransport::bind(cfg.bind_port).await?;
        Ok(ClientHandler {
            cfg,
            transport,
            cipher,
            view: PeerTable::new(),
            virtual_ip: None,
        })
    }

    /// Virtual IP assigned by the controller, once joined
    pub fn virtual_ip(&self) -> Option<Ipv4Addr> {
        self.virtual_ip
    }

    /// Runs the join handshake until an address is assigned
    ///
    /// Each attempt sends HELLO then JOIN_REQUEST and waits for a
    /// JOIN_RESPONSE. A 4-byte payload is the assigned virtual IP in
    /// network order; an empty payload is a refusal and final.
    pub async fn join(&mut self) -> crate::Result<Ipv4Addr> {
        for attempt in 1..=JOIN_ATTEMPTS {
            tracing::info!(
                "joining via {} (attempt {}/{})",
                self.cfg.controller_addr,
                attempt,
                JOIN_ATTEMPTS
            );
            let network_id = self.cfg.network_id;
            self.send_to_controller(PacketType::Hello, &[]).await;
            self.send_to_controller(PacketType::JoinRequest, &network_id)
                .await;

            let deadline = tokio::time::Instant::now() + JOIN_TIMEOUT;
            loop {
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                let packet = match timeout(remaining, self.transport.recv()).await {
                    Ok(Ok(packet)) => packet,
                    Ok(Err(e)) => {
                        tracing::debug!("dropping datagram: {}", e);
                        continue;
                    }
                    // this attempt timed out
                    Err(_) => break,
                };

                let (header, payload, src) = packet;
                match header.packet_type {
                    PacketType::HelloAck => {
                        tracing::debug!("controller {} is alive", header.sender_id);
                    }
                    PacketType::JoinResponse if payload.len() == 4 => {
                        let vip = Ipv4Addr::new(payload[0], payload[1], payload[2], payload[3]);
                        tracing::info!("joined, assigned virtual ip {}", vip);
                        self.virtual_ip = Some(vip);
                        return Ok(vip);
                    }
                    PacketType::JoinResponse if payload.is_empty() => {
                        return Err(ClientError::JoinDenied.into());
                    }
                    // gossip can race ahead of the join response
                    PacketType::PeerInfo => self.handle_peer_info(&payload).await,
                    other => {
                        tracing::debug!("ignoring {} from {} while joining", other, src);
                    }
                }
            }
        }
        Err(ClientError::NotJoined.into())
    }

    /// Runs the steady-state loop until ctrl-c
    ///
    /// The device handle is owned by the caller so its mpsc ends and the
    /// socket can be polled from the same `select!` without contention.
    pub async fn run(&mut self, device: &mut DeviceHandler) -> crate::Result<()> {
        let mut keepalive = interval(self.cfg.keepalive_interval);

        loop {
            let event = tokio::select! {
                packet = self.transport.recv() => Event::Packet(packet),
                datagram = device.recv() => Event::Datagram(datagram),
                _ = keepalive.tick() => Event::Keepalive,
                _ = tokio::signal::ctrl_c() => Event::Shutdown,
            };

            match event {
                Event::Packet(Ok((header, payload, src))) => {
                    self.handle_packet(header, payload, src, device).await;
                }
                Event::Packet(Err(e)) => {
                    tracing::debug!("dropping datagram: {}", e);
                }
                Event::Datagram(Some(datagram)) => {
                    self.forward_datagram(datagram).await;
                }
                Event::Datagram(None) => {
                    tracing::error!("device task stopped");
                    break;
                }
                Event::Keepalive => {
                    self.send_to_controller(PacketType::Keepalive, &[]).await;
                }
                Event::Shutdown => break,
            }
        }

        // best-effort goodbye so the controller frees the address early
        self.send_to_controller(PacketType::Bye, &[]).await;
        tracing::info!("client {} stopped", self.cfg.id);
        Ok(())
    }

    /// TUN -> UDP path
    ///
    /// Drops anything that is not a routable IPv4 datagram and anything
    /// whose destination is not (yet) in the local view. Neither is an
    /// error: the kernel hands over multicast chatter, and gossip for a
    /// fresh peer may still be in flight.
    async fn forward_datagram(&self, datagram: Vec<u8>) {
        if self.virtual_ip.is_none() {
            tracing::warn!("dropping outbound datagram: not joined");
            return;
        }
        let Some(dst) = ipv4_destination(&datagram) else {
            tracing::trace!("dropping non-ipv4 datagram from device");
            return;
        };
        let Some(peer) = self.view.get_by_ip(dst) else {
            tracing::trace!("no peer for {}, dropping", dst);
            return;
        };

        let mut payload = datagram;
        if let Err(e) = self.cipher.seal(self.cfg.id, peer.id, &mut payload) {
            tracing::warn!("seal for {} failed: {}", peer.id, e);
            return;
        }
        if let Err(e) = self
            .transport
            .send(peer.endpoint, PacketType::Data, self.cfg.id, peer.id, &payload)
            .await
        {
            tracing::warn!("send to {} failed: {}", peer.endpoint, e);
        }
    }

    /// UDP -> TUN path and control dispatch
    async fn handle_packet(
        &mut self,
        header: PacketHeader,
        payload: Vec<u8>,
        src: SocketAddr,
        device: &mut DeviceHandler,
    ) {
        if self.view.contains(header.sender_id) {
            self.view.touch(header.sender_id);
        }

        match header.packet_type {
            PacketType::HelloAck => {
                tracing::debug!("controller {} is alive", header.sender_id);
            }
            PacketType::JoinResponse => {
                // late duplicate of the handshake reply
                tracing::debug!("ignoring join response, already joined");
            }
            PacketType::PeerInfo => {
                self.handle_peer_info(&payload).await;
            }
            PacketType::PeerHello => {
                if let Some(record) = self.view.get_mut(header.sender_id) {
                    if !record.reachable {
                        tracing::info!("peer {} is directly reachable", record.id);
                    }
                    record.reachable = true;
                }
            }
            PacketType::Keepalive => {
                self.send(src, PacketType::Keepalive, header.sender_id, &[])
                    .await;
            }
            PacketType::Data => {
                let mut payload = payload;
                if let Err(e) = self
                    .cipher
                    .open(self.cfg.id, header.sender_id, &mut payload)
                {
                    tracing::warn!("dropping data from {}: {}", header.sender_id, e);
                    return;
                }
                // no further validation, the kernel drops what it dislikes
                if let Err(e) = device.send(payload).await {
                    tracing::error!("write device fail: {}", e);
                }
            }
            PacketType::Unknown(code) => {
                tracing::debug!("ignoring unknown type {:#04x} from {}", code, src);
            }
            _ => {}
        }
    }

    /// Installs a gossiped record and probes the new peer
    ///
    /// The PEER_HELLO probe primes any stateful NAT mapping on the path
    /// and doubles as the reachability signal for the other side.
    async fn handle_peer_info(&mut self, payload: &[u8]) {
        let info = match PeerInfo::decode(payload) {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!("dropping peer info: {}", e);
                return;
            }
        };
        // own id never appears in the own view
        if info.id == self.cfg.id {
            return;
        }

        if self.view.contains(info.id) {
            self.view.update_endpoint(info.id, info.endpoint());
            return;
        }

        let record = PeerRecord::new(info.id, info.endpoint(), info.virtual_ip);
        if let Err(e) = self.view.insert(record) {
            tracing::warn!("cannot track peer {}: {}", info.id, e);
            return;
        }
        tracing::info!("learned peer {} ({} at {})", info.id, info.virtual_ip, info.endpoint());
        self.send(info.endpoint(), PacketType::PeerHello, info.id, &[])
            .await;
    }

    async fn send_to_controller(&self, packet_type: PacketType, payload: &[u8]) {
        self.send(self.cfg.controller_addr, packet_type, 0, payload)
            .await;
    }

    async fn send(&self, dest: SocketAddr, packet_type: PacketType, dest_id: u64, payload: &[u8]) {
        if let Err(e) = self
            .transport
            .send(dest, packet_type, self.cfg.id, dest_id, payload)
            .await
        {
            tracing::warn!("send {} to {} failed: {}", packet_type, dest, e);
        }
    }
}

/// Destination address of an IPv4 datagram
///
/// Returns None for anything shorter than a minimal IPv4 header or with a
/// version nibble other than 4.
pub fn ipv4_destination(datagram: &[u8]) -> Option<Ipv4Addr> {
    if datagram.len() < 20 || datagram[0] >> 4 != 4 {
        return None;
    }
    Some(Ipv4Addr::new(
        datagram[16],
        datagram[17],
        datagram[18],
        datagram[19],
    ))
}
