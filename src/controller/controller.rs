//! Rendezvous controller
//!
//! Admits members, assigns virtual IPs, gossips the peer table and relays
//! DATA as a fallback when clients cannot reach each other directly. One
//! cooperative loop owns the transport and the authoritative peer table;
//! nothing else touches either.

use std::net::SocketAddr;

use rand::Rng;
use tokio::time::interval;

use crate::codec::packet::{NETWORK_ID_SIZE, PacketHeader, PacketType, PeerInfo};
use crate::controller::config::Config;
use crate::controller::{KEEPALIVE_INTERVAL, MAINTENANCE_INTERVAL, PEER_TIMEOUT, REMOVAL_GRACE};
use crate::peers::{PeerRecord, PeerTable};
use crate::transport::UdpTransport;

enum Event {
    Packet(crate::Result<(PacketHeader, Vec<u8>, SocketAddr)>),
    Keepalive,
    Maintenance,
    Shutdown,
}

pub struct Controller {
    id: u64,
    name: String,
    network_id: [u8; NETWORK_ID_SIZE],
    subnet: ipnet::Ipv4Net,
    transport: UdpTransport,
    peers: PeerTable,
}

impl Controller {
    /// Binds the transport and builds the empty network state
    pub async fn new(cfg: &Config) -> crate::Result<Self> {
        let network_id = cfg.controller_config.network_id_bytes()?;
        let subnet = cfg.controller_config.subnet()?;
        let transport = UdpTransport::bind(cfg.controller_config.listen_port).await?;

        let id: u64 = rand::rng().random();
        tracing::info!(
            "controller {} for network {:?} ({}), capacity {}",
            id,
            cfg.controller_config.name,
            subnet,
            cfg.controller_config.max_peers
        );

        Ok(Controller {
            id,
            name: cfg.controller_config.name.clone(),
            network_id,
            subnet,
            transport,
            peers: PeerTable::with_capacity(cfg.controller_config.max_peers),
        })
    }

    /// Address the transport is bound to (useful after binding port 0)
    pub fn local_addr(&self) -> crate::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the controller loop until ctrl-c
    pub async fn run(&mut self) -> crate::Result<()> {
        let mut keepalive = interval(KEEPALIVE_INTERVAL);
        let mut maintenance = interval(MAINTENANCE_INTERVAL);

        loop {
            let event = tokio::select! {
                packet = self.transport.recv() => Event::Packet(packet),
                _ = keepalive.tick() => Event::Keepalive,
                _ = maintenance.tick() => Event::Maintenance,
                _ = tokio::signal::ctrl_c() => Event::Shutdown,
            };

            match event {
                Event::Packet(Ok((header, payload, src))) => {
                    self.handle_packet(header, payload, src).await;
                }
                Event::Packet(Err(e)) => {
                    // a broken or hostile sender must never take the loop down
                    tracing::debug!("dropping datagram: {}", e);
                }
                Event::Keepalive => self.send_keepalives().await,
                Event::Maintenance => self.sweep(),
                Event::Shutdown => break,
            }
        }

        tracing::info!("controller for {:?} shutting down", self.name);
        Ok(())
    }

    async fn handle_packet(&mut self, header: PacketHeader, payload: Vec<u8>, src: SocketAddr) {
        // any packet from a known member refreshes liveness and the
        // observed endpoint, which is how NAT rebinds are tracked
        if self.peers.contains(header.sender_id) {
            self.peers.touch(header.sender_id);
            self.peers.update_endpoint(header.sender_id, src);
        }

        match header.packet_type {
            PacketType::Hello => {
                tracing::debug!("HELLO from {} at {}", header.sender_id, src);
                self.send(src, PacketType::HelloAck, header.sender_id, &[]).await;
            }
            PacketType::JoinRequest => {
                self.handle_join(header.sender_id, &payload, src).await;
            }
            PacketType::Keepalive => {
                // touch above already did the work for known members
            }
            PacketType::Bye => {
                if let Some(record) = self.peers.remove(header.sender_id) {
                    tracing::info!(
                        "peer {} left, freeing {}",
                        record.id,
                        record.virtual_ip
                    );
                }
            }
            PacketType::ListRequest => {
                self.handle_list(header.sender_id, src).await;
            }
            PacketType::Data => {
                self.relay(header, payload).await;
            }
            PacketType::Unknown(code) => {
                tracing::debug!("ignoring unknown type {:#04x} from {}", code, src);
            }
            // client-side types have no meaning here
            _ => {}
        }
    }

    /// Admits (or refuses) a joiner
    ///
    /// A join is answered three ways: the assigned virtual IP to the
    /// joiner, one PEER_INFO per existing member to the joiner, and one
    /// PEER_INFO describing the joiner to every existing member. The
    /// protocol has no error packet, so a wrong network id, a full
    /// subnet and a full table all answer with an empty JOIN_RESPONSE.
    async fn handle_join(&mut self, joiner: u64, payload: &[u8], src: SocketAddr) {
        if payload.len() != NETWORK_ID_SIZE || payload != self.network_id {
            tracing::info!("refusing join from {} at {}: wrong network id", joiner, src);
            self.send(src, PacketType::JoinResponse, joiner, &[]).await;
            return;
        }

        // a retried JOIN_REQUEST converges on the original assignment
        if let Some(existing) = self.peers.get(joiner) {
            let vip = existing.virtual_ip;
            tracing::debug!("repeat join from {}, re-sending {}", joiner, vip);
            self.send(src, PacketType::JoinResponse, joiner, &vip.octets())
                .await;
            return;
        }

        let vip = match self.peers.allocate_ip(self.subnet) {
            Ok(vip) => vip,
            Err(e) => {
                tracing::warn!("refusing join from {}: {}", joiner, e);
                self.send(src, PacketType::JoinResponse, joiner, &[]).await;
                return;
            }
        };
        if let Err(e) = self.peers.insert(PeerRecord::new(joiner, src, vip)) {
            tracing::warn!("refusing join from {}: {}", joiner, e);
            self.send(src, PacketType::JoinResponse, joiner, &[]).await;
            return;
        }

        tracing::info!("peer {} joined from {}, assigned {}", joiner, src, vip);
        self.send(src, PacketType::JoinResponse, joiner, &vip.octets())
            .await;

        let SocketAddr::V4(src_v4) = src else { return };
        let new_info = PeerInfo {
            id: joiner,
            virtual_ip: vip,
            public_ip: *src_v4.ip(),
            public_port: src_v4.port(),
        };
        for record in self.peers.iter() {
            if record.id == joiner {
                continue;
            }
            // existing member -> joiner
            if let Some(info) = describe(record) {
                self.send(src, PacketType::PeerInfo, joiner, &info.encode())
                    .await;
            }
            // joiner -> existing member
            self.send(
                record.endpoint,
                PacketType::PeerInfo,
                record.id,
                &new_info.encode(),
            )
            .await;
        }
    }

    /// Answers LIST_REQUEST with every record, then LIST_DONE
    async fn handle_list(&self, requester: u64, src: SocketAddr) {
        tracing::debug!("listing {} peers of {:?} for {}", self.peers.len(), self.name, src);
        for record in self.peers.iter() {
            if let Some(info) = describe(record) {
                self.send(src, PacketType::PeerInfo, requester, &info.encode())
                    .await;
            }
        }
        self.send(src, PacketType::ListDone, requester, &[]).await;
    }

    /// Relays a DATA packet toward `dest_id`
    ///
    /// Fallback for clients that cannot reach each other directly. The
    /// original sender id is preserved so the receiver opens the payload
    /// against the right session. Unknown destinations drop silently.
    async fn relay(&self, header: PacketHeader, payload: Vec<u8>) {
        let Some(dest) = self.peers.get(header.dest_id) else {
            tracing::debug!(
                "no relay target {} for data from {}",
                header.dest_id,
                header.sender_id
            );
            return;
        };
        if let Err(e) = self
            .transport
            .send(
                dest.endpoint,
                PacketType::Data,
                header.sender_id,
                header.dest_id,
                &payload,
            )
            .await
        {
            tracing::warn!("relay to {} failed: {}", dest.endpoint, e);
        }
    }

    async fn send_keepalives(&self) {
        for record in self.peers.iter() {
            self.send(record.endpoint, PacketType::Keepalive, record.id, &[])
                .await;
        }
    }

    fn sweep(&mut self) {
        let outcome = self.peers.sweep(PEER_TIMEOUT, REMOVAL_GRACE);
        for id in &outcome.marked_inactive {
            tracing::info!("peer {} timed out, marked inactive", id);
        }
        for id in &outcome.removed {
            tracing::info!("peer {} removed after grace period", id);
        }
    }

    /// Sends one controller-originated packet, logging instead of failing
    ///
    /// Packet loss is intrinsic to the transport, so a refused send is
    /// not an error the loop should stop for.
    async fn send(&self, dest: SocketAddr, packet_type: PacketType, dest_id: u64, payload: &[u8]) {
        if let Err(e) = self
            .transport
            .send(dest, packet_type, self.id, dest_id, payload)
            .await
        {
            tracing::warn!("send {} to {} failed: {}", packet_type, dest, e);
        }
    }
}

/// Builds the gossip record for a peer
///
/// Only IPv4 endpoints are representable on the wire; the transport is
/// IPv4-only so the v6 arm is unreachable in practice.
fn describe(record: &PeerRecord) -> Option<PeerInfo> {
    match record.endpoint {
        SocketAddr::V4(v4) => Some(PeerInfo {
            id: record.id,
            virtual_ip: record.virtual_ip,
            public_ip: *v4.ip(),
            public_port: v4.port(),
        }),
        SocketAddr::V6(_) => None,
    }
}
