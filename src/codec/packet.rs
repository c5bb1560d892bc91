//! Packet definitions for the overlay protocol
//!
//! This module defines the packet types and fixed-layout structures shared
//! by the controller, the clients and the admin CLI. Every datagram on the
//! wire starts with the same header; typed payloads follow it.
//!
//! # Packet Header Format (24 bytes, big-endian)
//! ```text
//! +--------+--------+-----------------+-------- ... --------+-------- ... --------+---- ... ----+
//! |Version |  Type  |  Length (2B)    |   Sender Id (8B)    |    Dest Id (8B)     | Sequence(4B)|
//! +--------+--------+-----------------+-------- ... --------+-------- ... --------+---- ... ----+
//! ```
//!
//! - Version: 0x01 (1 byte) - Protocol version
//! - Type: Packet type identifier (1 byte)
//! - Length: Payload length in bytes, header excluded (2 bytes)
//! - Sender Id: 64-bit member id of the sender (8 bytes)
//! - Dest Id: 64-bit member id of the destination, 0 for the controller (8 bytes)
//! - Sequence: per-sender monotonic counter, wraps modulo 2^32 (4 bytes)

use bytes::{Buf, BufMut, BytesMut};
use std::fmt::Display;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::codec::errors::PacketError;

/// Protocol version understood by this implementation
pub const VERSION: u8 = 0x01;

/// Packet header length in bytes
pub const HDR_LEN: usize = 24;

/// Maximum size of one datagram, header included
///
/// Chosen to stay well inside typical path MTU so the overlay never
/// depends on IP fragmentation.
pub const MAX_PACKET_SIZE: usize = 1400;

/// Maximum payload carried by one packet
pub const MAX_PAYLOAD: usize = MAX_PACKET_SIZE - HDR_LEN;

/// Fixed size of an encoded [`PeerInfo`] record
pub const PEER_INFO_LEN: usize = 18;

/// Size of the network id carried by JOIN_REQUEST
pub const NETWORK_ID_SIZE: usize = 16;

/// Packet type identifiers
///
/// Each type serves a specific step of the overlay lifecycle. Unknown
/// codes are carried through as [`PacketType::Unknown`] so higher layers
/// can ignore them instead of failing the decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Liveness probe to the controller (0x01)
    Hello,
    /// Controller reply to a Hello (0x02)
    HelloAck,
    /// Tunneled IP datagram, optionally sealed (0x03)
    Data,
    /// Keepalive ping, sent by both sides (0x04)
    Keepalive,
    /// Graceful departure notice (0x05)
    Bye,
    /// Membership request carrying the 16-byte network id (0x06)
    JoinRequest,
    /// Admission result: 4-byte virtual IP on accept, empty on deny (0x07)
    JoinResponse,
    /// One peer record pushed by the controller (0x08)
    PeerInfo,
    /// Admin request for the full peer table (0x09)
    ListRequest,
    /// Terminator after the last PeerInfo of a listing (0x0A)
    ListDone,
    /// Direct client-to-client reachability probe (0x0B)
    PeerHello,
    /// Any code this implementation does not understand
    Unknown(u8),
}

impl PacketType {
    /// Wire code of this packet type
    pub fn code(&self) -> u8 {
        match self {
            PacketType::Hello => 0x01,
            PacketType::HelloAck => 0x02,
            PacketType::Data => 0x03,
            PacketType::Keepalive => 0x04,
            PacketType::Bye => 0x05,
            PacketType::JoinRequest => 0x06,
            PacketType::JoinResponse => 0x07,
            PacketType::PeerInfo => 0x08,
            PacketType::ListRequest => 0x09,
            PacketType::ListDone => 0x0A,
            PacketType::PeerHello => 0x0B,
            PacketType::Unknown(code) => *code,
        }
    }

    /// Maps a wire code to a packet type
    ///
    /// Never fails: codes outside the assigned range come back as
    /// [`PacketType::Unknown`] and are dispatched (and dropped) as such.
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => PacketType::Hello,
            0x02 => PacketType::HelloAck,
            0x03 => PacketType::Data,
            0x04 => PacketType::Keepalive,
            0x05 => PacketType::Bye,
            0x06 => PacketType::JoinRequest,
            0x07 => PacketType::JoinResponse,
            0x08 => PacketType::PeerInfo,
            0x09 => PacketType::ListRequest,
            0x0A => PacketType::ListDone,
            0x0B => PacketType::PeerHello,
            other => PacketType::Unknown(other),
        }
    }
}

impl Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketType::Hello => "HELLO".fmt(f),
            PacketType::HelloAck => "HELLO_ACK".fmt(f),
            PacketType::Data => "DATA".fmt(f),
            PacketType::Keepalive => "KEEPALIVE".fmt(f),
            PacketType::Bye => "BYE".fmt(f),
            PacketType::JoinRequest => "JOIN_REQUEST".fmt(f),
            PacketType::JoinResponse => "JOIN_RESPONSE".fmt(f),
            PacketType::PeerInfo => "PEER_INFO".fmt(f),
            PacketType::ListRequest => "LIST_REQUEST".fmt(f),
            PacketType::ListDone => "LIST_DONE".fmt(f),
            PacketType::PeerHello => "PEER_HELLO".fmt(f),
            PacketType::Unknown(code) => write!(f, "UNKNOWN({:#04x})", code),
        }
    }
}

/// Decoded packet header
///
/// All multi-byte fields are big-endian on the wire, including the two
/// id fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub version: u8,
    pub packet_type: PacketType,
    /// Payload length in bytes, header excluded
    pub length: u16,
    pub sender_id: u64,
    /// 0 when addressed to the controller or unknown
    pub dest_id: u64,
    /// Monotonically increasing per sender, wraps modulo 2^32
    pub sequence: u32,
}

/// One peer record as gossiped by the controller
///
/// Crosses host boundaries, so the layout is fixed and explicit:
/// `peer_id(8) || virtual_ip(4) || public_ip(4) || public_port(2)`,
/// all big-endian, 18 bytes total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: u64,
    pub virtual_ip: Ipv4Addr,
    pub public_ip: Ipv4Addr,
    pub public_port: u16,
}

impl PeerInfo {
    /// Encodes this record into its 18-byte wire form
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(PEER_INFO_LEN);
        buf.put_u64(self.id);
        buf.put_u32(u32::from(self.virtual_ip));
        buf.put_u32(u32::from(self.public_ip));
        buf.put_u16(self.public_port);
        buf.to_vec()
    }

    /// Decodes a record from its 18-byte wire form
    ///
    /// Fails with [`PacketError::LengthMismatch`] when the payload is not
    /// exactly 18 bytes; a truncated record is useless and a longer one
    /// means the sender speaks a different dialect.
    pub fn decode(payload: &[u8]) -> Result<Self, PacketError> {
        if payload.len() != PEER_INFO_LEN {
            return Err(PacketError::LengthMismatch);
        }
        let mut buf = payload;
        Ok(PeerInfo {
            id: buf.get_u64(),
            virtual_ip: Ipv4Addr::from(buf.get_u32()),
            public_ip: Ipv4Addr::from(buf.get_u32()),
            public_port: buf.get_u16(),
        })
    }

    /// Public UDP endpoint of the peer
    pub fn endpoint(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.public_ip, self.public_port))
    }
}

impl Display for PeerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "peer_id={} addr={}:{} vIP={}",
            self.id, self.public_ip, self.public_port, self.virtual_ip
        )
    }
}
