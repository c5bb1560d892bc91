//! Non-blocking UDP transport for framed overlay packets
//!
//! One transport owns one UDP socket and the per-process sequence counter.
//! It assembles and validates the fixed 24-byte header; everything above
//! it (dispatch, peer state) lives in the controller and client loops.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::codec::packet::{PacketHeader, PacketType};
use crate::codec::parser::Parser;

/// Default UDP port of the rendezvous controller
pub const DEFAULT_PORT: u16 = 9993;

/// Receive buffer size
///
/// Larger than the 1400-byte packet budget so an oversized foreign
/// datagram is read whole and rejected by the decoder instead of being
/// silently truncated into something that might parse.
const BUFFER_SIZE: usize = 2048;

/// UDP transport bound to one local port
///
/// The sequence counter lives here so every outgoing packet advances it,
/// regardless of which loop sends. The transport neither deduplicates nor
/// retransmits; receivers may inspect `sequence` to detect reordering and
/// nothing more is promised.
pub struct UdpTransport {
    socket: UdpSocket,
    sequence: AtomicU32,
}

impl UdpTransport {
    /// Binds a transport to `0.0.0.0:port` (0 = ephemeral)
    ///
    /// Goes through `socket2` to set `SO_REUSEADDR` before the bind, so a
    /// controller restarting on its well-known port does not trip over a
    /// socket lingering from the previous run.
    pub async fn bind(port: u16) -> crate::Result<Self> {
        let addr: SocketAddr = SocketAddr::from(([0, 0, 0, 0], port));
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;

        let socket = UdpSocket::from_std(std::net::UdpSocket::from(socket))?;
        tracing::info!("UDP transport listening on {}", socket.local_addr()?);
        Ok(UdpTransport {
            socket,
            sequence: AtomicU32::new(0),
        })
    }

    /// Local address the socket ended up bound to
    ///
    /// Mostly interesting after binding port 0.
    pub fn local_addr(&self) -> crate::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Sends one packet to `dest`
    ///
    /// Assembles header + payload, transmits one datagram and advances
    /// the sequence counter. Fails with `TooLarge` when the payload does
    /// not fit the datagram budget and with the underlying IO error when
    /// the OS refuses the send.
    pub async fn send(
        &self,
        dest: SocketAddr,
        packet_type: PacketType,
        sender_id: u64,
        dest_id: u64,
        payload: &[u8],
    ) -> crate::Result<()> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let datagram = Parser::encode(packet_type, sender_id, dest_id, sequence, payload)?;
        self.socket.send_to(&datagram, dest).await?;
        tracing::trace!("sent {} to {} ({} bytes)", packet_type, dest, datagram.len());
        Ok(())
    }

    /// Receives one packet
    ///
    /// Awaits the next datagram and decodes its header; the caller's
    /// `select!` arm is the readiness wait. Decode failures surface as
    /// `PacketError` and the loop policy is to drop and continue.
    pub async fn recv(&self) -> crate::Result<(PacketHeader, Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; BUFFER_SIZE];
        let (len, src) = self.socket.recv_from(&mut buf).await?;
        let (header, payload) = Parser::decode(&buf[..len])?;
        tracing::trace!(
            "received {} from {} ({} bytes)",
            header.packet_type,
            src,
            len
        );
        Ok((header, payload, src))
    }
}
