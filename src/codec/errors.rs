//! Packet parsing and validation errors
//!
//! This module defines error types that can occur when decoding datagrams
//! from the wire or assembling them for transmission. All errors implement
//! the standard Error trait for proper error propagation and handling.

use std::fmt;
use std::fmt::Display;

/// Packet decoding and assembly errors
///
/// Represents the failure modes of the fixed-header framing layer. A peer
/// that sends a packet triggering any of these simply has that datagram
/// dropped; decode errors never terminate a loop.
#[derive(Debug, PartialEq, Eq)]
pub enum PacketError {
    /// Buffer is too short to contain a complete header
    ///
    /// Occurs when fewer than 24 bytes arrive in a datagram. UDP delivers
    /// whole datagrams, so this indicates a truncated or foreign sender.
    Malformed,

    /// Header `length` disagrees with the trailing byte count
    ///
    /// The payload length declared in the header must equal the number of
    /// bytes following the header exactly.
    LengthMismatch,

    /// Unknown protocol version
    ///
    /// Only version 1 is understood. Anything else is rejected outright
    /// rather than best-effort parsed.
    UnsupportedVersion(u8),

    /// Payload exceeds the maximum datagram budget
    ///
    /// Packets are capped at 1400 bytes including the header to stay well
    /// inside typical path MTU.
    TooLarge(usize),
}

impl std::error::Error for PacketError {}

impl Display for PacketError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PacketError::Malformed => "datagram shorter than packet header".fmt(fmt),
            PacketError::LengthMismatch => "declared length disagrees with payload".fmt(fmt),
            PacketError::UnsupportedVersion(v) => write!(fmt, "unsupported version {}", v),
            PacketError::TooLarge(n) => write!(fmt, "payload of {} bytes exceeds budget", n),
        }
    }
}
