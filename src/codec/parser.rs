//! Packet encoder and decoder
//!
//! This module turns typed packets into wire datagrams and back. It owns
//! the header layout; payload interpretation belongs to the dispatching
//! layer (controller and client loops).

use bytes::{Buf, BufMut, BytesMut};

use crate::codec::errors::PacketError;
use crate::codec::packet::{HDR_LEN, MAX_PAYLOAD, PacketHeader, PacketType, VERSION};

pub struct Parser;

impl Parser {
    /// Encodes one packet into a wire datagram
    ///
    /// # Arguments
    /// * `packet_type` - Type code for the header
    /// * `sender_id` - 64-bit id of the sending member
    /// * `dest_id` - 64-bit id of the destination, 0 for the controller
    /// * `sequence` - Per-sender monotonic counter value
    /// * `payload` - Typed payload bytes, may be empty
    ///
    /// # Returns
    /// * `Ok(Vec<u8>)` - Complete datagram (header + payload)
    /// * `Err(PacketError::TooLarge)` - If the payload exceeds the budget
    pub fn encode(
        packet_type: PacketType,
        sender_id: u64,
        dest_id: u64,
        sequence: u32,
        payload: &[u8],
    ) -> Result<Vec<u8>, PacketError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(PacketError::TooLarge(payload.len()));
        }

        let mut buf = BytesMut::with_capacity(HDR_LEN + payload.len());
        buf.put_u8(VERSION);
        buf.put_u8(packet_type.code());
        buf.put_u16(payload.len() as u16);
        buf.put_u64(sender_id);
        buf.put_u64(dest_id);
        buf.put_u32(sequence);
        buf.put_slice(payload);
        Ok(buf.to_vec())
    }

    /// Decodes one wire datagram into a header and payload
    ///
    /// Validation order matters: a buffer must first be long enough to
    /// hold a header at all, then carry a version we understand, then
    /// agree with itself about the payload length. Unknown type codes
    /// pass through as [`PacketType::Unknown`].
    ///
    /// # Returns
    /// * `Ok((PacketHeader, Vec<u8>))` - Parsed header and payload copy
    /// * `Err(PacketError)` - Malformed, UnsupportedVersion or LengthMismatch
    pub fn decode(datagram: &[u8]) -> Result<(PacketHeader, Vec<u8>), PacketError> {
        if datagram.len() < HDR_LEN {
            return Err(PacketError::Malformed);
        }

        let mut buf = datagram;
        let version = buf.get_u8();
        let code = buf.get_u8();
        let length = buf.get_u16();
        let sender_id = buf.get_u64();
        let dest_id = buf.get_u64();
        let sequence = buf.get_u32();

        if version != VERSION {
            return Err(PacketError::UnsupportedVersion(version));
        }
        if length as usize != datagram.len() - HDR_LEN {
            return Err(PacketError::LengthMismatch);
        }

        let header = PacketHeader {
            version,
            packet_type: PacketType::from_code(code),
            length,
            sender_id,
            dest_id,
            sequence,
        };
        Ok((header, buf.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(ty: PacketType, payload: &[u8]) {
        let wire = Parser::encode(ty, 11, 22, 33, payload).unwrap();
        let (header, decoded) = Parser::decode(&wire).unwrap();
        assert_eq!(header.version, VERSION);
        assert_eq!(header.packet_type, ty);
        assert_eq!(header.length as usize, payload.len());
        assert_eq!(header.sender_id, 11);
        assert_eq!(header.dest_id, 22);
        assert_eq!(header.sequence, 33);
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_round_trip_all_types() {
        let payload = b"datagram bytes";
        for code in 0x01..=0x0B {
            round_trip(PacketType::from_code(code), payload);
        }
        round_trip(PacketType::Keepalive, &[]);
        round_trip(PacketType::Unknown(0xEE), b"opaque");
    }

    #[test]
    fn test_header_layout_is_big_endian() {
        let wire = Parser::encode(PacketType::Data, 0x0102030405060708, 0, 1, b"x").unwrap();
        assert_eq!(wire[0], VERSION);
        assert_eq!(wire[1], 0x03);
        // length
        assert_eq!(&wire[2..4], &[0x00, 0x01]);
        // sender id, network order
        assert_eq!(&wire[4..12], &[1, 2, 3, 4, 5, 6, 7, 8]);
        // sequence
        assert_eq!(&wire[20..24], &[0, 0, 0, 1]);
    }

    #[test]
    fn test_decode_rejects_short_buffers() {
        for len in 0..HDR_LEN {
            let buf = vec![0u8; len];
            assert_eq!(Parser::decode(&buf), Err(PacketError::Malformed));
        }
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        let mut wire = Parser::encode(PacketType::Data, 1, 2, 3, b"abcd").unwrap();
        wire.push(0); // trailing garbage
        assert_eq!(Parser::decode(&wire), Err(PacketError::LengthMismatch));

        let mut wire = Parser::encode(PacketType::Data, 1, 2, 3, b"abcd").unwrap();
        wire.truncate(wire.len() - 1);
        assert_eq!(Parser::decode(&wire), Err(PacketError::LengthMismatch));
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let mut wire = Parser::encode(PacketType::Hello, 1, 0, 0, &[]).unwrap();
        wire[0] = 2;
        assert_eq!(Parser::decode(&wire), Err(PacketError::UnsupportedVersion(2)));
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        assert!(matches!(
            Parser::encode(PacketType::Data, 1, 2, 3, &payload),
            Err(PacketError::TooLarge(_))
        ));
    }

    #[test]
    fn test_unknown_type_is_surfaced_not_rejected() {
        let wire = Parser::encode(PacketType::Unknown(0xC3), 1, 0, 0, &[]).unwrap();
        let (header, _) = Parser::decode(&wire).unwrap();
        assert_eq!(header.packet_type, PacketType::Unknown(0xC3));
    }
}
