//! Frame type combining header and payload.
//!
//! A `Frame` is the transport-layer unit: a 12-byte binary header
//! followed by the raw payload bytes (already CBOR-encoded). Holding raw
//! bytes rather than the [`crate::Payload`] enum lets a receiver route on
//! the opcode without deserializing.
//!
//! # Invariants
//!
//! - `payload.len()` always matches `header.payload_size()`; enforced by
//!   [`Frame::new`] and verified by [`Frame::decode`].
//! - `payload.len()` never exceeds [`FrameHeader::MAX_PAYLOAD_SIZE`];
//!   violations are rejected during encoding and decoding.

use bytes::{BufMut, Bytes};

use crate::{
    errors::{ProtocolError, Result},
    FrameHeader,
};

/// Complete protocol frame: header plus raw payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header (12 bytes on the wire).
    pub header: FrameHeader,
    /// Raw payload bytes (already CBOR-encoded).
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame, setting the header's payload size from the actual
    /// payload length.
    ///
    /// Oversized payloads are not rejected here so tests can construct
    /// invalid frames; [`Frame::encode`] is the enforcement point.
    #[must_use]
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();

        // Payload length always fits in u32: Bytes is bounded by
        // isize::MAX and the protocol limit is far below u32::MAX.
        let payload_len = payload.len() as u32;
        header.payload_size = payload_len.to_be_bytes();

        debug_assert_eq!(header.payload_size(), payload_len);

        Self { header, payload }
    }

    /// Total serialized size of this frame in bytes.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        FrameHeader::SIZE + self.payload.len()
    }

    /// Encode the frame into a buffer: `[header][payload]`.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::PayloadTooLarge`] if the payload exceeds
    ///   [`FrameHeader::MAX_PAYLOAD_SIZE`]
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        debug_assert_eq!(self.payload.len(), self.header.payload_size() as usize);

        if self.payload.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Decode a frame from wire format.
    ///
    /// All validation happens before the payload is copied; trailing
    /// bytes beyond the declared payload length are ignored.
    ///
    /// # Errors
    ///
    /// - any [`FrameHeader::from_bytes`] error
    /// - [`ProtocolError::FrameTruncated`] if fewer payload bytes are
    ///   available than the header claims
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(bytes)?;

        let payload_size = header.payload_size() as usize;
        let total_size = FrameHeader::SIZE + payload_size;

        if bytes.len() < total_size {
            return Err(ProtocolError::FrameTruncated {
                expected: payload_size,
                actual: bytes.len().saturating_sub(FrameHeader::SIZE),
            });
        }

        let header = *header;
        let payload = Bytes::copy_from_slice(&bytes[FrameHeader::SIZE..total_size]);

        debug_assert_eq!(payload.len(), payload_size);

        Ok(Self { header, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Opcode;

    #[test]
    fn frame_with_payload_round_trips() {
        let payload = vec![1u8, 2, 3, 4];
        let frame = Frame::new(FrameHeader::new(Opcode::AppMessage), payload.clone());

        assert_eq!(frame.header.payload_size(), payload.len() as u32);

        let mut wire = Vec::new();
        frame.encode(&mut wire).unwrap();

        let parsed = Frame::decode(&wire).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn empty_payload_round_trips() {
        let frame = Frame::new(FrameHeader::new(Opcode::Ping), Vec::new());

        let mut wire = Vec::new();
        frame.encode(&mut wire).unwrap();
        assert_eq!(wire.len(), FrameHeader::SIZE);

        let parsed = Frame::decode(&wire).unwrap();
        assert_eq!(parsed.payload.len(), 0);
    }

    #[test]
    fn reject_truncated_frame() {
        let frame = Frame::new(FrameHeader::new(Opcode::AppMessage), vec![0u8; 100]);

        let mut wire = Vec::new();
        frame.encode(&mut wire).unwrap();

        // Only provide the header and half the payload.
        let result = Frame::decode(&wire[..FrameHeader::SIZE + 50]);
        assert!(matches!(result, Err(ProtocolError::FrameTruncated { expected: 100, actual: 50 })));
    }

    #[test]
    fn reject_oversized_payload_on_encode() {
        let frame = Frame::new(
            FrameHeader::new(Opcode::AppMessage),
            vec![0u8; FrameHeader::MAX_PAYLOAD_SIZE as usize + 1],
        );

        let mut wire = Vec::new();
        assert!(matches!(frame.encode(&mut wire), Err(ProtocolError::PayloadTooLarge { .. })));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let frame = Frame::new(FrameHeader::new(Opcode::Pong), vec![9u8; 3]);

        let mut wire = Vec::new();
        frame.encode(&mut wire).unwrap();
        wire.extend_from_slice(&[0xFF; 8]);

        let parsed = Frame::decode(&wire).unwrap();
        assert_eq!(parsed.payload.as_ref(), &[9u8; 3]);
    }
}
