//! Frame header with zero-copy parsing.
//!
//! The `FrameHeader` is a fixed 12-byte structure serialized as raw
//! binary (Big Endian). The receiving end can route a frame on the
//! opcode byte without deserializing anything.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    errors::{ProtocolError, Result},
    Opcode,
};

/// Fixed 12-byte frame header (Big Endian network byte order).
///
/// Multi-byte integers are stored as raw byte arrays to avoid alignment
/// issues; every 12-byte pattern is a structurally valid instance, so the
/// header can be cast directly from untrusted network bytes. Semantic
/// validation (magic, version, size limit) happens in [`Self::from_bytes`].
///
/// Layout:
///
/// ```text
/// [magic: 4][version: 1][opcode: 1][reserved: 2][payload_size: 4]
/// ```
#[repr(C)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    magic: [u8; 4],
    version: u8,
    pub(crate) opcode: u8,
    reserved: [u8; 2],
    pub(crate) payload_size: [u8; 4],
}

impl FrameHeader {
    /// Size of the serialized header in bytes.
    pub const SIZE: usize = 12;

    /// Magic number: "TETH" in ASCII.
    pub const MAGIC: u32 = 0x5445_5448;

    /// Current protocol version.
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (256 KiB).
    ///
    /// Frames carry control messages and chat payloads; anything larger
    /// indicates a broken or hostile peer.
    pub const MAX_PAYLOAD_SIZE: u32 = 256 * 1024;

    /// Create a new header for the given opcode with an empty payload.
    ///
    /// The payload size is filled in by [`crate::Frame::new`].
    #[must_use]
    pub fn new(opcode: Opcode) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION,
            opcode: opcode.to_u8(),
            reserved: [0; 2],
            payload_size: [0; 4],
        }
    }

    /// Parse and validate a header from the start of `bytes`.
    ///
    /// Trailing bytes (the payload) are ignored.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::HeaderTruncated`] if fewer than 12 bytes are
    ///   available
    /// - [`ProtocolError::InvalidMagic`] / [`ProtocolError::UnsupportedVersion`]
    ///   on protocol mismatch
    /// - [`ProtocolError::PayloadTooLarge`] if the declared size exceeds
    ///   [`Self::MAX_PAYLOAD_SIZE`]
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let (header, _rest) = Self::ref_from_prefix(bytes).map_err(|_| {
            ProtocolError::HeaderTruncated { expected: Self::SIZE, actual: bytes.len() }
        })?;

        let magic = u32::from_be_bytes(header.magic);
        if magic != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic { found: magic });
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        if header.payload_size() > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: header.payload_size() as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize the header to its 12-byte wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// Raw opcode byte.
    #[must_use]
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Decoded opcode. `None` if the byte maps to no known operation.
    #[must_use]
    pub fn opcode_enum(&self) -> Option<Opcode> {
        Opcode::from_u8(self.opcode)
    }

    /// Declared payload length in bytes.
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }
}

impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("version", &self.version)
            .field("opcode", &self.opcode_enum())
            .field("payload_size", &self.payload_size())
            .finish()
    }
}

impl PartialEq for FrameHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for FrameHeader {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_header_is_valid() {
        let header = FrameHeader::new(Opcode::Ping);
        let bytes = header.to_bytes();

        let parsed = FrameHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.opcode_enum(), Some(Opcode::Ping));
        assert_eq!(parsed.payload_size(), 0);
    }

    #[test]
    fn reject_short_buffer() {
        let result = FrameHeader::from_bytes(&[0u8; 4]);
        assert!(matches!(result, Err(ProtocolError::HeaderTruncated { .. })));
    }

    #[test]
    fn reject_bad_magic() {
        let mut bytes = FrameHeader::new(Opcode::Ping).to_bytes();
        bytes[0] = 0xAA;
        let result = FrameHeader::from_bytes(&bytes);
        assert!(matches!(result, Err(ProtocolError::InvalidMagic { .. })));
    }

    #[test]
    fn reject_bad_version() {
        let mut bytes = FrameHeader::new(Opcode::Ping).to_bytes();
        bytes[4] = 99;
        let result = FrameHeader::from_bytes(&bytes);
        assert!(matches!(result, Err(ProtocolError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_oversized_payload_claim() {
        let mut header = FrameHeader::new(Opcode::AppMessage);
        header.payload_size = (FrameHeader::MAX_PAYLOAD_SIZE + 1).to_be_bytes();
        let bytes = header.to_bytes();
        let result = FrameHeader::from_bytes(&bytes);
        assert!(matches!(result, Err(ProtocolError::PayloadTooLarge { .. })));
    }
}
