//! Protocol-level error types.

use thiserror::Error;

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding frames and payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer is too short to contain a frame header.
    #[error("header truncated: need {expected} bytes, got {actual}")]
    HeaderTruncated {
        /// Required header size in bytes.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// Header magic number did not match the protocol magic.
    #[error("invalid magic number {found:#010x}")]
    InvalidMagic {
        /// Magic value found in the header.
        found: u32,
    },

    /// Unsupported protocol version.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    /// Opcode byte does not map to a known [`crate::Opcode`].
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),

    /// Payload exceeds the maximum allowed size.
    #[error("payload too large: {size} bytes exceeds limit of {max}")]
    PayloadTooLarge {
        /// Declared or actual payload size.
        size: usize,
        /// Maximum allowed payload size.
        max: usize,
    },

    /// Fewer payload bytes were available than the header claims.
    #[error("frame truncated: header claims {expected} payload bytes, got {actual}")]
    FrameTruncated {
        /// Payload length claimed by the header.
        expected: usize,
        /// Payload bytes actually available.
        actual: usize,
    },

    /// Payload bytes did not deserialize as the type the opcode demands.
    #[error("invalid payload for opcode {opcode:?}: {reason}")]
    InvalidPayload {
        /// Opcode the frame was routed under.
        opcode: crate::Opcode,
        /// Serialization error description.
        reason: String,
    },

    /// Payload could not be CBOR-encoded.
    #[error("payload encoding failed: {0}")]
    Encode(String),
}
