//! Session management payloads: registration and teardown.

use serde::{Deserialize, Serialize};

/// Registration claim is malformed (bad username); retrying the same
/// claim cannot succeed.
pub const REJECT_MALFORMED_IDENTITY: u16 = 1;

/// The sealed session key could not be opened by the server.
pub const REJECT_HANDSHAKE: u16 = 2;

/// Identity claim carrying the sealed session key.
///
/// The session key is a fresh 32-byte symmetric key sealed under the
/// server's public key: `ephemeral_public` is the client's one-shot
/// X25519 public key, `sealed_key` the AEAD ciphertext of the session
/// key under the derived wrapping key. The server never sees the key
/// material of previous generations; each claim supersedes the last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {
    /// Claimed username (uniqueness is case-insensitive).
    pub username: String,
    /// Ephemeral X25519 public key (32 bytes).
    pub ephemeral_public: Vec<u8>,
    /// AEAD nonce used to seal the session key (24 bytes).
    pub nonce: Vec<u8>,
    /// Sealed session key ciphertext.
    pub sealed_key: Vec<u8>,
}

/// Server accepted a registration claim and bound the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterAck {
    /// Server-assigned identifier of this session generation.
    pub session_id: u64,
}

/// Server rejected a registration claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterFail {
    /// Rejection code (`REJECT_MALFORMED_IDENTITY`, `REJECT_HANDSHAKE`).
    pub code: u16,
    /// Human-readable reason.
    pub message: String,
}

impl RegisterFail {
    /// The claim's username failed validation. Terminal for the client.
    #[must_use]
    pub fn malformed_identity(message: impl Into<String>) -> Self {
        Self { code: REJECT_MALFORMED_IDENTITY, message: message.into() }
    }

    /// The sealed key could not be opened.
    #[must_use]
    pub fn handshake_rejected(message: impl Into<String>) -> Self {
        Self { code: REJECT_HANDSHAKE, message: message.into() }
    }
}

/// Graceful teardown notice.
///
/// Sent by a client on user-initiated shutdown, and by the server to a
/// connection whose identity binding was superseded by a newer claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goodbye {
    /// Reason for the teardown.
    pub reason: String,
}
