//! Key material: server keypair, public key encoding, session keys.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Size of a symmetric session key in bytes.
pub const SESSION_KEY_SIZE: usize = 32;

/// Size of an X25519 secret seed in bytes.
pub const SEED_SIZE: usize = 32;

// ---------------------------------------------------------------------------
// SessionKey
// ---------------------------------------------------------------------------

/// Symmetric session key (32 bytes), one per handshake generation.
///
/// Zeroized on drop. Deliberately not `Clone`: each generation has a
/// single owner on each side (the client session task, the server's
/// registry binding), and a superseding handshake replaces the value
/// wholesale rather than mutating it.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_SIZE]);

impl SessionKey {
    /// Wrap raw key bytes (e.g. produced by an injected RNG).
    #[must_use]
    pub fn from_bytes(bytes: [u8; SESSION_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random session key from OS entropy.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.0
    }
}

// SessionKey does not implement Debug/Display to prevent leakage.

// ---------------------------------------------------------------------------
// ServerPublicKey
// ---------------------------------------------------------------------------

/// Server's static X25519 public key.
///
/// Travels in a standard textual encoding (base64) through the
/// out-of-band key lookup, and is the value clients cache between
/// handshakes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServerPublicKey(x25519_dalek::PublicKey);

impl ServerPublicKey {
    /// Build from the raw 32-byte Montgomery-form representation.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(x25519_dalek::PublicKey::from(bytes))
    }

    /// Raw 32-byte representation.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Encode to the textual wire form (base64).
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0.as_bytes())
    }

    /// Parse the textual wire form.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;

        let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| CryptoError::InvalidLength {
            field: "public key",
            expected: 32,
            actual: v.len(),
        })?;

        Ok(Self::from_bytes(bytes))
    }

    pub(crate) fn inner(&self) -> &x25519_dalek::PublicKey {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// ServerKeyPair
// ---------------------------------------------------------------------------

/// Server's static X25519 keypair.
///
/// The secret half never leaves this type; the underlying
/// `x25519-dalek` secret zeroizes its memory on drop.
pub struct ServerKeyPair {
    secret: x25519_dalek::StaticSecret,
}

impl ServerKeyPair {
    /// Generate a fresh keypair from OS entropy.
    #[must_use]
    pub fn generate() -> Self {
        Self { secret: x25519_dalek::StaticSecret::random_from_rng(OsRng) }
    }

    /// Rebuild a keypair from a stored 32-byte seed.
    ///
    /// Clamping happens inside `x25519-dalek` during scalar
    /// multiplication, so the raw bytes are stored as-is.
    #[must_use]
    pub fn from_seed(seed: [u8; SEED_SIZE]) -> Self {
        Self { secret: x25519_dalek::StaticSecret::from(seed) }
    }

    /// Parse a base64-encoded 32-byte seed.
    pub fn from_base64_seed(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;

        let seed: [u8; SEED_SIZE] =
            bytes.try_into().map_err(|v: Vec<u8>| CryptoError::InvalidLength {
                field: "key seed",
                expected: SEED_SIZE,
                actual: v.len(),
            })?;

        Ok(Self::from_seed(seed))
    }

    /// Derive the corresponding public key.
    #[must_use]
    pub fn public_key(&self) -> ServerPublicKey {
        ServerPublicKey(x25519_dalek::PublicKey::from(&self.secret))
    }

    pub(crate) fn diffie_hellman(
        &self,
        their_public: &x25519_dalek::PublicKey,
    ) -> x25519_dalek::SharedSecret {
        self.secret.diffie_hellman(their_public)
    }
}

// ServerKeyPair does not implement Clone/Debug to prevent leakage.
