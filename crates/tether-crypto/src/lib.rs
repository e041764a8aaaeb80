//! Cryptographic primitives for the tether session layer.
//!
//! Two concerns live here:
//!
//! - **Session key transport** ([`seal_session_key`] / [`open_session_key`]):
//!   a client seals a fresh 32-byte session key under the server's static
//!   X25519 public key (ephemeral ECDH → HKDF-SHA256 → XChaCha20-Poly1305),
//!   so only the holder of the server secret can recover it. A new
//!   ephemeral key and session key are generated for every handshake;
//!   key material is never reused across generations.
//! - **Payload protection** ([`encrypt_payload`] / [`decrypt_payload`]):
//!   application payloads are encrypted under the established session key.
//!
//! No I/O and no wire formats: callers move the resulting byte fields in
//! and out of protocol payloads themselves.

mod aead;
mod error;
mod keys;
mod seal;

pub use aead::{decrypt_payload, encrypt_payload, EncryptedPayload, PAYLOAD_NONCE_SIZE};
pub use error::CryptoError;
pub use keys::{ServerKeyPair, ServerPublicKey, SessionKey, SEED_SIZE, SESSION_KEY_SIZE};
pub use seal::{open_session_key, seal_session_key, SealedKey, SEAL_NONCE_SIZE};

/// Convenience alias for crypto results.
pub type Result<T> = std::result::Result<T, CryptoError>;
