//! Crypto error types.
//!
//! Deliberately coarse: AEAD failures carry no detail beyond the
//! operation that failed, so nothing about key material or plaintext
//! structure leaks through error messages.

use thiserror::Error;

/// Errors produced by sealing, opening, and payload protection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Sealing the session key failed.
    #[error("sealing the session key failed")]
    Seal,

    /// The sealed session key could not be opened with this server key.
    #[error("the sealed session key could not be opened")]
    Open,

    /// Payload encryption failed.
    #[error("payload encryption failed")]
    Encrypt,

    /// Payload decryption or authentication failed.
    #[error("payload decryption failed")]
    Decrypt,

    /// A textual key encoding did not parse.
    #[error("invalid key encoding: {0}")]
    InvalidKeyEncoding(String),

    /// A byte field has the wrong length.
    #[error("invalid {field} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Name of the offending field.
        field: &'static str,
        /// Required length in bytes.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },
}
