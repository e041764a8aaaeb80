//! Application payload protection under the session key.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};

use crate::{error::CryptoError, keys::SessionKey};

/// Size of the payload nonce in bytes (XChaCha20 extended nonce).
///
/// Extended nonces are large enough that random generation per message
/// is safe without any counter state shared across reconnects.
pub const PAYLOAD_NONCE_SIZE: usize = 24;

/// Nonce and ciphertext produced by [`encrypt_payload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    /// Random AEAD nonce.
    pub nonce: [u8; PAYLOAD_NONCE_SIZE],
    /// Payload ciphertext (including the AEAD tag).
    pub ciphertext: Vec<u8>,
}

/// Encrypt an application payload under the session key.
///
/// # Errors
///
/// - [`CryptoError::Encrypt`] if AEAD encryption fails
pub fn encrypt_payload(
    key: &SessionKey,
    plaintext: &[u8],
) -> Result<EncryptedPayload, CryptoError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut nonce = [0u8; PAYLOAD_NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Encrypt)?;

    Ok(EncryptedPayload { nonce, ciphertext })
}

/// Decrypt an application payload under the session key.
///
/// The nonce is taken as a slice because it arrives from the wire.
///
/// # Errors
///
/// - [`CryptoError::InvalidLength`] if the nonce is not 24 bytes
/// - [`CryptoError::Decrypt`] if authentication fails (wrong key
///   generation, tampering)
pub fn decrypt_payload(
    key: &SessionKey,
    nonce: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if nonce.len() != PAYLOAD_NONCE_SIZE {
        return Err(CryptoError::InvalidLength {
            field: "nonce",
            expected: PAYLOAD_NONCE_SIZE,
            actual: nonce.len(),
        });
    }

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    cipher.decrypt(XNonce::from_slice(nonce), ciphertext).map_err(|_| CryptoError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = SessionKey::generate();
        let plaintext = b"hello over an unreliable link";

        let encrypted = encrypt_payload(&key, plaintext).unwrap();
        let decrypted = decrypt_payload(&key, &encrypted.nonce, &encrypted.ciphertext).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn stale_key_generation_fails_to_decrypt() {
        // A message encrypted under a superseded session key must not
        // decrypt under the new generation.
        let old = SessionKey::generate();
        let new = SessionKey::generate();

        let encrypted = encrypt_payload(&old, b"secret").unwrap();
        let result = decrypt_payload(&new, &encrypted.nonce, &encrypted.ciphertext);

        assert_eq!(result, Err(CryptoError::Decrypt));
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let key = SessionKey::generate();

        let mut encrypted = encrypt_payload(&key, b"secret").unwrap();
        let last = encrypted.ciphertext.len() - 1;
        encrypted.ciphertext[last] ^= 0x80;

        let result = decrypt_payload(&key, &encrypted.nonce, &encrypted.ciphertext);
        assert_eq!(result, Err(CryptoError::Decrypt));
    }

    #[test]
    fn short_nonce_is_rejected() {
        let key = SessionKey::generate();
        let result = decrypt_payload(&key, &[0u8; 12], b"ciphertext");
        assert!(matches!(result, Err(CryptoError::InvalidLength { field: "nonce", .. })));
    }
}
