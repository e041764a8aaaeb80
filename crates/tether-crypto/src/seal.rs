//! Session key transport under the server's public key.
//!
//! The client performs a one-shot X25519 agreement against the server's
//! static public key, derives a wrapping key with HKDF-SHA256, and seals
//! the fresh session key with XChaCha20-Poly1305. The ephemeral public
//! key rides along as AEAD associated data, binding the ciphertext to
//! the exchange that produced it.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::{
    error::CryptoError,
    keys::{ServerKeyPair, ServerPublicKey, SessionKey, SESSION_KEY_SIZE},
};

/// Size of the sealing nonce in bytes (XChaCha20 extended nonce).
pub const SEAL_NONCE_SIZE: usize = 24;

/// Domain separation label for the wrapping key derivation.
const WRAP_INFO: &[u8] = b"tether session key wrap v1";

/// A session key sealed under a server public key.
///
/// All fields are plain bytes so callers can move them directly into
/// wire payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedKey {
    /// Client's one-shot X25519 public key.
    pub ephemeral_public: [u8; 32],
    /// AEAD nonce.
    pub nonce: [u8; SEAL_NONCE_SIZE],
    /// Session key ciphertext (including the AEAD tag).
    pub ciphertext: Vec<u8>,
}

/// Seal `session_key` under `server_public`.
///
/// A fresh ephemeral X25519 secret is generated per call and discarded
/// afterwards, so no two seals share key material.
///
/// # Errors
///
/// - [`CryptoError::Seal`] if AEAD encryption fails
pub fn seal_session_key(
    server_public: &ServerPublicKey,
    session_key: &SessionKey,
) -> Result<SealedKey, CryptoError> {
    let ephemeral = x25519_dalek::StaticSecret::random_from_rng(OsRng);
    let ephemeral_public = x25519_dalek::PublicKey::from(&ephemeral);

    let shared = ephemeral.diffie_hellman(server_public.inner());
    let wrap_key = derive_wrap_key(shared.as_bytes())?;

    let cipher = XChaCha20Poly1305::new(Key::from_slice(wrap_key.as_ref()));

    let mut nonce = [0u8; SEAL_NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload { msg: session_key.as_bytes(), aad: ephemeral_public.as_bytes() },
        )
        .map_err(|_| CryptoError::Seal)?;

    Ok(SealedKey { ephemeral_public: *ephemeral_public.as_bytes(), nonce, ciphertext })
}

/// Open a sealed session key with the server's keypair.
///
/// # Errors
///
/// - [`CryptoError::Open`] if the ciphertext does not authenticate under
///   this keypair (wrong server key, tampering, or a corrupt claim)
/// - [`CryptoError::InvalidLength`] if the recovered plaintext is not a
///   32-byte key
pub fn open_session_key(
    keypair: &ServerKeyPair,
    sealed: &SealedKey,
) -> Result<SessionKey, CryptoError> {
    let their_public = x25519_dalek::PublicKey::from(sealed.ephemeral_public);

    let shared = keypair.diffie_hellman(&their_public);
    let wrap_key = derive_wrap_key(shared.as_bytes())?;

    let cipher = XChaCha20Poly1305::new(Key::from_slice(wrap_key.as_ref()));

    let plaintext = Zeroizing::new(
        cipher
            .decrypt(
                XNonce::from_slice(&sealed.nonce),
                Payload { msg: sealed.ciphertext.as_slice(), aad: &sealed.ephemeral_public },
            )
            .map_err(|_| CryptoError::Open)?,
    );

    let bytes: [u8; SESSION_KEY_SIZE] =
        plaintext.as_slice().try_into().map_err(|_| CryptoError::InvalidLength {
            field: "session key",
            expected: SESSION_KEY_SIZE,
            actual: plaintext.len(),
        })?;

    Ok(SessionKey::from_bytes(bytes))
}

fn derive_wrap_key(shared_secret: &[u8]) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let hk = Hkdf::<Sha256>::new(None, shared_secret);
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(WRAP_INFO, okm.as_mut()).map_err(|_| CryptoError::Seal)?;
    Ok(okm)
}
