//! Fuzz target for open_session_key
//!
//! This fuzzer feeds the server-side seal opening with attacker-shaped
//! input: arbitrary ephemeral keys, nonces, and ciphertexts. The opening
//! path runs on every registration claim, before any identity is bound.
//!
//! The fuzzer should NEVER panic. Invalid seals must fail with a
//! structured error and must never yield a session key.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tether_crypto::{open_session_key, SealedKey, ServerKeyPair};

#[derive(Debug, Arbitrary)]
struct ArbitrarySeal {
    ephemeral_public: [u8; 32],
    nonce: [u8; 24],
    ciphertext: Vec<u8>,
}

fuzz_target!(|seal: ArbitrarySeal| {
    // Fixed seed keeps runs reproducible.
    let keypair = ServerKeyPair::from_seed([0x5Au8; 32]);

    let sealed = SealedKey {
        ephemeral_public: seal.ephemeral_public,
        nonce: seal.nonce,
        ciphertext: seal.ciphertext,
    };

    // A forged seal cannot authenticate under the AEAD tag; the only
    // acceptable outcome for fuzz input is a structured error.
    let _ = open_session_key(&keypair, &sealed);
});
