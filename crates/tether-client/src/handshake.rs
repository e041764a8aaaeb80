//! Cryptographic handshake after each (re)connection.
//!
//! Per attempt: resolve the server's public key (fresh fetch, falling
//! back to the last good cached key), generate a brand-new session key,
//! seal it under the server key, and exchange it in a `Register` claim.
//! Session keys are never reused across attempts, so a compromised
//! generation stays compromised alone.

use parking_lot::Mutex;

use tether_core::{Environment, SessionFailure};
use tether_crypto::{seal_session_key, ServerPublicKey, SessionKey, SESSION_KEY_SIZE};
use tether_proto::{
    payloads::session::{Register, REJECT_MALFORMED_IDENTITY},
    Payload,
};

use crate::transport::{Dialer, SessionLink};

/// Performs the registration handshake and caches the server key.
///
/// The cache outlives individual attempts and sessions: a fetch failure
/// during reconnection falls back to the cached key, and the handshake
/// fails with [`SessionFailure::KeyFetchFailed`] only when neither is
/// available.
#[derive(Debug, Default)]
pub struct HandshakeCoordinator {
    cached_key: Mutex<Option<ServerPublicKey>>,
}

impl HandshakeCoordinator {
    /// Coordinator with an empty key cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last successfully fetched server key, if any.
    #[must_use]
    pub fn cached_key(&self) -> Option<ServerPublicKey> {
        *self.cached_key.lock()
    }

    /// Run one handshake over `link`, claiming `username`.
    ///
    /// On success the freshly generated session key of this generation
    /// is returned; the server holds its twin.
    ///
    /// # Errors
    ///
    /// - [`SessionFailure::KeyFetchFailed`] with no usable server key
    /// - [`SessionFailure::TransportUnavailable`] if the link dies
    /// - [`SessionFailure::RegistrationRejected`] on a malformed-identity
    ///   rejection (terminal)
    /// - [`SessionFailure::HandshakeRejected`] on any other rejection or
    ///   protocol violation
    pub async fn establish<E, D>(
        &self,
        env: &E,
        dialer: &D,
        link: &mut D::Link,
        username: &str,
    ) -> Result<SessionKey, SessionFailure>
    where
        E: Environment,
        D: Dialer,
    {
        let server_key = self.resolve_server_key(dialer).await?;

        let mut key_bytes = [0u8; SESSION_KEY_SIZE];
        env.random_bytes(&mut key_bytes);
        let session_key = SessionKey::from_bytes(key_bytes);

        let sealed = seal_session_key(&server_key, &session_key).map_err(|e| {
            tracing::debug!(error = %e, "sealing session key failed");
            SessionFailure::HandshakeRejected
        })?;

        let claim = Payload::Register(Register {
            username: username.to_string(),
            ephemeral_public: sealed.ephemeral_public.to_vec(),
            nonce: sealed.nonce.to_vec(),
            sealed_key: sealed.ciphertext,
        });

        let frame = claim.into_frame().map_err(|e| {
            tracing::debug!(error = %e, "encoding registration claim failed");
            SessionFailure::HandshakeRejected
        })?;

        link.send_frame(frame).await.map_err(|e| {
            tracing::debug!(error = %e, "sending registration claim failed");
            SessionFailure::TransportUnavailable
        })?;

        let reply = link.recv_frame().await.map_err(|e| {
            tracing::debug!(error = %e, "waiting for registration reply failed");
            SessionFailure::TransportUnavailable
        })?;

        match Payload::from_frame(&reply) {
            Ok(Payload::RegisterAck(ack)) => {
                tracing::debug!(session_id = ack.session_id, "registration accepted");
                Ok(session_key)
            },
            Ok(Payload::RegisterFail(fail)) if fail.code == REJECT_MALFORMED_IDENTITY => {
                tracing::warn!(reason = %fail.message, "registration claim rejected");
                Err(SessionFailure::RegistrationRejected)
            },
            Ok(Payload::RegisterFail(fail)) => {
                tracing::debug!(code = fail.code, reason = %fail.message, "handshake rejected");
                Err(SessionFailure::HandshakeRejected)
            },
            Ok(other) => {
                tracing::debug!(opcode = ?other.opcode(), "unexpected reply to registration");
                Err(SessionFailure::HandshakeRejected)
            },
            Err(e) => {
                tracing::debug!(error = %e, "malformed registration reply");
                Err(SessionFailure::HandshakeRejected)
            },
        }
    }

    async fn resolve_server_key<D: Dialer>(
        &self,
        dialer: &D,
    ) -> Result<ServerPublicKey, SessionFailure> {
        match dialer.fetch_server_key().await {
            Ok(key) => {
                *self.cached_key.lock() = Some(key);
                Ok(key)
            },
            Err(e) => {
                tracing::debug!(error = %e, "server key fetch failed, trying cache");
                self.cached_key.lock().ok_or(SessionFailure::KeyFetchFailed)
            },
        }
    }
}
