//! Server driver.
//!
//! Ties together the session registry (username → connection bindings),
//! the liveness monitor (heartbeat probing), and the server keypair
//! (opening sealed session keys). The driver is sans-IO: the runtime
//! feeds it [`ServerEvent`]s and executes the [`ServerAction`]s it
//! returns. Each event is processed atomically: registration decisions
//! for a username can never interleave because the owning runtime
//! serializes `process_event` calls.

use std::collections::HashSet;

use tether_core::Environment;
use tether_crypto::{decrypt_payload, encrypt_payload, open_session_key, SealedKey, SEAL_NONCE_SIZE};
use tether_proto::{
    payloads::{
        app::{AppMessage, MessageAck},
        control::{HealthResponse, KeyResponse},
        session::{Goodbye, Register, RegisterAck, RegisterFail},
    },
    ErrorPayload, Frame, Payload,
};

use crate::{
    error::ServerError,
    liveness::{LivenessAction, LivenessConfig, LivenessMonitor},
    registry::{validate_username, SessionBinding, SessionRegistry},
};

/// Server configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Heartbeat probing (interval, silence timeout).
    pub liveness: LivenessConfig,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { liveness: LivenessConfig::default(), max_connections: 10_000 }
    }
}

/// Events the server driver processes.
///
/// Produced by the owning runtime (production TCP glue or tests).
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new transport connection was accepted.
    ConnectionAccepted {
        /// Runtime-assigned connection identifier.
        connection_id: u64,
    },

    /// A frame arrived from a connection.
    FrameReceived {
        /// Originating connection.
        connection_id: u64,
        /// The received frame.
        frame: Frame,
    },

    /// A connection was closed by the peer or by transport failure.
    ConnectionClosed {
        /// The closed connection.
        connection_id: u64,
        /// Reason for closure.
        reason: String,
    },

    /// Periodic tick driving heartbeat probes and expiry.
    Tick,
}

/// Actions the driver asks the runtime to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    /// Send a frame to a connection.
    Send {
        /// Target connection.
        connection_id: u64,
        /// Frame to send.
        frame: Frame,
    },

    /// Close a connection.
    Close {
        /// Connection to close.
        connection_id: u64,
        /// Reason for closure.
        reason: String,
    },
}

/// Action-based server driver: the only owner of the registry and the
/// liveness monitor.
pub struct ServerDriver<E: Environment> {
    env: E,
    config: ServerConfig,
    keypair: tether_crypto::ServerKeyPair,
    /// Open transport connections, bound or not.
    connections: HashSet<u64>,
    registry: SessionRegistry<E::Instant>,
    liveness: LivenessMonitor<E::Instant>,
}

impl<E: Environment> ServerDriver<E> {
    /// Create a driver owning `keypair`.
    pub fn new(env: E, keypair: tether_crypto::ServerKeyPair, config: ServerConfig) -> Self {
        Self {
            env,
            keypair,
            connections: HashSet::new(),
            registry: SessionRegistry::new(),
            liveness: LivenessMonitor::new(config.liveness),
            config,
        }
    }

    /// Public half of the server keypair (served to clients over
    /// `KeyRequest`).
    #[must_use]
    pub fn public_key(&self) -> tether_crypto::ServerPublicKey {
        self.keypair.public_key()
    }

    /// Number of open transport connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// The username → session binding table.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry<E::Instant> {
        &self.registry
    }

    /// Process one event and return the actions to execute.
    ///
    /// This is the single entry point; the caller must serialize calls.
    ///
    /// # Errors
    ///
    /// - [`ServerError::UnknownConnection`] for a frame from a
    ///   connection the driver has never been told about
    /// - [`ServerError::Protocol`] if a reply frame cannot be encoded
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, ServerError> {
        match event {
            ServerEvent::ConnectionAccepted { connection_id } => {
                self.handle_connection_accepted(connection_id)
            },
            ServerEvent::FrameReceived { connection_id, frame } => {
                self.handle_frame_received(connection_id, &frame)
            },
            ServerEvent::ConnectionClosed { connection_id, reason } => {
                self.handle_connection_closed(connection_id, &reason)
            },
            ServerEvent::Tick => self.handle_tick(),
        }
    }

    fn handle_connection_accepted(
        &mut self,
        connection_id: u64,
    ) -> Result<Vec<ServerAction>, ServerError> {
        if self.connections.len() >= self.config.max_connections {
            tracing::warn!(connection_id, "refusing connection: server is full");
            return Ok(vec![ServerAction::Close {
                connection_id,
                reason: "max connections exceeded".to_string(),
            }]);
        }

        self.connections.insert(connection_id);
        tracing::debug!(connection_id, "connection accepted");

        Ok(Vec::new())
    }

    fn handle_frame_received(
        &mut self,
        connection_id: u64,
        frame: &Frame,
    ) -> Result<Vec<ServerAction>, ServerError> {
        if !self.connections.contains(&connection_id) {
            return Err(ServerError::UnknownConnection(connection_id));
        }

        let payload = match Payload::from_frame(frame) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(connection_id, error = %e, "closing connection on malformed frame");
                let reply = Payload::Error(ErrorPayload::frame_rejected("malformed frame"))
                    .into_frame()?;
                return Ok(vec![
                    ServerAction::Send { connection_id, frame: reply },
                    ServerAction::Close {
                        connection_id,
                        reason: "protocol violation".to_string(),
                    },
                ]);
            },
        };

        match payload {
            Payload::Register(register) => self.handle_register(connection_id, &register),
            Payload::Pong => {
                self.liveness.observe_pong(connection_id, self.env.now());
                Ok(Vec::new())
            },
            Payload::AppMessage(message) => self.handle_app_message(connection_id, &message),
            Payload::Goodbye(goodbye) => {
                tracing::debug!(connection_id, reason = %goodbye.reason, "client said goodbye");
                self.unbind(connection_id);
                Ok(vec![ServerAction::Close {
                    connection_id,
                    reason: "client sent goodbye".to_string(),
                }])
            },
            Payload::KeyRequest => {
                let reply = Payload::KeyResponse(KeyResponse {
                    public_key: self.keypair.public_key().to_base64(),
                })
                .into_frame()?;
                Ok(vec![ServerAction::Send { connection_id, frame: reply }])
            },
            Payload::HealthRequest => {
                let reply =
                    Payload::HealthResponse(HealthResponse { healthy: true }).into_frame()?;
                Ok(vec![ServerAction::Send { connection_id, frame: reply }])
            },
            other => {
                tracing::debug!(
                    connection_id,
                    opcode = ?other.opcode(),
                    "ignoring unexpected frame"
                );
                Ok(Vec::new())
            },
        }
    }

    /// Apply a registration claim.
    ///
    /// Validation, then sealed-key opening, then the registry claim. A
    /// decrypt failure rejects the handshake without binding anything
    /// and without disturbing an existing binding for the username. No
    /// application frame is accepted from this connection until a claim
    /// succeeds.
    fn handle_register(
        &mut self,
        connection_id: u64,
        register: &Register,
    ) -> Result<Vec<ServerAction>, ServerError> {
        let now = self.env.now();

        if let Err(reason) = validate_username(&register.username) {
            tracing::warn!(connection_id, reason, "rejecting malformed registration claim");
            let reply =
                Payload::RegisterFail(RegisterFail::malformed_identity(reason)).into_frame()?;
            return Ok(vec![
                ServerAction::Send { connection_id, frame: reply },
                ServerAction::Close {
                    connection_id,
                    reason: "malformed registration claim".to_string(),
                },
            ]);
        }

        let session_key = match self.open_claimed_key(register) {
            Ok(key) => key,
            Err(detail) => {
                tracing::warn!(connection_id, detail, "rejecting unopenable session key");
                let reply = Payload::RegisterFail(RegisterFail::handshake_rejected(
                    "the sealed session key could not be opened",
                ))
                .into_frame()?;
                return Ok(vec![ServerAction::Send { connection_id, frame: reply }]);
            },
        };

        let session_id = self.env.random_u64();
        let outcome = self.registry.claim(SessionBinding {
            username: register.username.clone(),
            connection_id,
            session_id,
            session_key,
            created_at: now,
        });
        self.liveness.track(connection_id, now);

        let mut actions = Vec::new();

        if let Some(evicted) = outcome.evicted {
            tracing::info!(
                connection_id,
                evicted,
                username = %register.username,
                "binding superseded by a newer registration"
            );
            self.liveness.forget(evicted);

            let goodbye = Payload::Goodbye(Goodbye {
                reason: "session superseded by a newer registration".to_string(),
            })
            .into_frame()?;
            actions.push(ServerAction::Send { connection_id: evicted, frame: goodbye });
            actions.push(ServerAction::Close {
                connection_id: evicted,
                reason: "binding superseded".to_string(),
            });
        }

        tracing::info!(
            connection_id,
            session_id,
            username = %register.username,
            "registration accepted"
        );
        let ack = Payload::RegisterAck(RegisterAck { session_id }).into_frame()?;
        actions.push(ServerAction::Send { connection_id, frame: ack });

        Ok(actions)
    }

    /// Open the sealed session key of a claim. The error string is
    /// diagnostic-only; the client sees a generic rejection.
    fn open_claimed_key(
        &self,
        register: &Register,
    ) -> Result<tether_crypto::SessionKey, &'static str> {
        let ephemeral_public: [u8; 32] =
            register.ephemeral_public.as_slice().try_into().map_err(|_| "bad ephemeral key")?;
        let nonce: [u8; SEAL_NONCE_SIZE] =
            register.nonce.as_slice().try_into().map_err(|_| "bad nonce")?;

        let sealed =
            SealedKey { ephemeral_public, nonce, ciphertext: register.sealed_key.clone() };
        open_session_key(&self.keypair, &sealed).map_err(|_| "seal did not open")
    }

    /// Accept, acknowledge, and re-broadcast an application message.
    ///
    /// The message is decrypted under the sender's session key and
    /// re-encrypted under each recipient's own key; generations are
    /// never shared across connections.
    fn handle_app_message(
        &mut self,
        connection_id: u64,
        message: &AppMessage,
    ) -> Result<Vec<ServerAction>, ServerError> {
        let Some(binding) = self.registry.binding_for(connection_id) else {
            tracing::warn!(connection_id, "application message before registration");
            let reply = Payload::Error(ErrorPayload::not_registered()).into_frame()?;
            return Ok(vec![
                ServerAction::Send { connection_id, frame: reply },
                ServerAction::Close {
                    connection_id,
                    reason: "application message before registration".to_string(),
                },
            ]);
        };

        let plaintext = match decrypt_payload(
            &binding.session_key,
            &message.nonce,
            &message.ciphertext,
        ) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                tracing::warn!(connection_id, error = %e, "dropping undecryptable message");
                let reply = Payload::Error(ErrorPayload::frame_rejected(
                    "message did not decrypt under this session",
                ))
                .into_frame()?;
                return Ok(vec![ServerAction::Send { connection_id, frame: reply }]);
            },
        };

        let sender = binding.username.clone();
        let mut actions = Vec::new();

        // Ack first: receipt of the ack is what releases the message
        // from the sender's pending queue.
        let ack =
            Payload::MessageAck(MessageAck { message_id: message.message_id }).into_frame()?;
        actions.push(ServerAction::Send { connection_id, frame: ack });

        for recipient in self.registry.bindings() {
            if recipient.connection_id == connection_id {
                continue;
            }

            let encrypted = match encrypt_payload(&recipient.session_key, &plaintext) {
                Ok(encrypted) => encrypted,
                Err(e) => {
                    tracing::error!(
                        recipient = recipient.connection_id,
                        error = %e,
                        "skipping recipient: re-encryption failed"
                    );
                    continue;
                },
            };

            let frame = Payload::AppMessage(AppMessage {
                message_id: message.message_id,
                sender: Some(sender.clone()),
                nonce: encrypted.nonce.to_vec(),
                ciphertext: encrypted.ciphertext,
            })
            .into_frame()?;

            actions.push(ServerAction::Send { connection_id: recipient.connection_id, frame });
        }

        Ok(actions)
    }

    fn handle_connection_closed(
        &mut self,
        connection_id: u64,
        reason: &str,
    ) -> Result<Vec<ServerAction>, ServerError> {
        self.connections.remove(&connection_id);
        self.unbind(connection_id);
        tracing::debug!(connection_id, reason, "connection closed");

        Ok(Vec::new())
    }

    /// Drive heartbeat probes and expiry.
    ///
    /// An expired connection loses its binding immediately: the
    /// worst-case lifetime of a stale binding is the liveness timeout.
    fn handle_tick(&mut self) -> Result<Vec<ServerAction>, ServerError> {
        let now = self.env.now();
        let mut actions = Vec::new();

        for liveness_action in self.liveness.tick(now) {
            match liveness_action {
                LivenessAction::Ping { connection_id } => {
                    actions.push(ServerAction::Send {
                        connection_id,
                        frame: Payload::Ping.into_frame()?,
                    });
                },
                LivenessAction::Expire { connection_id, silent_for } => {
                    tracing::info!(connection_id, ?silent_for, "evicting unresponsive connection");
                    if let Some(binding) = self.registry.release(connection_id) {
                        tracing::debug!(username = %binding.username, "stale binding dropped");
                    }
                    actions.push(ServerAction::Close {
                        connection_id,
                        reason: "heartbeat timeout".to_string(),
                    });
                },
            }
        }

        Ok(actions)
    }

    /// Drop a connection's binding and probe record, if any.
    fn unbind(&mut self, connection_id: u64) {
        self.liveness.forget(connection_id);
        if let Some(binding) = self.registry.release(connection_id) {
            tracing::debug!(
                connection_id,
                username = %binding.username,
                "identity binding released"
            );
        }
    }
}

impl<E: Environment> std::fmt::Debug for ServerDriver<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver")
            .field("connection_count", &self.connections.len())
            .field("session_count", &self.registry.session_count())
            .finish()
    }
}
