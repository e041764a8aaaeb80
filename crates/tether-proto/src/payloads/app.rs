//! Application message payloads.

use serde::{Deserialize, Serialize};

/// Encrypted application message.
///
/// `message_id` is the sender-assigned idempotency key: the session
/// layer delivers at-least-once, so a message may arrive more than once
/// after a reconnection and consumers deduplicate on this identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMessage {
    /// Sender-assigned idempotency key.
    pub message_id: u64,
    /// Originating username. `None` on the client-to-server leg (the
    /// server knows the binding); set on server-to-client delivery.
    pub sender: Option<String>,
    /// AEAD nonce (24 bytes).
    pub nonce: Vec<u8>,
    /// Payload ciphertext under the session key of this leg.
    pub ciphertext: Vec<u8>,
}

/// Server acknowledgment of an accepted application message.
///
/// Receipt of the ack is what finally removes the message from the
/// sender's pending queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAck {
    /// Idempotency key of the acknowledged message.
    pub message_id: u64,
}
