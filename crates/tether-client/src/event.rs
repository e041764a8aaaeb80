//! Typed lifecycle and application events.
//!
//! The supervisor never calls back into presentation code; it emits
//! these events through a channel handed out at construction time, and
//! whatever renders them is someone else's concern.

use tether_core::SessionFailure;

/// Events emitted by a [`crate::ConnectionSupervisor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The live session was lost to a transport failure; the reconnect
    /// loop is starting.
    Disconnected,

    /// A numbered reconnection attempt is about to run (after its
    /// backoff delay).
    Reconnecting {
        /// 1-indexed attempt number within this disconnection episode.
        attempt: u32,
    },

    /// A session is established: transport open, handshake complete,
    /// pending messages flushed.
    Reconnected,

    /// The supervisor stopped trying. Terminal until `start()`.
    GaveUp {
        /// Why: attempts exhausted, or a terminal rejection.
        failure: SessionFailure,
    },

    /// An application message arrived and decrypted cleanly.
    MessageReceived {
        /// Sender-assigned idempotency key; duplicates are possible
        /// after reconnections and should be deduplicated on this.
        message_id: u64,
        /// Originating username.
        sender: String,
        /// Decrypted payload bytes.
        payload: Vec<u8>,
    },

    /// The server revoked this session's identity binding (typically a
    /// newer registration claimed the same username).
    Evicted {
        /// Server-supplied reason.
        reason: String,
    },
}

/// Supervisor lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Not running: never started, stopped, or start not yet effective.
    Disconnected,
    /// First connection cycle: dialing the server.
    Connecting,
    /// First connection cycle: transport open, handshake in flight.
    Handshaking,
    /// Live session established.
    Connected,
    /// Lost the session; working through the backoff schedule.
    Reconnecting {
        /// Attempt currently scheduled or in flight.
        attempt: u32,
    },
    /// Attempts exhausted or claim rejected. Terminal until `start()`.
    GivingUp,
}
