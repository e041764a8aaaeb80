//! Failure taxonomy for the session layer.
//!
//! Callers and presentation layers only ever see these categories plus
//! the generic descriptions below. Raw transport and cryptographic
//! detail stays in diagnostics (tracing) at the point of failure.

use thiserror::Error;

/// Categorized session failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFailure {
    /// Connecting to the server failed (refused, unreachable, DNS,
    /// connect timeout).
    #[error("the server could not be reached")]
    TransportUnavailable,

    /// No usable server public key, fresh or cached.
    #[error("no usable server key is available")]
    KeyFetchFailed,

    /// The server rejected the secure handshake (decrypt failure or
    /// protocol violation).
    #[error("the server rejected the secure handshake")]
    HandshakeRejected,

    /// The registration claim itself was rejected (malformed identity).
    /// Terminal: retrying the same claim cannot succeed.
    #[error("the registration claim was rejected")]
    RegistrationRejected,

    /// All reconnection attempts were exhausted. Terminal until an
    /// explicit restart; pending messages are preserved.
    #[error("gave up after exhausting reconnection attempts")]
    MaxAttemptsExceeded,
}

impl SessionFailure {
    /// Whether retrying automatically can ever help.
    ///
    /// Terminal failures stop the reconnect loop; everything else feeds
    /// the next backoff cycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RegistrationRejected | Self::MaxAttemptsExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failures_feed_the_retry_loop() {
        assert!(!SessionFailure::TransportUnavailable.is_terminal());
        assert!(!SessionFailure::KeyFetchFailed.is_terminal());
        assert!(!SessionFailure::HandshakeRejected.is_terminal());
    }

    #[test]
    fn rejection_and_exhaustion_are_terminal() {
        assert!(SessionFailure::RegistrationRejected.is_terminal());
        assert!(SessionFailure::MaxAttemptsExceeded.is_terminal());
    }

    #[test]
    fn descriptions_carry_no_protocol_detail() {
        // The Display text is what presentation layers show verbatim.
        let text = SessionFailure::HandshakeRejected.to_string();
        assert!(!text.contains("decrypt"));
        assert!(!text.contains("cbor"));
    }
}
