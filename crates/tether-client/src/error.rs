//! Client-side error types.

use thiserror::Error;

/// Errors surfaced by the supervisor API itself.
///
/// Session-level failures (transport, key fetch, handshake) are not
/// errors of the API; they feed the reconnect loop and surface as
/// [`tether_core::SessionFailure`] through events and
/// [`crate::ConnectionSupervisor::last_failure`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientError {
    /// `start()` was called while the supervisor task is still running.
    /// Exactly one reconnect loop may exist per supervisor.
    #[error("the supervisor is already running")]
    AlreadyRunning,
}
