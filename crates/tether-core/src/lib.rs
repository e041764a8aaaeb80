//! Pure session-layer logic for tether.
//!
//! Everything in this crate is I/O-free and deterministic given its
//! inputs: retry scheduling ([`backoff`]), the outbound message buffer
//! ([`queue`]), the failure taxonomy ([`error`]), and the [`env`]
//! abstraction that lets the async layers above inject time and
//! randomness: real in production, scripted in tests.

pub mod backoff;
pub mod env;
pub mod error;
pub mod queue;

pub use backoff::{Backoff, BackoffPolicy};
pub use env::Environment;
pub use error::SessionFailure;
pub use queue::{DeliveryState, PendingMessage, PendingQueue};
