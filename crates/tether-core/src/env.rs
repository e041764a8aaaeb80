//! Environment abstraction for deterministic testing.
//!
//! Decouples session logic from system resources (time, randomness,
//! sleeping). Production code injects a real implementation backed by
//! the OS clock and RNG; tests inject scripted implementations so retry
//! schedules and liveness windows can be exercised without waiting.

use std::{future::Future, time::Duration};

/// Abstract environment providing time, randomness, and async sleep.
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards within one execution context
/// - `random_bytes()` uses cryptographically secure entropy in production
pub trait Environment: Clone + Send + Sync + 'static {
    /// The instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`; test
    /// environments may use fabricated instants.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleep for the specified duration.
    ///
    /// The only async method in the trait; it is used by driver code,
    /// never by pure logic.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Fill the buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generate a random `u64` (session identifiers, message ids).
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
