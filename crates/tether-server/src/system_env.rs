//! Production environment: system time and OS cryptographic RNG.

use std::time::Duration;

use tether_core::Environment;

/// Production [`Environment`] for the server.
///
/// Uses `std::time::Instant` for monotonic time, `tokio::time::sleep`
/// for async waits, and getrandom for cryptographic randomness
/// (connection and session identifiers).
///
/// # Panics
///
/// Panics if the OS RNG fails. A server without functioning
/// cryptographic randomness cannot mint session identifiers safely, so
/// continuing would be worse than stopping.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - the server cannot mint identifiers securely");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_advances() {
        let env = SystemEnv::new();
        let t1 = env.now();
        std::thread::sleep(Duration::from_millis(5));
        assert!(env.now() > t1);
    }

    #[test]
    fn random_bytes_differ() {
        let env = SystemEnv::new();
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        env.random_bytes(&mut a);
        env.random_bytes(&mut b);
        assert_ne!(a, b);
    }
}
