//! Production environment for client code.

use std::time::Duration;

use tether_core::Environment;

/// Production [`Environment`]: real monotonic time, tokio sleep, OS
/// cryptographic RNG.
///
/// # Panics
///
/// Panics if the OS RNG fails: a client without functioning
/// cryptographic randomness cannot generate session keys or message
/// identifiers safely, so continuing would be worse than stopping.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioEnv;

impl TokioEnv {
    /// Create a new production environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for TokioEnv {
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
            .expect("invariant: OS RNG failure is unrecoverable for key material");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_u64_values_differ() {
        let env = TokioEnv::new();
        assert_ne!(env.random_u64(), env.random_u64());
    }

    #[tokio::test]
    async fn sleep_waits_at_least_the_duration() {
        let env = TokioEnv::new();
        let start = env.now();
        env.sleep(Duration::from_millis(20)).await;
        assert!(env.now() - start >= Duration::from_millis(20));
    }
}
