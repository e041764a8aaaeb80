//! Liveness monitoring of registered connections.
//!
//! The monitor keeps a probe record per registered connection and, on
//! each tick, decides which connections get a heartbeat ping and which
//! are declared dead. A connection is dead once it has gone `timeout`
//! without a pong (measured from its last pong, or from when tracking
//! started). Declaring a connection dead removes it from the monitor;
//! the driver translates that into registry eviction and a close,
//! bounding the lifetime of a stale binding to the timeout.
//!
//! Pure state machine: time comes in as a parameter, effects go out as
//! [`LivenessAction`]s.

use std::{collections::HashMap, ops::Sub, time::Duration};

/// Default interval between heartbeat probes.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Default silence window after which a connection is declared dead.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);

/// Heartbeat configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessConfig {
    /// Interval between probes to each connection.
    pub interval: Duration,
    /// Silence window before a connection is declared dead. Should be
    /// comfortably larger than `interval`.
    pub timeout: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self { interval: DEFAULT_HEARTBEAT_INTERVAL, timeout: DEFAULT_HEARTBEAT_TIMEOUT }
    }
}

/// Effects requested by a liveness tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LivenessAction {
    /// Send a heartbeat probe to this connection.
    Ping {
        /// Target connection.
        connection_id: u64,
    },
    /// The connection exceeded the silence window: evict its binding
    /// and close it. It is already forgotten by the monitor.
    Expire {
        /// Dead connection.
        connection_id: u64,
        /// How long it had been silent.
        silent_for: Duration,
    },
}

struct Probe<I> {
    last_pong: I,
    last_ping: Option<I>,
}

/// Heartbeat probe table for registered connections.
pub struct LivenessMonitor<I> {
    config: LivenessConfig,
    probes: HashMap<u64, Probe<I>>,
}

impl<I> LivenessMonitor<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create a monitor with the given configuration.
    #[must_use]
    pub fn new(config: LivenessConfig) -> Self {
        Self { config, probes: HashMap::new() }
    }

    /// Start probing a connection. Registration counts as liveness.
    pub fn track(&mut self, connection_id: u64, now: I) {
        self.probes.insert(connection_id, Probe { last_pong: now, last_ping: None });
    }

    /// Stop probing a connection (closed or evicted elsewhere).
    pub fn forget(&mut self, connection_id: u64) {
        self.probes.remove(&connection_id);
    }

    /// Record a heartbeat response.
    pub fn observe_pong(&mut self, connection_id: u64, now: I) {
        if let Some(probe) = self.probes.get_mut(&connection_id) {
            probe.last_pong = now;
        }
    }

    /// Whether a connection is currently probed.
    #[must_use]
    pub fn is_tracked(&self, connection_id: u64) -> bool {
        self.probes.contains_key(&connection_id)
    }

    /// Number of probed connections.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.probes.len()
    }

    /// Run one maintenance pass.
    ///
    /// Expirations are decided before pings so a dead connection never
    /// receives a probe in the tick that kills it. Actions are sorted
    /// by connection id for deterministic processing.
    pub fn tick(&mut self, now: I) -> Vec<LivenessAction> {
        let mut actions = Vec::new();

        let mut expired: Vec<u64> = self
            .probes
            .iter()
            .filter(|(_, probe)| now - probe.last_pong >= self.config.timeout)
            .map(|(id, _)| *id)
            .collect();
        expired.sort_unstable();

        for connection_id in expired {
            if let Some(probe) = self.probes.remove(&connection_id) {
                actions.push(LivenessAction::Expire {
                    connection_id,
                    silent_for: now - probe.last_pong,
                });
            }
        }

        let mut due: Vec<u64> = self
            .probes
            .iter()
            .filter(|(_, probe)| {
                probe.last_ping.map_or(true, |last| now - last >= self.config.interval)
            })
            .map(|(id, _)| *id)
            .collect();
        due.sort_unstable();

        for connection_id in due {
            if let Some(probe) = self.probes.get_mut(&connection_id) {
                probe.last_ping = Some(now);
                actions.push(LivenessAction::Ping { connection_id });
            }
        }

        actions
    }
}
