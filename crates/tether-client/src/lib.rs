//! Resilient session client for tether.
//!
//! The entry point is [`ConnectionSupervisor`]: it owns the physical
//! connection lifecycle, drives the reconnect loop with exponential
//! backoff, performs the key-exchange handshake after every transport
//! (re)establishment, and flushes messages composed while offline,
//! emitting typed [`SessionEvent`]s for whatever sits above it.
//!
//! ```no_run
//! use tether_client::{ClientConfig, ConnectionSupervisor, TcpDialer, TokioEnv};
//! # async fn demo() -> Result<(), tether_client::ClientError> {
//! let config = ClientConfig::new("127.0.0.1:7600", "alice");
//! let dialer = TcpDialer::new(config.server_addr.clone());
//! let (supervisor, mut events) = ConnectionSupervisor::new(TokioEnv::new(), dialer, config);
//!
//! supervisor.start().await?;
//! supervisor.send(b"hello".to_vec());
//! while let Some(event) = events.recv().await {
//!     tracing::info!(?event, "session event");
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod env;
mod error;
mod event;
mod handshake;
mod supervisor;
mod transport;

pub use config::ClientConfig;
pub use env::TokioEnv;
pub use error::ClientError;
pub use event::{SessionEvent, SupervisorState};
pub use handshake::HandshakeCoordinator;
pub use supervisor::ConnectionSupervisor;
pub use transport::{Dialer, SessionLink, TcpDialer, TcpLink};

// The session-layer vocabulary callers need alongside the supervisor.
pub use tether_core::{BackoffPolicy, Environment, SessionFailure};
