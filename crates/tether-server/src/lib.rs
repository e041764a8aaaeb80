//! Tether production server.
//!
//! The session-layer logic lives in the sans-IO [`ServerDriver`]: events
//! in, actions out, no sockets. This crate's [`Server`] is the
//! production glue: it accepts TCP connections, pumps received frames
//! through the driver behind one mutex, and executes the resulting
//! actions (sends over per-connection writer channels, closes via
//! per-connection signals). A periodic tick drives heartbeat probing
//! and stale-binding expiry.
//!
//! ```no_run
//! use tether_server::{Server, ServerRuntimeConfig};
//! use tether_crypto::ServerKeyPair;
//! # async fn demo() -> Result<(), tether_server::ServerError> {
//! let server = Server::bind(ServerRuntimeConfig::default(), ServerKeyPair::generate()).await?;
//! server.run().await
//! # }
//! ```

mod driver;
mod error;
mod liveness;
mod registry;
mod system_env;
mod transport;

use std::{collections::HashMap, sync::Arc, time::Duration};

pub use driver::{ServerAction, ServerConfig, ServerDriver, ServerEvent};
pub use error::ServerError;
pub use liveness::{LivenessAction, LivenessConfig, LivenessMonitor};
pub use registry::{
    normalize_username, validate_username, ClaimOutcome, SessionBinding, SessionRegistry,
    MAX_USERNAME_LEN,
};
pub use system_env::SystemEnv;
pub use transport::{FrameReader, FrameWriter, TcpTransport};

use tether_core::Environment;
use tether_proto::Frame;
use tokio::{
    net::TcpStream,
    sync::{mpsc, Notify, RwLock},
};

/// Configuration of the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (`host:port`).
    pub bind_address: String,
    /// Driver configuration (heartbeat, connection limit).
    pub driver: ServerConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0:7600".to_string(), driver: ServerConfig::default() }
    }
}

/// Per-connection runtime handle.
///
/// `frames` feeds the connection's writer task; dropping the sender (on
/// close) lets the writer drain queued frames and shut the socket down.
/// `closed` wakes the reader loop so a server-initiated close does not
/// wait for the peer.
struct ConnectionHandle {
    frames: mpsc::UnboundedSender<Frame>,
    closed: Arc<Notify>,
}

/// Writer channels and close signals for all open connections.
struct SharedState {
    connections: RwLock<HashMap<u64, ConnectionHandle>>,
}

/// Production tether server.
pub struct Server {
    driver: ServerDriver<SystemEnv>,
    transport: TcpTransport,
    env: SystemEnv,
    tick_period: Duration,
}

impl Server {
    /// Create a driver around `keypair` and bind the transport.
    pub async fn bind(
        config: ServerRuntimeConfig,
        keypair: tether_crypto::ServerKeyPair,
    ) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let driver = ServerDriver::new(env, keypair, config.driver);
        let transport = TcpTransport::bind(&config.bind_address).await?;

        // Tick at half the probe interval so probes and expirations land
        // within one interval of their due time.
        let tick_period =
            (config.driver.liveness.interval / 2).max(Duration::from_millis(50));

        Ok(Self { driver, transport, env, tick_period })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Accept connections and process frames until the process exits.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!(address = %self.transport.local_addr()?, "server running");

        let env = self.env;
        let driver = Arc::new(tokio::sync::Mutex::new(self.driver));
        let shared = Arc::new(SharedState { connections: RwLock::new(HashMap::new()) });

        {
            let driver = Arc::clone(&driver);
            let shared = Arc::clone(&shared);
            let period = self.tick_period;

            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                loop {
                    ticker.tick().await;

                    let actions = {
                        let mut driver = driver.lock().await;
                        match driver.process_event(ServerEvent::Tick) {
                            Ok(actions) => actions,
                            Err(e) => {
                                tracing::error!(error = %e, "tick processing failed");
                                continue;
                            },
                        }
                    };
                    execute_actions(actions, &shared).await;
                }
            });
        }

        loop {
            match self.transport.accept().await {
                Ok((stream, addr)) => {
                    let driver = Arc::clone(&driver);
                    let shared = Arc::clone(&shared);

                    tokio::spawn(async move {
                        handle_connection(stream, driver, shared, env).await;
                    });
                    tracing::debug!(%addr, "accepted connection");
                },
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                },
            }
        }
    }
}

/// Own one connection: reader loop here, writer task alongside.
async fn handle_connection(
    stream: TcpStream,
    driver: Arc<tokio::sync::Mutex<ServerDriver<SystemEnv>>>,
    shared: Arc<SharedState>,
    env: SystemEnv,
) {
    let connection_id = env.random_u64();
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);

    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(Notify::new());

    shared
        .connections
        .write()
        .await
        .insert(connection_id, ConnectionHandle { frames: frames_tx, closed: Arc::clone(&closed) });

    tokio::spawn(write_frames(connection_id, FrameWriter::new(write_half), frames_rx));

    if let Err(e) =
        process(&driver, &shared, ServerEvent::ConnectionAccepted { connection_id }).await
    {
        tracing::error!(connection_id, error = %e, "accept processing failed");
    }

    let close_reason = loop {
        // read_frame buffers partial frames internally, so dropping it
        // when the close signal fires loses nothing.
        tokio::select! {
            () = closed.notified() => break "closed by server".to_string(),
            result = reader.read_frame() => match result {
                Ok(frame) => {
                    let event = ServerEvent::FrameReceived { connection_id, frame };
                    if let Err(e) = process(&driver, &shared, event).await {
                        tracing::warn!(connection_id, error = %e, "frame processing failed");
                        break "frame processing failed".to_string();
                    }
                },
                Err(e) => {
                    tracing::debug!(connection_id, error = %e, "transport read ended");
                    break e.to_string();
                },
            },
        }
    };

    shared.connections.write().await.remove(&connection_id);

    let event = ServerEvent::ConnectionClosed { connection_id, reason: close_reason };
    if let Err(e) = process(&driver, &shared, event).await {
        tracing::error!(connection_id, error = %e, "close processing failed");
    }
}

/// Drain the writer channel onto the socket, then shut the write
/// direction down. Ends when every sender is gone (connection closed).
async fn write_frames(
    connection_id: u64,
    mut writer: FrameWriter,
    mut frames: mpsc::UnboundedReceiver<Frame>,
) {
    while let Some(frame) = frames.recv().await {
        if let Err(e) = writer.write_frame(&frame).await {
            tracing::debug!(connection_id, error = %e, "write failed");
            break;
        }
    }

    let _ = writer.shutdown().await;
}

/// Run one event through the driver and execute the resulting actions.
///
/// The driver lock is released before any action is executed; actions
/// only touch in-memory channels, so nothing here holds a lock across a
/// network wait.
async fn process(
    driver: &Arc<tokio::sync::Mutex<ServerDriver<SystemEnv>>>,
    shared: &Arc<SharedState>,
    event: ServerEvent,
) -> Result<(), ServerError> {
    let actions = {
        let mut driver = driver.lock().await;
        driver.process_event(event)?
    };

    execute_actions(actions, shared).await;
    Ok(())
}

/// Execute driver actions against the live connection handles.
async fn execute_actions(actions: Vec<ServerAction>, shared: &SharedState) {
    for action in actions {
        match action {
            ServerAction::Send { connection_id, frame } => {
                let connections = shared.connections.read().await;
                match connections.get(&connection_id) {
                    // A send can race a close; the frame is simply lost
                    // with the connection.
                    Some(handle) => {
                        let _ = handle.frames.send(frame);
                    },
                    None => {
                        tracing::debug!(connection_id, "dropping frame for closed connection");
                    },
                }
            },

            ServerAction::Close { connection_id, reason } => {
                tracing::debug!(connection_id, %reason, "closing connection");
                // Removing the handle drops the writer sender: the
                // writer drains already-queued frames (the goodbye that
                // precedes an eviction close) and shuts the socket down.
                if let Some(handle) = shared.connections.write().await.remove(&connection_id) {
                    handle.closed.notify_one();
                }
            },
        }
    }
}
