//! Tether server binary.
//!
//! # Usage
//!
//! ```bash
//! # Start with an ephemeral keypair (development)
//! tether-server --bind 0.0.0.0:7600
//!
//! # Start with a persistent key seed (production)
//! tether-server --bind 0.0.0.0:7600 --key-file server.key
//! ```
//!
//! The key file holds the base64-encoded 32-byte X25519 seed. With a
//! persistent seed, reconnecting clients can handshake on their cached
//! copy of the public key across server restarts.

use clap::Parser;
use tether_crypto::ServerKeyPair;
use tether_server::{LivenessConfig, Server, ServerConfig, ServerRuntimeConfig};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Tether session-layer server
#[derive(Parser, Debug)]
#[command(name = "tether-server")]
#[command(about = "Resilient session-layer chat server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:7600")]
    bind: String,

    /// Seconds between heartbeat probes to each connection
    #[arg(long, default_value = "5")]
    heartbeat_interval: u64,

    /// Seconds of silence before a connection is declared dead
    #[arg(long, default_value = "10")]
    heartbeat_timeout: u64,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Path to the key seed file (base64-encoded 32-byte X25519 seed)
    #[arg(short, long)]
    key_file: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("tether server starting");

    let keypair = match &args.key_file {
        Some(path) => {
            let seed = std::fs::read_to_string(path)
                .map_err(|e| format!("failed to read key file '{path}': {e}"))?;
            ServerKeyPair::from_base64_seed(&seed)?
        },
        None => {
            tracing::warn!("No key file provided - generating an ephemeral keypair");
            tracing::warn!("Clients cannot reuse cached keys across a restart of this server");
            ServerKeyPair::generate()
        },
    };

    tracing::info!(public_key = %keypair.public_key().to_base64(), "serving public key");

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        driver: ServerConfig {
            liveness: LivenessConfig {
                interval: std::time::Duration::from_secs(args.heartbeat_interval),
                timeout: std::time::Duration::from_secs(args.heartbeat_timeout),
            },
            max_connections: args.max_connections,
        },
    };

    let server = Server::bind(config, keypair).await?;

    tracing::info!("server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
