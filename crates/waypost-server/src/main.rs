//! Waypost server binary.
//!
//! # Usage
//!
//! ```bash
//! # In-memory storage, self-signed certificate (development)
//! waypost-server --bind 0.0.0.0:4433 --seed-client "LC1:Acme Logistics"
//!
//! # Persistent storage and real TLS (production)
//! waypost-server --bind 0.0.0.0:4433 --store /var/lib/waypost/relay.redb \
//!     --cert cert.pem --key key.pem
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use waypost_server::{
    MemoryStorage, RedbStorage, RelayConfig, Server, ServerRuntimeConfig, Storage,
};

/// Waypost location relay server
#[derive(Parser, Debug)]
#[command(name = "waypost-server")]
#[command(about = "Driver location relay server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:4433")]
    bind: String,

    /// Path to TLS certificate (PEM format)
    #[arg(short, long)]
    cert: Option<String>,

    /// Path to TLS private key (PEM format)
    #[arg(short, long)]
    key: Option<String>,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Path to the redb database file; omit for in-memory storage
    #[arg(long)]
    store: Option<PathBuf>,

    /// Seed a logistics client at startup, formatted "id:name"
    #[arg(long)]
    seed_client: Option<String>,

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

    tracing::info!("waypost server starting");
    tracing::info!("binding to {}", args.bind);

    if args.cert.is_none() || args.key.is_none() {
        tracing::warn!("no TLS certificate provided, using a self-signed one");
        tracing::warn!("this is NOT suitable for production use");
    }

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        cert_path: args.cert,
        key_path: args.key,
        relay: RelayConfig { max_connections: args.max_connections },
    };

    match &args.store {
        Some(path) => {
            tracing::info!("using redb storage at {}", path.display());
            let storage = RedbStorage::open(path)?;
            serve(config, storage, args.seed_client.as_deref()).await
        },
        None => {
            tracing::warn!("using in-memory storage, data is lost on restart");
            serve(config, MemoryStorage::new(), args.seed_client.as_deref()).await
        },
    }
}

async fn serve<S: Storage>(
    config: ServerRuntimeConfig,
    storage: S,
    seed_client: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::bind(config, storage)?;

    if let Some(spec) = seed_client {
        let (client_id, name) = spec
            .split_once(':')
            .ok_or("--seed-client must be formatted \"id:name\"")?;
        server.register_logistic_client(client_id, name)?;
    }

    tracing::info!("server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
