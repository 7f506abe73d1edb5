//! mongoose gateway server
//!
//! REST interface to MongoDB over HTTP.

use clap::Parser;
use mongoose_server::{router, AppState, BackendKind, ServerConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "mongoose")]
#[command(about = "JSON-over-HTTP gateway to MongoDB")]
struct Args {
    /// Address to bind to
    #[arg(short, long, env = "MONGOOSE_BIND", default_value = "127.0.0.1:27080")]
    bind: SocketAddr,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, env = "MONGOOSE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Timeout for establishing a database connection, in milliseconds
    #[arg(long, env = "MONGOOSE_CONNECT_TIMEOUT_MS", default_value = "2000")]
    connect_timeout_ms: u64,

    /// Documents per batch when a request does not say
    #[arg(long, env = "MONGOOSE_BATCH_SIZE", default_value = "15")]
    default_batch_size: usize,

    /// Maximum request body size in bytes
    #[arg(long, env = "MONGOOSE_MAX_BODY_BYTES", default_value = "10485760")]
    max_body_bytes: usize,

    /// Database backend
    #[arg(long, env = "MONGOOSE_BACKEND", value_enum, default_value = "mongodb")]
    backend: BackendKind,

    /// Maximum connections per MongoDB client pool
    #[arg(long, env = "MONGOOSE_MAX_POOL_SIZE")]
    max_pool_size: Option<u32>,

    /// Seconds a pooled connection may sit idle before it is closed
    #[arg(long, env = "MONGOOSE_MAX_IDLE_SECS")]
    max_idle_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))?;
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ServerConfig::new(args.bind)
        .connect_timeout(Duration::from_millis(args.connect_timeout_ms))
        .default_batch_size(args.default_batch_size)
        .max_body_bytes(args.max_body_bytes)
        .backend(args.backend)
        .max_pool_size(args.max_pool_size)
        .max_idle_time(args.max_idle_secs.map(Duration::from_secs));

    if config.backend == BackendKind::Memory {
        warn!("Using in-memory backend - data will not persist across restarts");
    }

    let state = AppState::new(config.connector(), &config).shared();
    let app = router(state, &config);

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!("mongoose listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => {
            warn!("Unable to listen for shutdown signal: {}", err);
            std::future::pending::<()>().await;
        }
    }
}
