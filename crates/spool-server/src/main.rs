//! spool-server binary.

use std::{net::SocketAddr, sync::Arc};

use clap::Parser;
use spool_core::{ConnectionConfig, MemoryQueue, connection::DEFAULT_MAX_LINE_BYTES};
use spool_server::{Server, ServerConfig, ServerError, config::DEFAULT_LISTEN, telemetry};
use tracing::{info, warn};

/// Message broker speaking the spool V2 consumer protocol
#[derive(Parser, Debug)]
#[command(name = "spool-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to accept client connections on
    #[arg(long, default_value_t = DEFAULT_LISTEN)]
    listen: SocketAddr,

    /// Log filter (trace, debug, info, warn, error); `RUST_LOG` overrides it
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Longest accepted request line in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_BYTES)]
    max_line_bytes: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            log_level: args.log_level,
            connection: ConnectionConfig { max_line_bytes: args.max_line_bytes, ..Default::default() },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let config = ServerConfig::from(Args::parse());
    telemetry::init(&config.log_level)?;

    let engine = Arc::new(MemoryQueue::new());
    let server = Server::bind(&config, engine).await?;
    info!(listen = %config.listen, max_line_bytes = config.connection.max_line_bytes, "spool-server starting");

    server
        .run(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(%error, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}
