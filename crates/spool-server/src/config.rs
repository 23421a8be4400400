//! Server configuration.

use std::net::{Ipv4Addr, SocketAddr};

use spool_core::ConnectionConfig;

/// Default listen address, the conventional consumer port on loopback.
pub const DEFAULT_LISTEN: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::LOCALHOST), 4150);

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to accept client connections on
    pub listen: SocketAddr,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Limits applied to every client connection
    pub connection: ConnectionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN,
            log_level: "info".to_string(),
            connection: ConnectionConfig::default(),
        }
    }
}
