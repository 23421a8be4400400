//! Server error types.

use std::{io, net::SocketAddr};

use thiserror::Error;

/// Failure that stops the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: SocketAddr,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The log filter was invalid or a subscriber was already installed
    #[error("telemetry setup failed: {0}")]
    Telemetry(String),
}
