//! TCP front end for the spool consumer protocol.
//!
//! Accepts connections, reads the 4-byte protocol magic each client opens
//! with, and hands V2 connections to [`spool_core::Connection`]. Anything else
//! is logged and closed.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod listener;
pub mod server;
pub mod telemetry;

pub use config::ServerConfig;
pub use error::ServerError;
pub use listener::Listener;
pub use server::Server;
