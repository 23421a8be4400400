//! Command dispatch.
//!
//! Commands are looked up by name in a table of handlers sharing one
//! signature. Names match case-insensitively. Adding a command means
//! registering one more handler; the connection loop never changes.

use std::collections::HashMap;

use bytes::Bytes;
use tracing::debug;

use crate::{client::Client, commands, error::ClientError};

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Outcome of a command.
///
/// - `Ok(Some(bytes))`: send a Response frame carrying `bytes`
/// - `Ok(None)`: silent success, send nothing
/// - `Err(error)`: send an Error frame carrying the error code
pub type CommandResult = Result<Option<Bytes>, ClientError>;

/// Uniform command handler signature. `params[0]` is the command name.
pub type Handler = fn(&mut Client, &[&str]) -> CommandResult;

/// Name-to-handler table.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    handlers: HashMap<String, Handler>,
}

impl Dispatcher {
    /// Dispatcher with no commands registered.
    pub fn empty() -> Self {
        Self { handlers: HashMap::new() }
    }

    /// Dispatcher with the V2 command set: SUB, RDY, FIN, REQ.
    pub fn v2() -> Self {
        Self::empty()
            .with_command("SUB", commands::sub)
            .with_command("RDY", commands::rdy)
            .with_command("FIN", commands::fin)
            .with_command("REQ", commands::req)
    }

    /// Register `handler` under `name`, replacing any previous handler.
    #[must_use]
    pub fn with_command(mut self, name: &str, handler: Handler) -> Self {
        self.handlers.insert(name.to_ascii_uppercase(), handler);
        self
    }

    /// Run the handler named by `params[0]`.
    ///
    /// Unknown or missing command names fail with [`ClientError::Invalid`].
    pub fn execute(&self, client: &mut Client, params: &[&str]) -> CommandResult {
        let name = params.first().map(|name| name.to_ascii_uppercase()).unwrap_or_default();
        let Some(handler) = self.handlers.get(&name) else {
            debug!(target: DISPATCH_TARGET, peer = client.peer(), command = %name, "unknown command");
            return Err(ClientError::Invalid);
        };

        handler(client, params)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::v2()
    }
}
