//! Accept loop and protocol selection.

use std::{future::Future, net::SocketAddr, sync::Arc};

use spool_core::{Connection, ConnectionConfig, QueueEngine};
use spool_proto::ProtocolVersion;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite},
    net::TcpListener,
    task::JoinSet,
};
use tracing::{debug, info, warn};

use crate::{
    config::ServerConfig,
    error::ServerError,
    listener::{LISTENER_TARGET, Listener},
};

/// Accepts clients and runs one connection loop per client.
pub struct Server<L> {
    listener: L,
    connection: Connection,
}

impl Server<TcpListener> {
    /// Bind a TCP listener on `config.listen`.
    pub async fn bind(config: &ServerConfig, engine: Arc<dyn QueueEngine>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| ServerError::Bind { addr: config.listen, source })?;
        Ok(Self::new(listener, engine, config.connection.clone()))
    }
}

impl<L: Listener> Server<L> {
    /// Serve clients accepted from `listener`.
    pub fn new(listener: L, engine: Arc<dyn QueueEngine>, config: ConnectionConfig) -> Self {
        Self { listener, connection: Connection::new(engine, config) }
    }

    /// Address the server accepts on.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept clients until `shutdown` resolves, then stop every connection.
    ///
    /// Accept failures are logged and retried.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send,
    {
        let mut clients = JoinSet::new();
        tokio::pin!(shutdown);

        match self.listener.local_addr() {
            Ok(addr) => info!(target: LISTENER_TARGET, %addr, "listening"),
            Err(error) => info!(target: LISTENER_TARGET, %error, "listening on unknown address"),
        }

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!(target: LISTENER_TARGET, peer = %addr, "accepted");
                        clients.spawn(handle_client(self.connection.clone(), stream, addr));
                    },
                    Err(error) => warn!(target: LISTENER_TARGET, %error, "accept failed"),
                },
                Some(joined) = clients.join_next(), if !clients.is_empty() => {
                    if let Err(error) = joined {
                        warn!(target: LISTENER_TARGET, %error, "client task failed");
                    }
                },
            }
        }

        info!(target: LISTENER_TARGET, clients = clients.len(), "shutting down");
        // Aborting a client drops its exit sender, which stops its delivery loop.
        clients.shutdown().await;
        Ok(())
    }
}

impl<L> std::fmt::Debug for Server<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").field("connection", &self.connection).finish_non_exhaustive()
    }
}

async fn handle_client<S>(connection: Connection, mut stream: S, addr: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let mut magic = [0u8; 4];
    if let Err(error) = stream.read_exact(&mut magic).await {
        debug!(target: LISTENER_TARGET, peer = %addr, %error, "closed before protocol magic");
        return;
    }

    match ProtocolVersion::from_magic(magic) {
        Ok(ProtocolVersion::V2) => {
            debug!(target: LISTENER_TARGET, peer = %addr, "protocol V2");
            // The connection loop logs its own outcome.
            let _ = connection.serve(stream, addr.to_string()).await;
        },
        Err(error) => warn!(target: LISTENER_TARGET, peer = %addr, %error, "unsupported protocol"),
    }
}
