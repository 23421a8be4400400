//! Command execution context for one connection.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::{
    codec::FrameSink,
    connection::{CONNECTION_TARGET, ConnectionConfig},
    delivery::DeliveryLoop,
    error::ClientError,
    queue::QueueEngine,
    state::{ClientState, DeliveryHandoff, Phase, Subscription},
};

/// Everything a command handler may touch: the client's state plus the
/// collaborators needed to act on it.
pub struct Client {
    state: ClientState,
    engine: Arc<dyn QueueEngine>,
    sink: FrameSink,
    config: ConnectionConfig,
    peer: Arc<str>,
}

impl Client {
    pub(crate) fn new(
        engine: Arc<dyn QueueEngine>,
        sink: FrameSink,
        handoff: DeliveryHandoff,
        config: ConnectionConfig,
        peer: Arc<str>,
    ) -> Self {
        Self { state: ClientState::new(handoff), engine, sink, config, peer }
    }

    /// Client state.
    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// Current protocol phase.
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Connection limits.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Label identifying the peer in logs.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub(crate) fn sink(&self) -> &FrameSink {
        &self.sink
    }

    /// Resolve the channel, start the delivery loop and enter `Subscribed`.
    pub(crate) fn subscribe(&mut self, topic: &str, channel: &str) -> Result<(), ClientError> {
        let handoff = self.state.take_handoff().ok_or(ClientError::Invalid)?;
        let channel = self.engine.topic(topic).channel(channel);
        let (credit, credit_rx) = watch::channel(0);

        let delivery = DeliveryLoop::new(
            Arc::clone(&channel),
            credit_rx,
            handoff,
            self.sink.clone(),
            Arc::clone(&self.peer),
        );
        let delivery = tokio::spawn(delivery.run());

        info!(
            target: CONNECTION_TARGET,
            peer = %self.peer,
            topic,
            channel = channel.name(),
            "client subscribed"
        );
        self.state.set_subscription(Subscription {
            topic: topic.to_string(),
            channel,
            credit,
            delivery,
        });
        Ok(())
    }

    /// Wait for the delivery loop to finish. Call only after the exit signal.
    pub(crate) async fn join_delivery(&mut self) {
        let Some(subscription) = self.state.subscription_mut() else {
            return;
        };

        if let Err(error) = (&mut subscription.delivery).await {
            warn!(
                target: CONNECTION_TARGET,
                peer = %self.peer,
                topic = %subscription.topic,
                %error,
                "delivery task failed"
            );
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("peer", &self.peer)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
