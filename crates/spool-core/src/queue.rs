//! Queue engine collaborator interface.
//!
//! The connection never owns topics or channels. It resolves them through a
//! [`QueueEngine`], consumes messages from a [`Channel`], and forwards FIN/REQ
//! acknowledgements back to it. Storage, retry bookkeeping and timeouts belong
//! to the engine.

use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Width of a message identifier in bytes.
pub const MESSAGE_ID_LEN: usize = 16;

/// Opaque fixed-width message identifier.
///
/// Sent raw at the start of every Message frame. Clients echo it back to
/// FIN/REQ in its text form: 32 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId([u8; MESSAGE_ID_LEN]);

impl MessageId {
    /// Wrap raw identifier bytes.
    pub const fn new(bytes: [u8; MESSAGE_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a random identifier.
    pub fn generate() -> Result<Self, QueueError> {
        let mut bytes = [0u8; MESSAGE_ID_LEN];
        getrandom::fill(&mut bytes).map_err(|e| QueueError::IdGeneration(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Raw identifier bytes, as written on the wire.
    pub fn as_bytes(&self) -> &[u8; MESSAGE_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({self})")
    }
}

impl FromStr for MessageId {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; MESSAGE_ID_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| QueueError::InvalidId(s.to_string()))?;
        Ok(Self(bytes))
    }
}

/// A message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: MessageId,
    body: Bytes,
}

impl Message {
    /// Create a message.
    pub fn new(id: MessageId, body: impl Into<Bytes>) -> Self {
        Self { id, body: body.into() }
    }

    /// Identifier of this message.
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Message body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Errors reported by the queue engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Identifier text is not a valid message id
    #[error("invalid message id {0:?}")]
    InvalidId(String),

    /// No in-flight message has this identifier
    #[error("message {0} is not in flight")]
    NotInFlight(MessageId),

    /// The engine could not produce a message identifier
    #[error("message id generation failed: {0}")]
    IdGeneration(String),
}

/// Resolves topics by name.
pub trait QueueEngine: Send + Sync + 'static {
    /// Resolve a topic, creating it if needed.
    fn topic(&self, name: &str) -> Arc<dyn Topic>;
}

/// A named stream of published messages.
pub trait Topic: Send + Sync {
    /// Topic name.
    fn name(&self) -> &str;

    /// Resolve a channel of this topic, creating it if needed.
    fn channel(&self, name: &str) -> Arc<dyn Channel>;
}

/// An independently consumed view of a topic.
///
/// Safe for concurrent use: the delivery loop consumes while the connection
/// loop acknowledges.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name.
    fn name(&self) -> &str;

    /// Wait for the next message.
    ///
    /// Must be cancel-safe: a message is handed out only when the returned
    /// future completes, so dropping it loses nothing. Returns `None` once
    /// the channel is closed.
    async fn recv(&self) -> Option<Message>;

    /// Acknowledge successful processing of an in-flight message.
    fn finish(&self, id: &str) -> Result<(), QueueError>;

    /// Return an in-flight message to the channel for redelivery.
    fn requeue(&self, id: &str) -> Result<(), QueueError>;
}
