//! Error taxonomy for client connections.
//!
//! Two families with different consequences:
//! - [`ClientError`]: protocol errors. Reported to the client as an Error
//!   frame; the connection stays open.
//! - [`ConnectionError`]: transport errors. Fatal; the connection loop stops
//!   and tears down the delivery loop.

use std::{io, num::ParseIntError};

use thiserror::Error;

use crate::queue::QueueError;

/// Protocol-level failure of a single command.
///
/// The fixed sentinels display as their wire code. Parse and queue errors keep
/// their own message so the client sees the underlying cause.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Bad state, unknown command or malformed arguments
    #[error("E_INVALID")]
    Invalid,

    /// Empty topic name on SUB
    #[error("E_BAD_TOPIC")]
    BadTopic,

    /// Empty channel name on SUB
    #[error("E_BAD_CHANNEL")]
    BadChannel,

    /// Message payload failed validation
    #[error("E_BAD_MESSAGE")]
    BadMessage,

    /// A numeric argument did not parse
    #[error(transparent)]
    Parse(#[from] ParseIntError),

    /// The queue engine rejected a finish or requeue
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl ClientError {
    /// Payload of the Error frame reporting this error.
    pub fn code(&self) -> String {
        self.to_string()
    }
}

/// Failure that terminates a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Reading a request or writing a frame failed
    #[error("connection I/O failed: {0}")]
    Io(#[from] io::Error),

    /// A request line exceeded the configured limit
    #[error("request line exceeds {max} bytes")]
    LineTooLong {
        /// Configured limit
        max: usize,
    },

    /// The delivery loop failed to write a message frame
    #[error("message delivery failed: {0}")]
    DeliveryWrite(#[source] io::Error),
}
