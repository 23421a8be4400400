//! Decode errors for the wire format.

use thiserror::Error;

/// Result alias for wire-format operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while decoding frames or protocol preambles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Input ended before a complete header or payload.
    #[error("frame truncated: expected at least {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes required
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// The frame-type tag is not one of the defined frame types.
    #[error("unknown frame type {0}")]
    UnknownFrameType(i32),

    /// The transport size prefix is negative or smaller than a frame header.
    #[error("invalid frame size {0}")]
    InvalidSize(i32),

    /// The transport size prefix exceeds the configured limit.
    #[error("frame size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Declared size
        size: usize,
        /// Configured limit
        max: usize,
    },

    /// The 4-byte connection preamble does not name a known protocol.
    #[error("unknown protocol magic {0:?}")]
    UnknownProtocol([u8; 4]),
}
