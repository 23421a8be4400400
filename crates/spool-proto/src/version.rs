//! Protocol identification.
//!
//! A client opens every connection with a 4-byte magic naming the protocol it
//! intends to speak. The server looks the magic up and hands the rest of the
//! stream to that protocol's connection loop.

use crate::errors::{ProtocolError, Result};

/// Protocols a server can select from the connection preamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// Line commands in, tagged frames out, credit-based delivery.
    V2,
}

impl ProtocolVersion {
    /// Preamble selecting [`ProtocolVersion::V2`]: two spaces then `V2`.
    pub const V2_MAGIC: [u8; 4] = *b"  V2";

    /// Every protocol this crate knows how to identify.
    pub const ALL: &'static [Self] = &[Self::V2];

    /// The preamble identifying this protocol.
    pub fn magic(self) -> [u8; 4] {
        match self {
            Self::V2 => Self::V2_MAGIC,
        }
    }

    /// Resolve a preamble to a protocol.
    pub fn from_magic(magic: [u8; 4]) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|version| version.magic() == magic)
            .ok_or(ProtocolError::UnknownProtocol(magic))
    }
}
