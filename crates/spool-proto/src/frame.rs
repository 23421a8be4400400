//! Tagged server-to-client frames.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────┐
//! │ frame type (i32, BE) │ payload (raw bytes)      │
//! └──────────────────────┴──────────────────────────┘
//! ```
//!
//! Payloads by frame type:
//! - [`FrameType::Response`]: command result bytes
//! - [`FrameType::Error`]: UTF-8 error code such as `E_INVALID`
//! - [`FrameType::Message`]: 16-byte message id followed by the message body

use bytes::{BufMut, Bytes, BytesMut};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, byteorder::big_endian::I32};

use crate::errors::{ProtocolError, Result};

/// Frame-type tag carried at the start of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum FrameType {
    /// Successful command result
    Response = 0,
    /// Protocol error reported for a command
    Error = 1,
    /// Message pushed by the delivery loop
    Message = 2,
}

impl FrameType {
    /// Wire value of this tag.
    pub fn to_i32(self) -> i32 {
        self as i32
    }

    /// Parse a wire tag, returning `None` for undefined values.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Response),
            1 => Some(Self::Error),
            2 => Some(Self::Message),
            _ => None,
        }
    }
}

impl TryFrom<i32> for FrameType {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self> {
        Self::from_i32(value).ok_or(ProtocolError::UnknownFrameType(value))
    }
}

/// Fixed 4-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct FrameHeader {
    frame_type: I32,
}

impl FrameHeader {
    /// Header size in bytes
    pub const SIZE: usize = 4;

    /// Header for the given frame type.
    pub fn new(frame_type: FrameType) -> Self {
        Self { frame_type: I32::new(frame_type.to_i32()) }
    }

    /// Raw tag value, which may be undefined when parsed from untrusted input.
    pub fn raw_frame_type(&self) -> i32 {
        self.frame_type.get()
    }

    /// Parse a header from the start of `bytes`, returning the remainder.
    pub fn parse(bytes: &[u8]) -> Result<(Self, &[u8])> {
        Self::read_from_prefix(bytes)
            .map_err(|_| ProtocolError::Truncated { expected: Self::SIZE, actual: bytes.len() })
    }
}

/// A single tagged frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Payload semantics
    pub frame_type: FrameType,
    /// Raw payload bytes
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame from a type tag and payload.
    pub fn new(frame_type: FrameType, payload: impl Into<Bytes>) -> Self {
        Self { frame_type, payload: payload.into() }
    }

    /// Response frame carrying a command result.
    pub fn response(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameType::Response, payload)
    }

    /// Error frame carrying a machine-readable error code.
    pub fn error(code: &str) -> Self {
        Self::new(FrameType::Error, Bytes::copy_from_slice(code.as_bytes()))
    }

    /// Message frame: `id ++ body`.
    pub fn message(id: &[u8], body: &[u8]) -> Self {
        let mut payload = BytesMut::with_capacity(id.len() + body.len());
        payload.put_slice(id);
        payload.put_slice(body);
        Self::new(FrameType::Message, payload.freeze())
    }

    /// Size of the encoded frame (header plus payload).
    pub fn encoded_len(&self) -> usize {
        FrameHeader::SIZE + self.payload.len()
    }

    /// Encode into a freshly allocated buffer.
    pub fn to_bytes(&self) -> Bytes {
        frame(self.frame_type, &self.payload)
    }

    /// Decode exactly one frame; every byte after the header is payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (header, payload) = FrameHeader::parse(bytes)?;
        let frame_type = FrameType::try_from(header.raw_frame_type())?;
        Ok(Self::new(frame_type, Bytes::copy_from_slice(payload)))
    }
}

/// Frame `payload` under `frame_type`: the tag, then the payload verbatim.
pub fn frame(frame_type: FrameType, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FrameHeader::SIZE + payload.len());
    buf.put_slice(FrameHeader::new(frame_type).as_bytes());
    buf.put_slice(payload);
    buf.freeze()
}
