//! Wire format for the spool consumer protocol.
//!
//! Clients speak a line-oriented request protocol: one ASCII command per line,
//! parameters separated by single spaces. The server answers with tagged
//! frames, each a 4-byte big-endian frame type followed by the raw payload.
//!
//! The frame tag lets a consumer tell command responses, command errors and
//! pushed messages apart on a single stream, since the server writes all three
//! interleaved. Frames carry no length of their own; the connection transport
//! prefixes every frame with its size (see [`transport`]).
//!
//! Nothing in this crate performs I/O. Encoding appends to caller-owned
//! buffers and decoding borrows from them.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod command;
pub mod errors;
pub mod frame;
pub mod transport;
pub mod version;

pub use command::split_params;
pub use errors::{ProtocolError, Result};
pub use frame::{Frame, FrameHeader, FrameType};
pub use version::ProtocolVersion;
