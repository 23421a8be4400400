//! Outer stream framing.
//!
//! Frames carry no length, so the connection writes each one behind a 4-byte
//! big-endian size prefix counting the frame header and payload:
//!
//! ```text
//! [size: i32 BE][frame type: i32 BE][payload]
//! ```

use bytes::BufMut;

use crate::{
    errors::{ProtocolError, Result},
    frame::{self, Frame, FrameHeader},
};

/// Length of the size prefix in bytes.
pub const SIZE_PREFIX_LEN: usize = 4;

/// Frame `unit` and append it to `dst` behind its size prefix.
pub fn encode_sized(unit: &Frame, dst: &mut impl BufMut) {
    let framed = frame::frame(unit.frame_type, &unit.payload);
    dst.put_i32(framed.len() as i32);
    dst.put_slice(&framed);
}

/// Validate a size prefix read from the stream.
///
/// Returns the number of frame bytes that follow the prefix.
pub fn decode_size(prefix: [u8; SIZE_PREFIX_LEN], max: usize) -> Result<usize> {
    let size = i32::from_be_bytes(prefix);
    if size < FrameHeader::SIZE as i32 {
        return Err(ProtocolError::InvalidSize(size));
    }

    let size = size as usize;
    if size > max {
        return Err(ProtocolError::FrameTooLarge { size, max });
    }

    Ok(size)
}
