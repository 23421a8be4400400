//! Frame I/O over the connection stream.
//!
//! Both the connection loop and the delivery loop write to the same stream.
//! [`FrameSink`] is the single write owner: every frame is encoded up front
//! and written with one `write_all` under an async mutex, so frames from the
//! two loops never interleave mid-frame.

use std::{io, sync::Arc};

use bytes::BytesMut;
use spool_proto::{
    Frame,
    transport::{SIZE_PREFIX_LEN, decode_size, encode_sized},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Shared, serialised writer of size-prefixed frames.
#[derive(Clone)]
pub struct FrameSink {
    writer: Arc<Mutex<BoxedWriter>>,
}

impl FrameSink {
    /// Take ownership of the write half of a connection.
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self { writer: Arc::new(Mutex::new(Box::new(writer))) }
    }

    /// Write one frame and flush it.
    pub async fn send(&self, frame: &Frame) -> io::Result<()> {
        let mut buf = BytesMut::with_capacity(SIZE_PREFIX_LEN + frame.encoded_len());
        encode_sized(frame, &mut buf);

        let mut writer = self.writer.lock().await;
        writer.write_all(&buf).await?;
        writer.flush().await
    }
}

impl std::fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSink").finish_non_exhaustive()
    }
}

/// Read one size-prefixed frame, as a consumer does.
///
/// Frames larger than `max_size` bytes (header included) are rejected with
/// `InvalidData`, as are undefined frame types.
pub async fn read_frame<R>(reader: &mut R, max_size: usize) -> io::Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; SIZE_PREFIX_LEN];
    reader.read_exact(&mut prefix).await?;
    let size = decode_size(prefix, max_size).map_err(invalid_data)?;

    let mut body = vec![0u8; size];
    reader.read_exact(&mut body).await?;
    Frame::decode(&body).map_err(invalid_data)
}

fn invalid_data(error: spool_proto::ProtocolError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, error)
}
