//! Connection loop: one task per client, reading newline-terminated commands
//! and writing their results as frames.
//!
//! Protocol errors are reported as Error frames and the loop continues.
//! Transport errors end the loop. Whatever the reason for stopping, the loop
//! fires the exit signal and waits for the delivery loop (if one was started)
//! before returning, so no delivery task outlives its connection.

use std::sync::Arc;

use spool_proto::{Frame, split_params};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, BufReader},
    sync::oneshot,
};
use tracing::{debug, info, trace, warn};

use crate::{
    client::Client,
    codec::FrameSink,
    dispatch::Dispatcher,
    error::{ClientError, ConnectionError},
    queue::QueueEngine,
    state::DeliveryHandoff,
};

pub(crate) const CONNECTION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::connection");

/// Default limit on a single request line, terminator included.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Largest credit a single RDY may grant.
pub const MAX_READY_COUNT: u32 = 1000;

/// Per-connection limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Longest accepted request line, terminator included
    pub max_line_bytes: usize,
    /// Upper bound for RDY counts
    pub max_ready_count: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { max_line_bytes: DEFAULT_MAX_LINE_BYTES, max_ready_count: MAX_READY_COUNT }
    }
}

enum LineRead {
    Line,
    Eof,
}

/// Serves client connections against one queue engine.
///
/// Cheap to clone; clones share the engine and command table.
#[derive(Clone)]
pub struct Connection {
    engine: Arc<dyn QueueEngine>,
    dispatcher: Arc<Dispatcher>,
    config: ConnectionConfig,
}

impl Connection {
    /// Serve the V2 command set.
    pub fn new(engine: Arc<dyn QueueEngine>, config: ConnectionConfig) -> Self {
        Self::with_dispatcher(engine, Dispatcher::v2(), config)
    }

    /// Serve a custom command table.
    pub fn with_dispatcher(
        engine: Arc<dyn QueueEngine>,
        dispatcher: Dispatcher,
        config: ConnectionConfig,
    ) -> Self {
        Self { engine, dispatcher: Arc::new(dispatcher), config }
    }

    /// Connection limits.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Run the connection loop over a duplex stream until it closes.
    ///
    /// Clean EOF returns `Ok(())`.
    pub async fn serve<S>(&self, stream: S, peer: impl Into<Arc<str>>) -> Result<(), ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        self.serve_split(reader, writer, peer).await
    }

    /// Run the connection loop over separate read and write halves.
    pub async fn serve_split<R, W>(
        &self,
        reader: R,
        writer: W,
        peer: impl Into<Arc<str>>,
    ) -> Result<(), ConnectionError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let peer = peer.into();
        let (exit_tx, exit_rx) = oneshot::channel();
        let (fault_tx, mut fault_rx) = oneshot::channel();
        let handoff = DeliveryHandoff { exit: exit_rx, fault: fault_tx };

        let mut reader = BufReader::new(reader);
        let mut client = Client::new(
            Arc::clone(&self.engine),
            FrameSink::new(writer),
            handoff,
            self.config.clone(),
            Arc::clone(&peer),
        );
        info!(target: CONNECTION_TARGET, %peer, "client connected");

        let result = self.read_loop(&mut client, &mut reader, &mut fault_rx).await;

        // Sole stop signal for the delivery loop. A send error only means no
        // delivery loop was ever started.
        let _ = exit_tx.send(());
        client.join_delivery().await;

        match &result {
            Ok(()) => info!(target: CONNECTION_TARGET, %peer, "client disconnected"),
            Err(error) => warn!(target: CONNECTION_TARGET, %peer, %error, "connection closed"),
        }
        result
    }

    async fn read_loop<R>(
        &self,
        client: &mut Client,
        reader: &mut R,
        fault_rx: &mut oneshot::Receiver<std::io::Error>,
    ) -> Result<(), ConnectionError>
    where
        R: AsyncBufRead + Unpin,
    {
        let max = self.config.max_line_bytes;
        let mut line = Vec::new();
        let mut fault_open = true;

        loop {
            // `read_line` keeps partial input in `line`, so a cancelled read
            // resumes where it left off.
            let read = tokio::select! {
                read = read_line(reader, &mut line, max) => read?,
                fault = &mut *fault_rx, if fault_open => match fault {
                    Ok(error) => return Err(ConnectionError::DeliveryWrite(error)),
                    Err(_) => {
                        fault_open = false;
                        continue;
                    },
                },
            };

            if let LineRead::Eof = read {
                if !line.is_empty() {
                    debug!(
                        target: CONNECTION_TARGET,
                        peer = client.peer(),
                        bytes = line.len(),
                        "discarding unterminated request"
                    );
                }
                return Ok(());
            }

            // Requests are ASCII; invalid UTF-8 is a protocol error.
            let result = match std::str::from_utf8(&line) {
                Ok(text) => {
                    let params = split_params(text);
                    trace!(target: CONNECTION_TARGET, peer = client.peer(), command = params[0], "request");
                    self.dispatcher.execute(client, &params)
                },
                Err(_) => Err(ClientError::Invalid),
            };
            line.clear();

            match result {
                Ok(Some(data)) => client.sink().send(&Frame::response(data)).await?,
                Ok(None) => {},
                Err(error) => {
                    debug!(target: CONNECTION_TARGET, peer = client.peer(), %error, "command failed");
                    client.sink().send(&Frame::error(&error.code())).await?;
                },
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("dispatcher", &self.dispatcher)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Append bytes to `line` until it ends in `\n`, the stream ends or `max`
/// bytes are buffered.
async fn read_line<R>(reader: &mut R, line: &mut Vec<u8>, max: usize) -> Result<LineRead, ConnectionError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let limit = max.saturating_sub(line.len()) as u64;
        let read = (&mut *reader).take(limit).read_until(b'\n', line).await?;

        if line.last() == Some(&b'\n') {
            return Ok(LineRead::Line);
        }
        if line.len() >= max {
            return Err(ConnectionError::LineTooLong { max });
        }
        if read == 0 {
            return Ok(LineRead::Eof);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        pin::Pin,
        task::{Context, Poll},
        time::Duration,
    };

    use spool_proto::FrameType;
    use tokio::{
        io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf},
        task::JoinHandle,
        time::timeout,
    };

    use super::*;
    use crate::{
        codec::read_frame,
        memory::MemoryQueue,
        queue::{Channel, MESSAGE_ID_LEN},
    };

    const MAX_FRAME: usize = 64 * 1024;

    struct Harness {
        queue: Arc<MemoryQueue>,
        reader: ReadHalf<DuplexStream>,
        writer: WriteHalf<DuplexStream>,
        server: JoinHandle<Result<(), ConnectionError>>,
    }

    impl Harness {
        fn connect() -> Self {
            Self::with_config(ConnectionConfig::default())
        }

        fn with_config(config: ConnectionConfig) -> Self {
            let queue = Arc::new(MemoryQueue::new());
            let connection = Connection::new(queue.clone(), config);
            let (client, server) = tokio::io::duplex(MAX_FRAME);
            let server = tokio::spawn(async move { connection.serve(server, "test").await });
            let (reader, writer) = tokio::io::split(client);
            Self { queue, reader, writer, server }
        }

        async fn send(&mut self, line: &str) {
            self.send_bytes(line.as_bytes()).await;
        }

        async fn send_bytes(&mut self, bytes: &[u8]) {
            self.writer.write_all(bytes).await.unwrap();
        }

        async fn frame(&mut self) -> Frame {
            timeout(Duration::from_secs(1), read_frame(&mut self.reader, MAX_FRAME))
                .await
                .expect("frame expected")
                .unwrap()
        }

        async fn expect_error(&mut self, code: &str) {
            let frame = self.frame().await;
            assert_eq!(frame.frame_type, FrameType::Error);
            assert_eq!(&frame.payload[..], code.as_bytes());
        }

        async fn expect_message(&mut self, body: &str) -> String {
            let frame = self.frame().await;
            assert_eq!(frame.frame_type, FrameType::Message);
            assert_eq!(&frame.payload[MESSAGE_ID_LEN..], body.as_bytes());
            hex::encode(&frame.payload[..MESSAGE_ID_LEN])
        }

        async fn expect_silence(&mut self) {
            let read = timeout(Duration::from_millis(50), read_frame(&mut self.reader, MAX_FRAME)).await;
            assert!(read.is_err(), "unexpected frame: {read:?}");
        }

        fn publish(&self, topic: &str, body: &'static str) {
            self.queue.publish(topic, body).unwrap();
        }

        async fn close(mut self) -> Result<(), ConnectionError> {
            self.writer.shutdown().await.unwrap();
            timeout(Duration::from_secs(1), self.server).await.expect("connection loop stopped").unwrap()
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    struct BrokenWriter;

    impl AsyncWrite for BrokenWriter {
        fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_up_to_granted_credit() {
        let mut h = Harness::connect();
        h.send("SUB t1 c1\nRDY 5\n").await;
        settle().await;

        for body in ["a", "b", "c"] {
            h.publish("t1", body);
        }
        for body in ["a", "b", "c"] {
            h.expect_message(body).await;
        }

        // Two credits remain.
        for body in ["d", "e", "f"] {
            h.publish("t1", body);
        }
        h.expect_message("d").await;
        h.expect_message("e").await;
        h.expect_silence().await;

        h.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn latest_credit_grant_wins() {
        let mut h = Harness::connect();
        h.send("SUB t1 c1\nRDY 5\nRDY 1\n").await;
        settle().await;

        for body in ["a", "b", "c"] {
            h.publish("t1", body);
        }
        h.expect_message("a").await;
        h.expect_silence().await;

        h.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn withholds_messages_without_credit() {
        let mut h = Harness::connect();
        h.send("SUB t1 c1\n").await;
        settle().await;

        h.publish("t1", "held");
        h.expect_silence().await;

        h.send("RDY\n").await;
        h.expect_message("held").await;

        h.send("RDY 0\n").await;
        settle().await;
        h.publish("t1", "after");
        h.expect_silence().await;

        h.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn fin_acknowledges_delivered_message() {
        let mut h = Harness::connect();
        h.send("SUB t1 c1\nRDY 1\n").await;
        settle().await;
        h.publish("t1", "work");
        let id = h.expect_message("work").await;

        let channel = h.queue.memory_topic("t1").memory_channel("c1");
        assert_eq!(channel.in_flight_len(), 1);

        h.send(&format!("FIN {id}\n")).await;
        settle().await;
        assert_eq!(channel.in_flight_len(), 0);

        h.send(&format!("FIN {id}\n")).await;
        h.expect_error(&format!("message {id} is not in flight")).await;

        h.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn req_redelivers_message() {
        let mut h = Harness::connect();
        h.send("SUB t1 c1\nRDY 2\n").await;
        settle().await;
        h.publish("t1", "retry");
        let id = h.expect_message("retry").await;

        h.send(&format!("REQ {id}\n")).await;
        let again = h.expect_message("retry").await;
        assert_eq!(again, id);

        h.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn protocol_errors_keep_connection_open() {
        let mut h = Harness::connect();

        h.send("FIN 0123\n").await;
        h.expect_error("E_INVALID").await;
        h.send("REQ 0123\n").await;
        h.expect_error("E_INVALID").await;
        h.send("RDY 1\n").await;
        h.expect_error("E_INVALID").await;
        h.send("SUB t1\n").await;
        h.expect_error("E_INVALID").await;
        h.send("SUB t1 \n").await;
        h.expect_error("E_BAD_CHANNEL").await;
        h.send("SUB  c1\n").await;
        h.expect_error("E_BAD_TOPIC").await;
        h.send("NOP\n").await;
        h.expect_error("E_INVALID").await;
        h.send("\n").await;
        h.expect_error("E_INVALID").await;

        h.send("sub t1 c1\n").await;
        h.expect_silence().await;
        h.send("SUB t1 c1\n").await;
        h.expect_error("E_INVALID").await;

        h.send("RDY 2000\n").await;
        h.expect_error("E_INVALID").await;
        h.send("RDY -1\n").await;
        h.expect_error("E_INVALID").await;
        h.send("RDY many\n").await;
        h.expect_error("invalid digit found in string").await;

        h.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_grants_leave_credit_unchanged() {
        let mut h = Harness::connect();
        h.send("SUB t1 c1\nRDY 2\n").await;
        settle().await;

        h.send("RDY 2000\n").await;
        h.expect_error("E_INVALID").await;
        h.send("RDY many\n").await;
        h.expect_error("invalid digit found in string").await;

        for body in ["a", "b", "c"] {
            h.publish("t1", body);
        }
        h.expect_message("a").await;
        h.expect_message("b").await;
        h.expect_silence().await;

        h.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn non_utf8_lines_are_invalid() {
        let mut h = Harness::connect();
        h.send_bytes(b"SUB t\xff c1\n").await;
        h.expect_error("E_INVALID").await;
        h.send_bytes(b"SUB t\xfe c1\n").await;
        h.expect_error("E_INVALID").await;

        // Still in Init: a valid SUB succeeds silently.
        h.send("SUB t1 c1\nRDY 1\n").await;
        settle().await;
        h.publish("t1", "ok");
        h.expect_message("ok").await;

        h.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn carriage_returns_are_stripped() {
        let mut h = Harness::connect();
        h.send("SUB t1 c1\r\nRDY 1\r\n").await;
        settle().await;

        h.queue.memory_topic("t1").memory_channel("c1");
        h.publish("t1", "crlf");
        h.expect_message("crlf").await;

        h.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unterminated_line_at_eof_is_discarded() {
        let mut h = Harness::connect();
        h.send("FIN 0123").await;
        h.writer.shutdown().await.unwrap();

        let result = timeout(Duration::from_secs(1), &mut h.server).await.unwrap().unwrap();
        assert!(result.is_ok());

        let read = read_frame(&mut h.reader, MAX_FRAME).await;
        assert_eq!(read.unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test(start_paused = true)]
    async fn overlong_line_is_fatal() {
        let mut h = Harness::with_config(ConnectionConfig { max_line_bytes: 16, ..Default::default() });
        h.send(&"A".repeat(32)).await;

        let result = timeout(Duration::from_secs(1), &mut h.server).await.unwrap().unwrap();
        assert!(matches!(result, Err(ConnectionError::LineTooLong { max: 16 })));
    }

    #[tokio::test(start_paused = true)]
    async fn line_at_limit_is_accepted() {
        let mut h = Harness::with_config(ConnectionConfig { max_line_bytes: 4, ..Default::default() });
        h.send("NOP\n").await;
        h.expect_error("E_INVALID").await;

        h.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn eof_stops_delivery_and_keeps_messages() {
        let mut h = Harness::connect();
        h.send("SUB t1 c1\nRDY 10\n").await;
        settle().await;

        let queue = Arc::clone(&h.queue);
        h.close().await.unwrap();

        // The delivery loop is gone, so published messages stay queued.
        let channel = queue.memory_topic("t1").memory_channel("c1");
        queue.publish("t1", "late").unwrap();
        let message = timeout(Duration::from_secs(1), channel.recv()).await.unwrap().unwrap();
        assert_eq!(&message.body()[..], b"late");
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_write_failure_closes_connection() {
        let queue = Arc::new(MemoryQueue::new());
        let connection = Connection::new(queue.clone(), ConnectionConfig::default());
        let (mut client, server) = tokio::io::duplex(MAX_FRAME);
        let task = tokio::spawn(async move { connection.serve_split(server, BrokenWriter, "broken").await });

        client.write_all(b"SUB t1 c1\nRDY 1\n").await.unwrap();
        settle().await;
        queue.publish("t1", "lost").unwrap();

        let result = timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(matches!(result, Err(ConnectionError::DeliveryWrite(_))));

        let channel = queue.memory_topic("t1").memory_channel("c1");
        assert_eq!(channel.in_flight_len(), 0);
        let message = timeout(Duration::from_secs(1), channel.recv()).await.unwrap().unwrap();
        assert_eq!(&message.body()[..], b"lost");
    }
}
