//! Credit-based push of channel messages to a subscribed client.
//!
//! # Regimes
//!
//! ```text
//!            credit > 0                         credit == 0
//! ┌───────────────────────────────┐   ┌───────────────────────────────┐
//! │ wait for first of:            │   │ wait for first of:            │
//! │   credit grant -> overwrite   │   │   credit grant -> overwrite   │
//! │   message      -> write, -1   │   │   exit         -> stop        │
//! │   exit         -> stop        │   │                               │
//! └───────────────────────────────┘   └───────────────────────────────┘
//! ```
//!
//! A message is only pulled from the channel while credit is positive, so the
//! loop never holds a message it has no credit for. Each grant replaces the
//! current credit rather than adding to it.
//!
//! The exit signal is the only way out. A failed message write is reported to
//! the connection loop, which tears the connection down and fires the exit
//! signal; until then the loop stops consuming and waits for it.

use std::{io, sync::Arc};

use spool_proto::Frame;
use tokio::sync::{oneshot, watch};
use tracing::{debug, trace, warn};

use crate::{
    codec::FrameSink,
    queue::{Channel, Message},
    state::DeliveryHandoff,
};

pub(crate) const DELIVERY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::delivery");

enum Outcome {
    Delivered,
    Failed,
    Exited,
}

/// Delivery task state. Owns the connection's remaining credit.
pub(crate) struct DeliveryLoop {
    channel: Arc<dyn Channel>,
    credit_rx: watch::Receiver<u32>,
    exit: oneshot::Receiver<()>,
    fault: Option<oneshot::Sender<io::Error>>,
    sink: FrameSink,
    peer: Arc<str>,
    available: u32,
    credit_open: bool,
    consuming: bool,
}

impl DeliveryLoop {
    pub(crate) fn new(
        channel: Arc<dyn Channel>,
        credit_rx: watch::Receiver<u32>,
        handoff: DeliveryHandoff,
        sink: FrameSink,
        peer: Arc<str>,
    ) -> Self {
        Self {
            channel,
            credit_rx,
            exit: handoff.exit,
            fault: Some(handoff.fault),
            sink,
            peer,
            available: 0,
            credit_open: true,
            consuming: true,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(target: DELIVERY_TARGET, peer = %self.peer, channel = self.channel.name(), "delivery loop started");

        loop {
            if self.available > 0 && self.consuming {
                tokio::select! {
                    changed = self.credit_rx.changed(), if self.credit_open => {
                        self.apply_credit(changed.is_ok());
                    },
                    message = self.channel.recv() => match message {
                        Some(message) => match self.deliver(message).await {
                            Outcome::Delivered => {},
                            Outcome::Failed => self.consuming = false,
                            Outcome::Exited => break,
                        },
                        None => {
                            debug!(target: DELIVERY_TARGET, peer = %self.peer, "channel closed");
                            self.consuming = false;
                        },
                    },
                    _ = &mut self.exit => break,
                }
            } else {
                tokio::select! {
                    changed = self.credit_rx.changed(), if self.credit_open => {
                        self.apply_credit(changed.is_ok());
                    },
                    _ = &mut self.exit => break,
                }
            }
        }

        debug!(
            target: DELIVERY_TARGET,
            peer = %self.peer,
            remaining_credit = self.available,
            "delivery loop stopped"
        );
    }

    fn apply_credit(&mut self, open: bool) {
        if open {
            self.available = *self.credit_rx.borrow_and_update();
            trace!(target: DELIVERY_TARGET, peer = %self.peer, credit = self.available, "credit updated");
        } else {
            self.credit_open = false;
        }
    }

    async fn deliver(&mut self, message: Message) -> Outcome {
        self.available -= 1;
        let frame = Frame::message(message.id().as_bytes(), message.body());

        trace!(
            target: DELIVERY_TARGET,
            peer = %self.peer,
            id = %message.id(),
            remaining_credit = self.available,
            "writing message"
        );

        let result = tokio::select! {
            result = self.sink.send(&frame) => result,
            _ = &mut self.exit => {
                self.requeue(&message);
                return Outcome::Exited;
            },
        };

        match result {
            Ok(()) => Outcome::Delivered,
            Err(error) => {
                warn!(target: DELIVERY_TARGET, peer = %self.peer, id = %message.id(), %error, "message write failed");
                self.requeue(&message);
                if let Some(fault) = self.fault.take() {
                    let _ = fault.send(error);
                }
                Outcome::Failed
            },
        }
    }

    fn requeue(&self, message: &Message) {
        if let Err(error) = self.channel.requeue(&message.id().to_string()) {
            warn!(target: DELIVERY_TARGET, peer = %self.peer, id = %message.id(), %error, "requeue after failed delivery rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        pin::Pin,
        task::{Context, Poll},
        time::Duration,
    };

    use spool_proto::FrameType;
    use tokio::{io::AsyncWrite, task::JoinHandle};

    use super::*;
    use crate::{
        codec::read_frame,
        memory::{MemoryChannel, MemoryQueue},
    };

    struct BrokenWriter;

    impl AsyncWrite for BrokenWriter {
        fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone")))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    struct Harness {
        queue: MemoryQueue,
        channel: Arc<MemoryChannel>,
        credit: watch::Sender<u32>,
        exit: oneshot::Sender<()>,
        fault: oneshot::Receiver<io::Error>,
        task: JoinHandle<()>,
    }

    fn spawn_loop(sink: FrameSink) -> Harness {
        let queue = MemoryQueue::new();
        let channel = queue.memory_topic("t").memory_channel("c");
        let (credit, credit_rx) = watch::channel(0);
        let (exit, exit_rx) = oneshot::channel();
        let (fault_tx, fault) = oneshot::channel();
        let handoff = DeliveryHandoff { exit: exit_rx, fault: fault_tx };
        let delivery = DeliveryLoop::new(channel.clone(), credit_rx, handoff, sink, Arc::from("test"));
        let task = tokio::spawn(delivery.run());
        Harness { queue, channel, credit, exit, fault, task }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn holds_messages_without_credit() {
        let (client, server) = tokio::io::duplex(4096);
        let (mut reader, _w) = tokio::io::split(client);
        let harness = spawn_loop(FrameSink::new(server));

        harness.queue.publish("t", "a").unwrap();
        settle().await;
        assert_eq!(harness.channel.in_flight_len(), 0);

        harness.credit.send_replace(1);
        let frame = read_frame(&mut reader, 4096).await.unwrap();
        assert_eq!(frame.frame_type, FrameType::Message);
        assert_eq!(&frame.payload[16..], b"a");
        assert_eq!(harness.channel.in_flight_len(), 1);

        harness.exit.send(()).unwrap();
        harness.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_exit_with_credit_outstanding() {
        let harness = spawn_loop(FrameSink::new(tokio::io::sink()));
        harness.credit.send_replace(10);
        settle().await;

        harness.exit.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), harness.task).await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_exit_sender_is_dropped() {
        let harness = spawn_loop(FrameSink::new(tokio::io::sink()));
        drop(harness.exit);
        tokio::time::timeout(Duration::from_secs(1), harness.task).await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_requeues_and_reports() {
        let harness = spawn_loop(FrameSink::new(BrokenWriter));
        let id = harness.queue.publish("t", "lost").unwrap();
        harness.credit.send_replace(5);

        let error = harness.fault.await.unwrap();
        assert_eq!(error.kind(), io::ErrorKind::BrokenPipe);
        settle().await;

        // Requeued and no longer consumed by the failed loop.
        assert_eq!(harness.channel.in_flight_len(), 0);
        let again = harness.channel.recv().await.unwrap();
        assert_eq!(again.id(), id);

        harness.exit.send(()).unwrap();
        harness.task.await.unwrap();
    }
}
