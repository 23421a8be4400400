//! In-memory queue engine.
//!
//! Non-durable engine used by the server binary and by tests. Topics fan each
//! published message out to every channel; a channel hands each message to
//! exactly one consumer and tracks it as in flight until it is finished or
//! requeued. Messages published before a topic has any channel are retained
//! and flushed into the first channel created.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex as AsyncMutex, mpsc};

use crate::queue::{Channel, Message, MessageId, QueueEngine, QueueError, Topic};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Engine holding every topic in memory.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    topics: Mutex<HashMap<String, Arc<MemoryTopic>>>,
}

impl MemoryQueue {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a topic with its concrete type.
    pub fn memory_topic(&self, name: &str) -> Arc<MemoryTopic> {
        let mut topics = lock(&self.topics);
        Arc::clone(topics.entry(name.to_string()).or_insert_with(|| Arc::new(MemoryTopic::new(name))))
    }

    /// Publish a message to a topic, creating the topic if needed.
    pub fn publish(&self, topic: &str, body: impl Into<Bytes>) -> Result<MessageId, QueueError> {
        self.memory_topic(topic).publish(body)
    }
}

impl QueueEngine for MemoryQueue {
    fn topic(&self, name: &str) -> Arc<dyn Topic> {
        self.memory_topic(name)
    }
}

#[derive(Debug, Default)]
struct TopicInner {
    channels: HashMap<String, Arc<MemoryChannel>>,
    backlog: Vec<Message>,
}

/// In-memory topic.
#[derive(Debug)]
pub struct MemoryTopic {
    name: String,
    inner: Mutex<TopicInner>,
}

impl MemoryTopic {
    fn new(name: &str) -> Self {
        Self { name: name.to_string(), inner: Mutex::new(TopicInner::default()) }
    }

    /// Publish a message to every channel of this topic.
    pub fn publish(&self, body: impl Into<Bytes>) -> Result<MessageId, QueueError> {
        let message = Message::new(MessageId::generate()?, body);
        let id = message.id();

        let mut inner = lock(&self.inner);
        if inner.channels.is_empty() {
            inner.backlog.push(message);
        } else {
            for channel in inner.channels.values() {
                channel.put(message.clone());
            }
        }

        Ok(id)
    }

    /// Resolve a channel with its concrete type.
    pub fn memory_channel(&self, name: &str) -> Arc<MemoryChannel> {
        let mut inner = lock(&self.inner);
        if let Some(channel) = inner.channels.get(name) {
            return Arc::clone(channel);
        }

        let channel = Arc::new(MemoryChannel::new(name));
        for message in inner.backlog.drain(..) {
            channel.put(message);
        }
        inner.channels.insert(name.to_string(), Arc::clone(&channel));
        channel
    }
}

impl Topic for MemoryTopic {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel(&self, name: &str) -> Arc<dyn Channel> {
        self.memory_channel(name)
    }
}

/// In-memory channel.
#[derive(Debug)]
pub struct MemoryChannel {
    name: String,
    sender: mpsc::UnboundedSender<Message>,
    receiver: AsyncMutex<mpsc::UnboundedReceiver<Message>>,
    in_flight: Mutex<HashMap<MessageId, Message>>,
}

impl MemoryChannel {
    fn new(name: &str) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            name: name.to_string(),
            sender,
            receiver: AsyncMutex::new(receiver),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn put(&self, message: Message) {
        // The receiver is owned by `self`, so the queue cannot be closed here.
        let _ = self.sender.send(message);
    }

    /// Number of delivered messages awaiting finish or requeue.
    pub fn in_flight_len(&self) -> usize {
        lock(&self.in_flight).len()
    }

    fn take_in_flight(&self, id: &str) -> Result<Message, QueueError> {
        let id: MessageId = id.parse()?;
        lock(&self.in_flight).remove(&id).ok_or(QueueError::NotInFlight(id))
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recv(&self) -> Option<Message> {
        let message = self.receiver.lock().await.recv().await?;
        lock(&self.in_flight).insert(message.id(), message.clone());
        Some(message)
    }

    fn finish(&self, id: &str) -> Result<(), QueueError> {
        self.take_in_flight(id).map(drop)
    }

    fn requeue(&self, id: &str) -> Result<(), QueueError> {
        let message = self.take_in_flight(id)?;
        self.put(message);
        Ok(())
    }
}
