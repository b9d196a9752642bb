//! # Broker transport contract.
//!
//! The remote bus needs very little from a broker:
//!
//! ```text
//! Broker ──open_channel──► Channel
//!                            ├─ declare_exchange / declare_queue / delete_queue
//!                            ├─ bind_queue / unbind_queue      (direct routing)
//!                            ├─ publish(exchange, Message)
//!                            ├─ consume(queue) ──► Deliveries  (stream of Message)
//!                            └─ close()
//! ```
//!
//! Channels are acquired per operation through [`ScopedChannel`], which closes the
//! channel when dropped, whichever way the operation ended.

use std::collections::BTreeMap;
use std::ops::Deref;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::TransportError;

/// Stream of messages delivered to a queue consumer.
///
/// Ends when the broker drops the consumer (queue deleted, connection lost).
pub type Deliveries = BoxStream<'static, Result<Message, TransportError>>;

/// One message on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Direct-routing key; the stable event name.
    pub routing_key: String,
    /// Optional string headers.
    pub headers: BTreeMap<String, String>,
    /// Encoded payload.
    pub body: Vec<u8>,
}

impl Message {
    /// Creates a message without headers.
    pub fn new(routing_key: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            routing_key: routing_key.into(),
            headers: BTreeMap::new(),
            body,
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Value of a header, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Connection to a message broker.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Opens a new channel.
    async fn open_channel(&self) -> Result<Box<dyn Channel>, TransportError>;
}

/// One channel on a broker connection.
///
/// Declarations are idempotent. Operations on a closed channel fail with
/// [`TransportError::ChannelClosed`].
#[async_trait]
pub trait Channel: Send + Sync {
    /// Declares a direct exchange.
    async fn declare_exchange(&self, exchange: &str) -> Result<(), TransportError>;

    /// Declares a queue.
    async fn declare_queue(&self, queue: &str) -> Result<(), TransportError>;

    /// Deletes a queue and its bindings; consumers of the queue see their stream end.
    async fn delete_queue(&self, queue: &str) -> Result<(), TransportError>;

    /// Routes messages published to `exchange` with `routing_key` into `queue`.
    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), TransportError>;

    /// Removes a binding. Removing a binding that does not exist succeeds.
    async fn unbind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), TransportError>;

    /// Publishes a message. Messages no queue is bound for are discarded.
    async fn publish(&self, exchange: &str, message: Message) -> Result<(), TransportError>;

    /// Starts consuming `queue`.
    async fn consume(&self, queue: &str) -> Result<Deliveries, TransportError>;

    /// Closes the channel. Idempotent.
    fn close(&self);
}

/// Channel that is closed when the guard is dropped.
pub struct ScopedChannel {
    channel: Box<dyn Channel>,
}

impl ScopedChannel {
    /// Opens a channel on `broker`.
    pub async fn open(broker: &dyn Broker) -> Result<Self, TransportError> {
        let channel = broker.open_channel().await?;
        Ok(Self { channel })
    }
}

impl Deref for ScopedChannel {
    type Target = dyn Channel;

    fn deref(&self) -> &Self::Target {
        self.channel.as_ref()
    }
}

impl Drop for ScopedChannel {
    fn drop(&mut self) {
        self.channel.close();
    }
}
