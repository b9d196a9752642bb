//! # In-process broker.
//!
//! [`MemoryBroker`] implements [`Broker`] with direct exchanges and named queues
//! held in memory. Clones share the same broker, so several buses built on clones
//! of one `MemoryBroker` talk to each other like processes on a real broker.
//!
//! ```text
//! publish(exchange, msg) ──► bindings[exchange][msg.routing_key] ──► queue A, queue B
//!                                         (none)                 ──► discarded
//! queue ──► one consumer stream at a time (released when the stream is dropped)
//! ```
//!
//! Outage simulation: [`MemoryBroker::disconnect`] drops every queue and binding
//! (ending every consumer stream) and refuses new channels until
//! [`MemoryBroker::restore`].

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, trace};

use crate::error::TransportError;
use crate::remote::{Broker, Channel, Deliveries, Message};

type Receiver = Arc<Mutex<mpsc::UnboundedReceiver<Message>>>;

struct Queue {
    tx: mpsc::UnboundedSender<Message>,
    rx: Receiver,
    consumer: Weak<()>,
}

impl Queue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            consumer: Weak::new(),
        }
    }
}

#[derive(Default)]
struct State {
    offline: bool,
    /// exchange → routing key → queues.
    exchanges: HashMap<String, HashMap<String, BTreeSet<String>>>,
    queues: HashMap<String, Queue>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    open: AtomicUsize,
    published: AtomicUsize,
}

/// In-memory direct-exchange broker.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage: queues and bindings are lost, consumer streams end,
    /// and new channels are refused.
    pub async fn disconnect(&self) {
        let mut state = self.shared.state.lock().await;
        state.offline = true;
        state.queues.clear();
        for routes in state.exchanges.values_mut() {
            routes.clear();
        }
        info!("memory broker disconnected");
    }

    /// Ends an outage started by [`disconnect`](Self::disconnect).
    pub async fn restore(&self) {
        self.shared.state.lock().await.offline = false;
        info!("memory broker restored");
    }

    /// Channels opened and not yet closed.
    pub fn open_channels(&self) -> usize {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Messages accepted by `publish` so far (routed or not).
    pub fn published(&self) -> usize {
        self.shared.published.load(Ordering::SeqCst)
    }

    /// Number of queues currently declared.
    pub async fn queue_count(&self) -> usize {
        self.shared.state.lock().await.queues.len()
    }
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("open_channels", &self.open_channels())
            .field("published", &self.published())
            .finish()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn open_channel(&self) -> Result<Box<dyn Channel>, TransportError> {
        if self.shared.state.lock().await.offline {
            return Err(offline());
        }
        self.shared.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryChannel {
            shared: Arc::clone(&self.shared),
            closed: AtomicBool::new(false),
        }))
    }
}

fn offline() -> TransportError {
    TransportError::Unavailable {
        reason: "broker disconnected".to_string(),
    }
}

struct MemoryChannel {
    shared: Arc<Shared>,
    closed: AtomicBool,
}

impl MemoryChannel {
    async fn state(&self) -> Result<tokio::sync::MutexGuard<'_, State>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ChannelClosed);
        }
        let state = self.shared.state.lock().await;
        if state.offline {
            return Err(offline());
        }
        Ok(state)
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn declare_exchange(&self, exchange: &str) -> Result<(), TransportError> {
        let mut state = self.state().await?;
        state.exchanges.entry(exchange.to_string()).or_default();
        Ok(())
    }

    async fn declare_queue(&self, queue: &str) -> Result<(), TransportError> {
        let mut state = self.state().await?;
        state
            .queues
            .entry(queue.to_string())
            .or_insert_with(Queue::new);
        Ok(())
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), TransportError> {
        let mut state = self.state().await?;
        state.queues.remove(queue);
        for routes in state.exchanges.values_mut() {
            for queues in routes.values_mut() {
                queues.remove(queue);
            }
        }
        Ok(())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), TransportError> {
        let mut state = self.state().await?;
        if !state.queues.contains_key(queue) {
            return Err(TransportError::QueueNotFound {
                queue: queue.to_string(),
            });
        }
        let routes = state
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| TransportError::ExchangeNotFound {
                exchange: exchange.to_string(),
            })?;
        routes
            .entry(routing_key.to_string())
            .or_default()
            .insert(queue.to_string());
        Ok(())
    }

    async fn unbind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), TransportError> {
        let mut state = self.state().await?;
        if let Some(queues) = state
            .exchanges
            .get_mut(exchange)
            .and_then(|routes| routes.get_mut(routing_key))
        {
            queues.remove(queue);
        }
        Ok(())
    }

    async fn publish(&self, exchange: &str, message: Message) -> Result<(), TransportError> {
        let state = self.state().await?;
        let routes = state
            .exchanges
            .get(exchange)
            .ok_or_else(|| TransportError::ExchangeNotFound {
                exchange: exchange.to_string(),
            })?;
        self.shared.published.fetch_add(1, Ordering::SeqCst);

        let Some(targets) = routes.get(&message.routing_key) else {
            trace!(routing_key = %message.routing_key, "unroutable message discarded");
            return Ok(());
        };
        for name in targets {
            if let Some(queue) = state.queues.get(name) {
                // Cannot fail: the queue holds its own receiver.
                let _ = queue.tx.send(message.clone());
            }
        }
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<Deliveries, TransportError> {
        let mut state = self.state().await?;
        let slot = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| TransportError::QueueNotFound {
                queue: queue.to_string(),
            })?;
        if slot.consumer.upgrade().is_some() {
            return Err(TransportError::QueueInUse {
                queue: queue.to_string(),
            });
        }

        let token = Arc::new(());
        slot.consumer = Arc::downgrade(&token);
        let rx = Arc::clone(&slot.rx);

        // The queue owns the only sender, so the stream ends once the queue is dropped.
        let deliveries = stream::unfold((rx, token), |(rx, token)| async move {
            let next = rx.lock().await.recv().await;
            next.map(|message| (Ok::<_, TransportError>(message), (rx, token)))
        });
        Ok(deliveries.boxed())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.shared.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ScopedChannel;
    use std::time::Duration;

    async fn setup(broker: &MemoryBroker, queue: &str, key: &str) -> ScopedChannel {
        let ch = ScopedChannel::open(broker).await.unwrap();
        ch.declare_exchange("ex").await.unwrap();
        ch.declare_queue(queue).await.unwrap();
        ch.bind_queue(queue, "ex", key).await.unwrap();
        ch
    }

    #[tokio::test]
    async fn routes_by_key_and_discards_unroutable() {
        let broker = MemoryBroker::new();
        let ch = setup(&broker, "q", "Ping").await;
        let mut deliveries = ch.consume("q").await.unwrap();

        ch.publish("ex", Message::new("Pong", b"1".to_vec()))
            .await
            .unwrap();
        ch.publish("ex", Message::new("Ping", b"2".to_vec()))
            .await
            .unwrap();

        let got = deliveries.next().await.unwrap().unwrap();
        assert_eq!(got.body, b"2".to_vec());
        assert_eq!(broker.published(), 2);
    }

    #[tokio::test]
    async fn publish_to_unknown_exchange_fails() {
        let broker = MemoryBroker::new();
        let ch = ScopedChannel::open(&broker).await.unwrap();
        let err = ch
            .publish("nope", Message::new("Ping", Vec::new()))
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "transport_exchange_not_found");
    }

    #[tokio::test]
    async fn one_consumer_per_queue_until_stream_dropped() {
        let broker = MemoryBroker::new();
        let ch = setup(&broker, "q", "Ping").await;

        let first = ch.consume("q").await.unwrap();
        assert!(matches!(
            ch.consume("q").await,
            Err(TransportError::QueueInUse { .. })
        ));

        drop(first);
        assert!(ch.consume("q").await.is_ok());
    }

    #[tokio::test]
    async fn scoped_channel_is_released_on_drop() {
        let broker = MemoryBroker::new();
        {
            let ch = ScopedChannel::open(&broker).await.unwrap();
            assert_eq!(broker.open_channels(), 1);
            assert!(ch.publish("missing", Message::new("x", Vec::new())).await.is_err());
        }
        assert_eq!(broker.open_channels(), 0);
    }

    #[tokio::test]
    async fn disconnect_ends_streams_and_refuses_channels() {
        let broker = MemoryBroker::new();
        let ch = setup(&broker, "q", "Ping").await;
        let mut deliveries = ch.consume("q").await.unwrap();

        broker.disconnect().await;
        let end = tokio::time::timeout(Duration::from_secs(1), deliveries.next())
            .await
            .unwrap();
        assert!(end.is_none());
        assert!(broker.open_channel().await.is_err());
        assert!(ch.declare_queue("q").await.is_err());

        broker.restore().await;
        let ch = setup(&broker, "q", "Ping").await;
        assert!(ch.consume("q").await.is_ok());
        assert_eq!(broker.queue_count().await, 1);
    }

    #[tokio::test]
    async fn closed_channel_rejects_operations() {
        let broker = MemoryBroker::new();
        let ch = broker.open_channel().await.unwrap();
        ch.close();
        ch.close();
        assert_eq!(broker.open_channels(), 0);
        assert_eq!(
            ch.declare_exchange("ex").await.unwrap_err(),
            TransportError::ChannelClosed
        );
    }
}
