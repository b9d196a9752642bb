//! # Remote event bus.
//!
//! [`RemoteEventBus`] keeps the registration contract of the
//! [`LocalEventBus`] but routes every trigger through a broker, so every instance
//! attached to the same exchange sees it.
//!
//! ```text
//! trigger(&event) ──encode──► publish(exchange, routing_key = E::NAME)
//!                                   │
//!              broker (direct) ─────┴──► private queue of each interested instance
//!                                                 │
//! consumer task ◄─────────────────────────────────┘
//!   ├─ routing key ──► registry.event_by_name ──► EventKey   (unknown: drop)
//!   ├─ EventKey::decode(body)                                 (garbage: drop)
//!   └─ local fan-out, in registration order, one message at a time
//! ```
//!
//! ## Rules
//! - The local registry is the source of truth. The queue is bound for every event
//!   type with at least one registration; bindings follow registrations on a best
//!   effort basis and are rebuilt from the registry after a reconnect.
//! - Publishing does not wait for consumers. Delivery is at least once; handlers
//!   should tolerate repeats.
//! - A transport error moves the bus to [`ConnectionState::Faulted`]; the consumer
//!   task then reconnects with [`BusConfig::reconnect`] backoff.
//! - The consumer task holds a clone of the bus: call [`RemoteEventBus::shutdown`]
//!   to stop it.
//!
//! ## Example
//! ```rust
//! use relaybus::{EventRecord, MemoryBroker, RemoteEventBus};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), relaybus::BusError> {
//! let broker = MemoryBroker::new();
//! let bus = RemoteEventBus::builder(broker.clone()).connect().await?;
//!
//! bus.register_fn(|ev: &EventRecord| {
//!     println!("raised at {}", ev.event_time());
//! })
//! .await;
//! bus.trigger(&EventRecord::new()).await?;
//!
//! bus.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::codec;
use crate::config::BusConfig;
use crate::error::{BusError, TransportError};
use crate::events::{EventData, EventKey};
use crate::handlers::{EventHandler, HandlerKey, HandlerOutput};
use crate::local::{LocalEventBus, LocalEventBusBuilder, TriggerHandle};
use crate::registry::HandlerRegistry;
use crate::remote::state::StateCell;
use crate::remote::{Broker, ConnectionState, Deliveries, Message, ScopedChannel};
use crate::resolve::{Container, Discovery, HandlerResolver};

/// Header naming the only handler that should receive a message.
pub const TARGET_HEADER: &str = "x-target-handler";

struct Remote {
    broker: Arc<dyn Broker>,
    cfg: BusConfig,
    queue: String,
    /// Event types the queue is currently bound for.
    bound: Mutex<HashSet<EventKey>>,
    state: StateCell,
    shutdown: CancellationToken,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

/// Consuming side of one connection.
struct Session {
    _channel: ScopedChannel,
    deliveries: Deliveries,
}

enum Wake {
    Shutdown,
    Faulted,
    Delivery(Option<Result<Message, TransportError>>),
}

/// Event bus relaying events through a message broker.
///
/// Cheap to clone; clones share the connection and the consumer task.
#[derive(Clone)]
pub struct RemoteEventBus {
    local: LocalEventBus,
    inner: Arc<Remote>,
}

impl RemoteEventBus {
    /// Starts building a bus on `broker`.
    pub fn builder<B: Broker>(broker: B) -> RemoteEventBusBuilder {
        RemoteEventBusBuilder::new(Arc::new(broker))
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    /// Receiver observing every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Name of the private inbound queue.
    pub fn queue(&self) -> &str {
        &self.inner.queue
    }

    /// Configuration the bus was built with.
    pub fn config(&self) -> &BusConfig {
        &self.inner.cfg
    }

    /// Registry backing this bus.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        self.local.registry()
    }

    /// Container resolving handler keys for this bus.
    pub fn container(&self) -> &Arc<Container> {
        self.local.container()
    }

    /// True if at least one handler is registered for `E`.
    pub fn has_registration<E: EventData>(&self) -> bool {
        self.local.has_registration::<E>()
    }

    /// Registers a handler instance for event type `E`.
    pub async fn register<E, H>(&self, handler: H) -> HandlerKey
    where
        E: EventData,
        H: EventHandler<E>,
    {
        let key = self.local.register::<E, H>(handler);
        self.sync_binding(EventKey::of::<E>()).await;
        key
    }

    /// Registers a shared handler instance for event type `E`.
    pub async fn register_shared<E, H>(&self, handler: Arc<H>) -> HandlerKey
    where
        E: EventData,
        H: EventHandler<E>,
    {
        let key = self.local.register_shared::<E, H>(handler);
        self.sync_binding(EventKey::of::<E>()).await;
        key
    }

    /// Registers a closure for event type `E`.
    pub async fn register_fn<E, F, R>(&self, f: F) -> HandlerKey
    where
        E: EventData,
        F: Fn(&E) -> R + Send + Sync + 'static,
        R: HandlerOutput,
    {
        let key = self.local.register_fn::<E, F, R>(f);
        self.sync_binding(EventKey::of::<E>()).await;
        key
    }

    /// Registers handler type `H` for event type `E` by key.
    pub async fn register_handler_type<E, H>(&self) -> HandlerKey
    where
        E: EventData,
        H: EventHandler<E>,
    {
        let key = self.local.register_handler_type::<E, H>();
        self.sync_binding(EventKey::of::<E>()).await;
        key
    }

    /// Adds a registration by keys. Returns `false` if it already existed.
    pub async fn register_type(&self, event: EventKey, handler: HandlerKey) -> bool {
        let added = self.local.register_type(event, handler);
        self.sync_binding(event).await;
        added
    }

    /// Removes one registration of event type `E`. Returns `true` if it existed.
    pub async fn unregister<E: EventData>(&self, handler: &HandlerKey) -> bool {
        self.unregister_type(EventKey::of::<E>(), handler).await
    }

    /// Removes one registration by keys. Returns `true` if it existed.
    pub async fn unregister_type(&self, event: EventKey, handler: &HandlerKey) -> bool {
        let removed = self.local.unregister_type(event, handler);
        self.sync_binding(event).await;
        removed
    }

    /// Removes every registration of event type `E`; returns the removed keys.
    pub async fn unregister_all<E: EventData>(&self) -> Vec<HandlerKey> {
        let removed = self.local.unregister_all::<E>();
        self.sync_binding(EventKey::of::<E>()).await;
        removed
    }

    /// Publishes `event` to every instance bound for `E`.
    pub async fn trigger<E: EventData>(&self, event: &E) -> Result<(), BusError> {
        let body = codec::encode(event)?;
        self.publish(Message::new(E::NAME, body)).await
    }

    /// Publishes `event` for `handler` only.
    ///
    /// Consumers run that handler if it is registered for `E`, nothing otherwise.
    pub async fn trigger_for<E: EventData>(
        &self,
        handler: &HandlerKey,
        event: &E,
    ) -> Result<(), BusError> {
        let body = codec::encode(event)?;
        let message = Message::new(E::NAME, body).with_header(TARGET_HEADER, handler.as_str());
        self.publish(message).await
    }

    /// Runs [`trigger`](Self::trigger) on the worker pool.
    pub fn trigger_async<E: EventData>(&self, event: E) -> TriggerHandle {
        let bus = self.clone();
        TriggerHandle::spawn(async move { bus.trigger(&event).await })
    }

    /// Runs [`trigger_for`](Self::trigger_for) on the worker pool.
    pub fn trigger_async_for<E: EventData>(&self, handler: HandlerKey, event: E) -> TriggerHandle {
        let bus = self.clone();
        TriggerHandle::spawn(async move { bus.trigger_for(&handler, &event).await })
    }

    /// Stops the consumer task, deletes the private queue and moves the bus to
    /// [`ConnectionState::Disconnected`].
    ///
    /// Later triggers fail with [`TransportError::ChannelClosed`]. Idempotent.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let consumer = self.inner.consumer.lock().await.take();
        if let Some(handle) = consumer {
            if let Err(e) = handle.await {
                warn!(error = %e, "consumer task ended abnormally");
            }
            self.delete_queue().await;
            info!(queue = %self.inner.queue, "remote bus shut down");
        }
        self.inner.state.set(ConnectionState::Disconnected);
    }

    /// Removes the private queue so the exchange stops routing into it.
    async fn delete_queue(&self) {
        let queue = &self.inner.queue;
        let result: Result<(), TransportError> = async {
            let channel = ScopedChannel::open(self.inner.broker.as_ref()).await?;
            channel.delete_queue(queue).await
        }
        .await;

        self.inner.bound.lock().await.clear();
        match result {
            Ok(()) => debug!(queue = %queue, "queue deleted"),
            Err(error) => warn!(queue = %queue, error = %error, "failed to delete queue"),
        }
    }

    async fn publish(&self, message: Message) -> Result<(), BusError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(TransportError::ChannelClosed.into());
        }
        let routing_key = message.routing_key.clone();
        let active = self.inner.state.begin(ConnectionState::Publishing);

        match self.try_publish(message).await {
            Ok(()) => {
                if active {
                    self.inner.state.end(ConnectionState::Publishing);
                }
                trace!(routing_key = %routing_key, "event published");
                Ok(())
            }
            Err(error) => {
                warn!(routing_key = %routing_key, error = %error, "publish failed");
                self.inner.state.fault();
                Err(error.into())
            }
        }
    }

    async fn try_publish(&self, message: Message) -> Result<(), TransportError> {
        let exchange = &self.inner.cfg.exchange;
        let channel = ScopedChannel::open(self.inner.broker.as_ref()).await?;
        channel.declare_exchange(exchange).await?;
        channel.publish(exchange, message).await
    }

    /// Brings the queue binding of `event` in line with the registry.
    async fn sync_binding(&self, event: EventKey) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        let mut bound = self.inner.bound.lock().await;
        let wanted = self.local.registry().has_registration(event);
        if wanted == bound.contains(&event) {
            return;
        }

        let result: Result<(), TransportError> = async {
            let channel = ScopedChannel::open(self.inner.broker.as_ref()).await?;
            let (queue, exchange) = (&self.inner.queue, &self.inner.cfg.exchange);
            if wanted {
                channel.bind_queue(queue, exchange, event.name()).await
            } else {
                channel.unbind_queue(queue, exchange, event.name()).await
            }
        }
        .await;

        match result {
            Ok(()) if wanted => {
                bound.insert(event);
                debug!(event = event.name(), "queue bound");
            }
            Ok(()) => {
                bound.remove(&event);
                debug!(event = event.name(), "queue unbound");
            }
            Err(error) => {
                warn!(event = event.name(), error = %error, "binding update failed");
                self.inner.state.fault();
            }
        }
    }

    /// Declares the exchange and queue, binds every registered event type and
    /// starts consuming.
    async fn open_session(&self) -> Result<Session, TransportError> {
        let (queue, exchange) = (&self.inner.queue, &self.inner.cfg.exchange);
        let channel = ScopedChannel::open(self.inner.broker.as_ref()).await?;
        channel.declare_exchange(exchange).await?;
        channel.declare_queue(queue).await?;

        {
            let mut bound = self.inner.bound.lock().await;
            bound.clear();
            for event in self.local.registry().event_types() {
                channel.bind_queue(queue, exchange, event.name()).await?;
                bound.insert(event);
            }
            debug!(queue = %queue, bindings = bound.len(), "queue bound");
        }

        let deliveries = channel.consume(queue).await?;
        Ok(Session {
            _channel: channel,
            deliveries,
        })
    }

    async fn run_consumer(self, mut session: Session) {
        let mut state = self.inner.state.subscribe();
        loop {
            let wake = tokio::select! {
                _ = self.inner.shutdown.cancelled() => Wake::Shutdown,
                _ = wait_faulted(&mut state) => Wake::Faulted,
                next = session.deliveries.next() => Wake::Delivery(next),
            };

            match wake {
                Wake::Shutdown => break,
                Wake::Delivery(Some(Ok(message))) => self.deliver(message).await,
                Wake::Delivery(Some(Err(error))) => {
                    warn!(error = %error, "delivery failed");
                }
                Wake::Delivery(None) | Wake::Faulted => {
                    warn!(queue = %self.inner.queue, "connection lost");
                    self.inner.state.fault();
                    drop(session);
                    match self.reconnect().await {
                        Some(next) => session = next,
                        None => break,
                    }
                }
            }
        }
        debug!(queue = %self.inner.queue, "consumer stopped");
    }

    /// Dispatches one delivered message through the local fan-out.
    async fn deliver(&self, message: Message) {
        let Some(event) = self.local.registry().event_by_name(&message.routing_key) else {
            warn!(
                routing_key = %message.routing_key,
                "no handlers for routing key, message dropped"
            );
            return;
        };
        let payload = match event.decode(&message.body) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(
                    routing_key = %message.routing_key,
                    error = %error,
                    "undecodable message dropped"
                );
                return;
            }
        };
        let target = message
            .header(TARGET_HEADER)
            .map(|name| HandlerKey::named(name.to_string()));

        let active = self.inner.state.begin(ConnectionState::Consuming);
        if let Err(error) = self.local.dispatch(event, &*payload, target.as_ref()).await {
            warn!(
                routing_key = %message.routing_key,
                error = %error,
                "consumed event had failing handlers"
            );
        }
        if active {
            self.inner.state.end(ConnectionState::Consuming);
        }
    }

    async fn reconnect(&self) -> Option<Session> {
        let cfg = &self.inner.cfg;
        let mut attempt: u32 = 0;
        loop {
            if cfg.reconnect_limit().is_some_and(|limit| attempt >= limit) {
                error!(attempts = attempt, "reconnect attempts exhausted, bus stays faulted");
                return None;
            }
            let delay = cfg.reconnect.next(attempt);
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;

            self.inner.state.set(ConnectionState::Connecting);
            match self.open_session().await {
                Ok(session) => {
                    self.inner.state.set(ConnectionState::Ready);
                    info!(attempt, queue = %self.inner.queue, "remote bus reconnected");
                    return Some(session);
                }
                Err(error) => {
                    warn!(attempt, error = %error, "reconnect attempt failed");
                    self.inner.state.set(ConnectionState::Faulted);
                }
            }
        }
    }
}

async fn wait_faulted(state: &mut watch::Receiver<ConnectionState>) {
    if state
        .wait_for(|s| *s == ConnectionState::Faulted)
        .await
        .is_err()
    {
        std::future::pending::<()>().await;
    }
}

impl fmt::Debug for RemoteEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteEventBus")
            .field("exchange", &self.inner.cfg.exchange)
            .field("queue", &self.inner.queue)
            .field("state", &self.state())
            .finish()
    }
}

/// Builder for [`RemoteEventBus`].
pub struct RemoteEventBusBuilder {
    broker: Arc<dyn Broker>,
    cfg: BusConfig,
    local: LocalEventBusBuilder,
}

impl RemoteEventBusBuilder {
    /// Creates a builder with the default configuration.
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            cfg: BusConfig::default(),
            local: LocalEventBusBuilder::new(),
        }
    }

    /// Sets the configuration.
    pub fn with_config(mut self, cfg: BusConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets the resolver consulted for keys the bus container does not know.
    pub fn with_resolver(mut self, resolver: Arc<dyn HandlerResolver>) -> Self {
        self.local = self.local.with_resolver(resolver);
        self
    }

    /// Adds every registration found by `discovery`.
    pub fn with_discovery(mut self, discovery: &dyn Discovery) -> Self {
        self.local = self.local.with_discovery(discovery);
        self
    }

    /// Connects: declares the exchange and a private queue, binds every
    /// discovered event type and starts the consumer task.
    pub async fn connect(self) -> Result<RemoteEventBus, BusError> {
        let queue = self.cfg.queue_name();
        let bus = RemoteEventBus {
            local: self.local.build(),
            inner: Arc::new(Remote {
                broker: self.broker,
                cfg: self.cfg,
                queue,
                bound: Mutex::new(HashSet::new()),
                state: StateCell::new(),
                shutdown: CancellationToken::new(),
                consumer: Mutex::new(None),
            }),
        };

        bus.inner.state.set(ConnectionState::Connecting);
        let session = match bus.open_session().await {
            Ok(session) => session,
            Err(error) => {
                warn!(error = %error, "remote bus failed to connect");
                bus.inner.state.set(ConnectionState::Faulted);
                return Err(error.into());
            }
        };
        bus.inner.state.set(ConnectionState::Ready);
        info!(
            exchange = %bus.inner.cfg.exchange,
            queue = %bus.inner.queue,
            "remote bus connected"
        );

        let consumer = tokio::spawn(bus.clone().run_consumer(session));
        *bus.inner.consumer.lock().await = Some(consumer);
        Ok(bus)
    }
}
