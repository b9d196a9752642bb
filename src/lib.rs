//! # relaybus
//!
//! **Relaybus** dispatches typed events to registered handlers, either inside the
//! process or relayed through a message broker so several processes take part.
//!
//! Both buses share one registration and dispatch contract: handlers are recorded
//! per event type, resolved into instances at dispatch, and run in registration
//! order with every failure isolated and reported once.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   register / register_fn / register_type          Discovery (startup)
//!                 │                                        │
//!                 ▼                                        ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  HandlerRegistry                                                  │
//! │  EventKey ──► [HandlerKey, HandlerKey, ...]   (ordered, unique)   │
//! │  name     ──► EventKey                        (routing key index) │
//! └───────────────────────────────┬───────────────────────────────────┘
//!                                 │ handlers(event)
//!                                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  LocalEventBus fan-out                                            │
//! │  for each key: Container::resolve(key) ──► HandlerRef             │
//! │                handle_dyn(&event)  (panic / error ──► collected)  │
//! └───────────────────────────────▲───────────────────────────────────┘
//!                                 │ same fan-out for consumed events
//! ┌───────────────────────────────┴───────────────────────────────────┐
//! │  RemoteEventBus                                                   │
//! │  trigger ──► JSON ──► Broker exchange (routing key = E::NAME)     │
//! │  consumer task ◄── private queue ◄── bindings for registered types│
//! │  ConnectionState: Disconnected ► Connecting ► Ready ⇄ Faulted     │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Dispatch
//! ```text
//! trigger(&event)
//!   ├─► handlers = registry.handlers(EventKey::of::<E>())
//!   │     └─ empty ──► Ok(())
//!   ├─► for handler in handlers (in order, one at a time):
//!   │     ├─ resolve ──► Err ──► HandlerFailure { ResolutionError }
//!   │     ├─ handle  ──► Err ──► HandlerFailure { Failed }
//!   │     └─ panic   ──────────► HandlerFailure { Panicked }
//!   └─► failures empty ? Ok(()) : Err(BusError::Dispatch(DispatchError))
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                                |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------------|
//! | **Events**        | Payload base fields, stable names, event-type keys.          | [`EventRecord`], [`EventData`], [`EventKey`]      |
//! | **Handlers**      | Typed handlers, closures, handler keys.                      | [`EventHandler`], [`FnHandler`], [`HandlerKey`]   |
//! | **Registry**      | Event type to ordered handler set.                           | [`HandlerRegistry`], [`Registration`]             |
//! | **Resolution**    | Instances, singleton and transient factories, discovery.     | [`Container`], [`HandlerResolver`], [`Discovery`] |
//! | **Local bus**     | In-process dispatch, offloaded triggers.                     | [`LocalEventBus`], [`TriggerHandle`]              |
//! | **Remote bus**    | Broker-relayed dispatch, reconnection, connection state.     | [`RemoteEventBus`], [`Broker`], [`MemoryBroker`]  |
//! | **AMQP**          | RabbitMQ transport (feature `amqp`).                         | `AmqpBroker`                                      |
//! | **Errors**        | Typed errors with stable labels.                             | [`BusError`], [`DispatchError`], [`HandlerError`] |
//! | **Configuration** | Exchange, queue prefix, reconnect policy.                    | [`BusConfig`], [`ReconnectPolicy`]                |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use async_trait::async_trait;
//! use serde::{Deserialize, Serialize};
//! use relaybus::{EventData, EventHandler, EventRecord, HandlerError, LocalEventBus};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct OrderPlaced {
//!     #[serde(flatten)]
//!     record: EventRecord,
//!     order_id: u64,
//! }
//!
//! impl EventData for OrderPlaced {
//!     const NAME: &'static str = "OrderPlaced";
//!     fn record(&self) -> &EventRecord { &self.record }
//! }
//!
//! struct LastOrder(Arc<AtomicU64>);
//!
//! #[async_trait]
//! impl EventHandler<OrderPlaced> for LastOrder {
//!     async fn handle_event(&self, ev: &OrderPlaced) -> Result<(), HandlerError> {
//!         self.0.store(ev.order_id, Ordering::SeqCst);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), relaybus::BusError> {
//!     let last = Arc::new(AtomicU64::new(0));
//!     let bus = LocalEventBus::new();
//!     bus.register::<OrderPlaced, _>(LastOrder(last.clone()));
//!
//!     let ev = OrderPlaced { record: EventRecord::from_source("checkout"), order_id: 42 };
//!     bus.trigger(&ev).await?;
//!
//!     assert_eq!(last.load(Ordering::SeqCst), 42);
//!     Ok(())
//! }
//! ```
pub mod codec;
mod config;
mod error;
mod events;
mod handlers;
mod local;
mod policies;
mod registry;
mod remote;
mod resolve;

// ---- Public re-exports ----

pub use config::BusConfig;
pub use error::{
    BusError, CodecError, DispatchError, HandlerError, HandlerFailure, ResolutionError,
    TransportError,
};
pub use events::{ErasedEvent, EventData, EventKey, EventRecord};
pub use handlers::{
    erase, DynHandler, EventHandler, FnHandler, HandlerKey, HandlerOutput, HandlerRef,
};
pub use local::{LocalEventBus, LocalEventBusBuilder, TriggerHandle};
pub use policies::{JitterPolicy, ReconnectPolicy};
pub use registry::{HandlerRegistry, Registration};
pub use remote::{
    Broker, Channel, ConnectionState, Deliveries, MemoryBroker, Message, RemoteEventBus,
    RemoteEventBusBuilder, ScopedChannel, TARGET_HEADER,
};
pub use resolve::{Container, Discovery, HandlerResolver, Lifetime, StaticDiscovery};

// Optional: RabbitMQ transport for buses in separate processes.
// Enable with: `--features amqp`
#[cfg(feature = "amqp")]
pub use remote::AmqpBroker;
