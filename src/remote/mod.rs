//! # Event bus over a message broker.
//!
//! - [`RemoteEventBus`] publishes events to a broker and dispatches the ones it
//!   consumes back through a local registry
//! - [`Broker`] / [`Channel`] / [`ScopedChannel`] transport contract
//! - [`MemoryBroker`] in-process broker
//! - `AmqpBroker` RabbitMQ broker (feature `amqp`)
//! - [`ConnectionState`] observable connection state

#[cfg(feature = "amqp")]
mod amqp;
mod broker;
mod bus;
mod memory;
mod state;

#[cfg(feature = "amqp")]
pub use amqp::AmqpBroker;
pub use broker::{Broker, Channel, Deliveries, Message, ScopedChannel};
pub use bus::{RemoteEventBus, RemoteEventBusBuilder, TARGET_HEADER};
pub use memory::MemoryBroker;
pub use state::ConnectionState;
