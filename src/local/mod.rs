//! # In-process event bus.
//!
//! - [`LocalEventBus`] registry + resolver, dispatching on the caller's task
//! - [`LocalEventBusBuilder`] seeds the bus from a resolver and a discovery source
//! - [`TriggerHandle`] completion of a trigger offloaded to the worker pool

mod bus;
mod handle;

pub use bus::{LocalEventBus, LocalEventBusBuilder};
pub use handle::TriggerHandle;
