//! # Handler resolution.
//!
//! - [`HandlerResolver`] turns a [`HandlerKey`](crate::HandlerKey) into an instance
//! - [`Container`] built-in resolver with instance, singleton and transient providers
//! - [`Discovery`] / [`StaticDiscovery`] registrations applied at bus construction

mod container;
mod discovery;
mod resolver;

pub use container::{Container, Lifetime};
pub use discovery::{Discovery, StaticDiscovery};
pub use resolver::HandlerResolver;
