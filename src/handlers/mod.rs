//! # Handlers and handler keys.
//!
//! - [`EventHandler`] trait for type-based handlers
//! - [`FnHandler`] closure adapter with the same contract
//! - [`DynHandler`] / [`HandlerRef`] type-erased instances handed out by resolvers
//! - [`HandlerKey`] stable identifier of a handler implementation

mod fn_handler;
mod handler;
mod key;

pub use fn_handler::{FnHandler, HandlerOutput};
pub use handler::{erase, DynHandler, EventHandler, HandlerRef};
pub use key::HandlerKey;
