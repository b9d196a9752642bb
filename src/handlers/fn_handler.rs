//! # Closure-backed handler (`FnHandler`)
//!
//! [`FnHandler`] wraps a closure `F: Fn(&E) -> R` so closures dispatch exactly like
//! type-based handlers. `R` is either `()` or `Result<(), HandlerError>`
//! (see [`HandlerOutput`]).
//!
//! ## Semantics
//! - The closure runs synchronously inside the handler call; it must not block.
//! - State shared with the caller goes through `Arc<...>` captured by the closure.
//! - Every registration of a closure gets its own key; closures are never deduplicated.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use relaybus::{EventRecord, FnHandler};
//!
//! let hits = Arc::new(AtomicUsize::new(0));
//! let h = hits.clone();
//! let handler = FnHandler::<EventRecord, _>::new(move |_ev: &EventRecord| {
//!     h.fetch_add(1, Ordering::SeqCst);
//! });
//! # let _ = handler;
//! ```

use std::marker::PhantomData;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::events::EventData;
use crate::handlers::EventHandler;

/// Values a handler closure may return.
pub trait HandlerOutput {
    /// Converts into the handler result.
    fn into_handler_result(self) -> Result<(), HandlerError>;
}

impl HandlerOutput for () {
    fn into_handler_result(self) -> Result<(), HandlerError> {
        Ok(())
    }
}

impl HandlerOutput for Result<(), HandlerError> {
    fn into_handler_result(self) -> Result<(), HandlerError> {
        self
    }
}

/// Closure-backed handler implementation.
pub struct FnHandler<E, F> {
    f: F,
    _event: PhantomData<fn(E)>,
}

impl<E, F> FnHandler<E, F> {
    /// Wraps a closure.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _event: PhantomData,
        }
    }
}

#[async_trait]
impl<E, F, R> EventHandler<E> for FnHandler<E, F>
where
    E: EventData,
    F: Fn(&E) -> R + Send + Sync + 'static,
    R: HandlerOutput,
{
    async fn handle_event(&self, event: &E) -> Result<(), HandlerError> {
        (self.f)(event).into_handler_result()
    }
}
