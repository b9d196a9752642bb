//! # Handler contract.
//!
//! [`EventHandler<E>`] is what user code implements; [`DynHandler`] is the
//! type-erased form the buses dispatch to. [`erase`] bridges the two.
//!
//! ```text
//! EventHandler<E> ──erase──► Typed<E, H> : DynHandler ──► HandlerRef (Arc<dyn DynHandler>)
//!                                 │
//!                                 └─ downcast payload to E, then handle_event(&E)
//! ```
//!
//! ## Rules
//! - Handlers receive the event by shared reference and must not assume exclusive access.
//! - Return [`HandlerError`] for failures; panics are caught by the bus and reported
//!   as [`HandlerError::Panicked`].
//! - The remote bus delivers at least once; handlers should tolerate repeats.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use serde::{Deserialize, Serialize};
//! use relaybus::{EventData, EventHandler, EventRecord, HandlerError};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Shipped { #[serde(flatten)] record: EventRecord, parcel: String }
//!
//! impl EventData for Shipped {
//!     const NAME: &'static str = "Shipped";
//!     fn record(&self) -> &EventRecord { &self.record }
//! }
//!
//! struct Notify;
//!
//! #[async_trait]
//! impl EventHandler<Shipped> for Notify {
//!     async fn handle_event(&self, ev: &Shipped) -> Result<(), HandlerError> {
//!         if ev.parcel.is_empty() {
//!             return Err(HandlerError::fail("empty parcel id"));
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::events::EventData;

/// Handler for one event category.
#[async_trait]
pub trait EventHandler<E: EventData>: Send + Sync + 'static {
    /// Handles one event.
    ///
    /// Called on the dispatching task; a slow handler delays the handlers
    /// registered after it for the same trigger.
    async fn handle_event(&self, event: &E) -> Result<(), HandlerError>;
}

/// Type-erased handler instance, as produced by a resolver.
#[async_trait]
pub trait DynHandler: Send + Sync + 'static {
    /// Handles a payload whose concrete type the implementation checks itself.
    ///
    /// Returns [`HandlerError::EventMismatch`] for payloads it does not accept.
    async fn handle_dyn(&self, event: &(dyn Any + Send + Sync)) -> Result<(), HandlerError>;
}

/// Shared handle to a resolved handler instance.
pub type HandlerRef = Arc<dyn DynHandler>;

/// Adapter from [`EventHandler<E>`] to [`DynHandler`].
struct Typed<E, H> {
    inner: Arc<H>,
    _event: PhantomData<fn(E)>,
}

impl<E, H> Typed<E, H> {
    fn new(inner: Arc<H>) -> Self {
        Self {
            inner,
            _event: PhantomData,
        }
    }
}

#[async_trait]
impl<E, H> DynHandler for Typed<E, H>
where
    E: EventData,
    H: EventHandler<E>,
{
    async fn handle_dyn(&self, event: &(dyn Any + Send + Sync)) -> Result<(), HandlerError> {
        match event.downcast_ref::<E>() {
            Some(ev) => self.inner.handle_event(ev).await,
            None => Err(HandlerError::EventMismatch {
                handler: std::any::type_name::<H>().to_string(),
            }),
        }
    }
}

/// Erases a shared typed handler into a [`HandlerRef`] for event type `E`.
///
/// The same `Arc<H>` may be erased once per event type it handles.
pub fn erase<E, H>(handler: Arc<H>) -> HandlerRef
where
    E: EventData,
    H: EventHandler<E>,
{
    Arc::new(Typed::<E, H>::new(handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventRecord;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Count(AtomicU32);

    #[async_trait]
    impl EventHandler<EventRecord> for Count {
        async fn handle_event(&self, _: &EventRecord) -> Result<(), HandlerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn erased_handler_downcasts_payload() {
        let count = Arc::new(Count::default());
        let erased = erase::<EventRecord, _>(count.clone());

        erased.handle_dyn(&EventRecord::new()).await.unwrap();
        assert_eq!(count.0.load(Ordering::SeqCst), 1);

        let err = erased.handle_dyn(&42u32).await.unwrap_err();
        assert_eq!(err.as_label(), "handler_event_mismatch");
        assert_eq!(count.0.load(Ordering::SeqCst), 1);
    }
}
