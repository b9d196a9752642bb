//! # Local event bus.
//!
//! [`LocalEventBus`] ties a [`HandlerRegistry`] to a [`Container`] and runs the
//! fan-out of a trigger on the caller's task.
//!
//! ```text
//! trigger(&event)
//!   └─► registry.handlers(EventKey::of::<E>())        (ordered snapshot)
//!         for each handler key, in order:
//!           container.resolve(key) ──► HandlerRef
//!           handle_dyn(&event).catch_unwind().await   (one at a time)
//!           error / panic ──► collected, siblings keep running
//!   └─► Ok(()) or BusError::Dispatch(DispatchError { every failure })
//! ```
//!
//! ## Rules
//! - Within one trigger, handlers run strictly in registration order.
//! - A trigger with no registrations is a successful no-op.
//! - Handler failures are isolated; the aggregate is reported once, after the fan-out.
//! - Triggers never serialize against each other: concurrent triggers of the same
//!   event type may interleave.
//! - Instances registered with [`LocalEventBus::register`] live in the bus container
//!   under [`HandlerKey::of::<H>`]; registering another instance of `H` for the same
//!   event type replaces the earlier one.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use relaybus::{EventRecord, LocalEventBus};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = LocalEventBus::new();
//! let hits = Arc::new(AtomicUsize::new(0));
//!
//! let h = hits.clone();
//! bus.register_fn(move |_: &EventRecord| {
//!     h.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! bus.trigger(&EventRecord::new()).await.unwrap();
//! assert_eq!(hits.load(Ordering::SeqCst), 1);
//! # }
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, trace, warn};

use crate::error::{BusError, DispatchError, HandlerError, HandlerFailure, ResolutionError};
use crate::events::{EventData, EventKey};
use crate::handlers::{EventHandler, FnHandler, HandlerKey, HandlerOutput};
use crate::local::TriggerHandle;
use crate::registry::{HandlerRegistry, Registration};
use crate::resolve::{Container, Discovery, HandlerResolver};

/// In-process event bus.
///
/// Cheap to clone; clones share the registry and the container.
#[derive(Clone, Debug, Default)]
pub struct LocalEventBus {
    registry: Arc<HandlerRegistry>,
    container: Arc<Container>,
}

impl LocalEventBus {
    /// Creates a bus with an empty registry and container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts building a bus with a fallback resolver and discovered registrations.
    pub fn builder() -> LocalEventBusBuilder {
        LocalEventBusBuilder::new()
    }

    /// Registry backing this bus.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Container resolving handler keys for this bus.
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// Registers a handler instance for event type `E`.
    ///
    /// Returns the key the handler is registered under.
    pub fn register<E, H>(&self, handler: H) -> HandlerKey
    where
        E: EventData,
        H: EventHandler<E>,
    {
        self.register_shared::<E, H>(Arc::new(handler))
    }

    /// Registers a shared handler instance for event type `E`.
    ///
    /// The same `Arc` may be registered for several event types.
    pub fn register_shared<E, H>(&self, handler: Arc<H>) -> HandlerKey
    where
        E: EventData,
        H: EventHandler<E>,
    {
        let key = HandlerKey::of::<H>();
        self.container.insert_instance::<E, H>(key.clone(), handler);
        self.register_type(EventKey::of::<E>(), key.clone());
        key
    }

    /// Registers a closure for event type `E`.
    ///
    /// Every call creates a distinct registration with a fresh key.
    pub fn register_fn<E, F, R>(&self, f: F) -> HandlerKey
    where
        E: EventData,
        F: Fn(&E) -> R + Send + Sync + 'static,
        R: HandlerOutput,
    {
        let key = HandlerKey::closure(E::NAME);
        self.container
            .insert_instance::<E, _>(key.clone(), Arc::new(FnHandler::<E, F>::new(f)));
        self.register_type(EventKey::of::<E>(), key.clone());
        key
    }

    /// Registers handler type `H` for event type `E` by key.
    ///
    /// The instance is resolved at every dispatch, so `H` must be installed in the
    /// container (or known to the fallback resolver) by then.
    pub fn register_handler_type<E, H>(&self) -> HandlerKey
    where
        E: EventData,
        H: EventHandler<E>,
    {
        let key = HandlerKey::of::<H>();
        self.register_type(EventKey::of::<E>(), key.clone());
        key
    }

    /// Adds a registration by keys. Returns `false` if it already existed.
    pub fn register_type(&self, event: EventKey, handler: HandlerKey) -> bool {
        let added = self.registry.add(event, handler.clone());
        if added {
            debug!(event = event.name(), handler = %handler, "handler registered");
        }
        added
    }

    /// Removes one registration of event type `E`. Returns `true` if it existed.
    pub fn unregister<E: EventData>(&self, handler: &HandlerKey) -> bool {
        self.unregister_type(EventKey::of::<E>(), handler)
    }

    /// Removes one registration by keys. Returns `true` if it existed.
    pub fn unregister_type(&self, event: EventKey, handler: &HandlerKey) -> bool {
        let removed = self.registry.remove(event, handler);
        if removed {
            self.forget_closure(event, handler);
            debug!(event = event.name(), handler = %handler, "handler unregistered");
        }
        removed
    }

    /// Removes every registration of event type `E`; returns the removed keys.
    pub fn unregister_all<E: EventData>(&self) -> Vec<HandlerKey> {
        let event = EventKey::of::<E>();
        let removed = self.registry.remove_all(event);
        for handler in &removed {
            self.forget_closure(event, handler);
        }
        debug!(event = event.name(), count = removed.len(), "handlers unregistered");
        removed
    }

    /// True if at least one handler is registered for `E`.
    pub fn has_registration<E: EventData>(&self) -> bool {
        self.registry.has_registration(EventKey::of::<E>())
    }

    /// Dispatches `event` to every handler registered for `E`, in order.
    pub async fn trigger<E: EventData>(&self, event: &E) -> Result<(), BusError> {
        self.dispatch(EventKey::of::<E>(), event, None).await?;
        Ok(())
    }

    /// Dispatches `event` to `handler` only, if it is registered for `E`.
    pub async fn trigger_for<E: EventData>(
        &self,
        handler: &HandlerKey,
        event: &E,
    ) -> Result<(), BusError> {
        self.dispatch(EventKey::of::<E>(), event, Some(handler)).await?;
        Ok(())
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

    /// Fan-out over a type-erased payload of category `event`.
    ///
    /// With `target`, only that handler runs (and only if registered).
    pub(crate) async fn dispatch(
        &self,
        event: EventKey,
        payload: &(dyn Any + Send + Sync),
        target: Option<&HandlerKey>,
    ) -> Result<(), DispatchError> {
        let handlers = self.registry.handlers(event);
        if handlers.is_empty() {
            trace!(event = event.name(), "no handlers registered");
            return Ok(());
        }

        let mut failures = Vec::new();
        for handler in handlers {
            if target.is_some_and(|t| *t != handler) {
                continue;
            }
            trace!(event = event.name(), handler = %handler, "dispatching");
            if let Err(error) = self.invoke(&handler, payload).await {
                if self.unregistered_meanwhile(event, &handler, &error) {
                    trace!(
                        event = event.name(),
                        handler = %handler,
                        "handler unregistered during fan-out"
                    );
                    continue;
                }
                warn!(
                    event = event.name(),
                    handler = %handler,
                    error = %error,
                    label = error.as_label(),
                    "handler failed"
                );
                failures.push(HandlerFailure { handler, error });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DispatchError {
                event: event.name(),
                failures,
            })
        }
    }

    async fn invoke(
        &self,
        handler: &HandlerKey,
        payload: &(dyn Any + Send + Sync),
    ) -> Result<(), HandlerError> {
        let instance = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.container.resolve(handler)
        }))
        .map_err(|panic| HandlerError::Panicked {
            info: panic_message(panic.as_ref()),
        })??;

        match AssertUnwindSafe(instance.handle_dyn(payload))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(HandlerError::Panicked {
                info: panic_message(panic.as_ref()),
            }),
        }
    }

    /// True if `handler` could not be resolved because it was unregistered after
    /// the fan-out took its snapshot.
    fn unregistered_meanwhile(
        &self,
        event: EventKey,
        handler: &HandlerKey,
        error: &HandlerError,
    ) -> bool {
        matches!(
            error,
            HandlerError::Resolution(ResolutionError::NotRegistered { .. })
        ) && !self.registry.contains(event, handler)
    }

    fn forget_closure(&self, event: EventKey, handler: &HandlerKey) {
        if handler.is_closure() {
            self.container.remove_route(handler, event);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Builder for [`LocalEventBus`].
#[derive(Default)]
pub struct LocalEventBusBuilder {
    resolver: Option<Arc<dyn HandlerResolver>>,
    registrations: Vec<Registration>,
}

impl LocalEventBusBuilder {
    /// Creates a builder with no fallback resolver and no registrations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the resolver consulted for keys the bus container does not know.
    pub fn with_resolver(mut self, resolver: Arc<dyn HandlerResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Adds every registration found by `discovery`.
    ///
    /// Discovery runs once, here; later changes to the source are not observed.
    pub fn with_discovery(mut self, discovery: &dyn Discovery) -> Self {
        self.registrations.extend(discovery.discover());
        self
    }

    /// Builds the bus and applies the discovered registrations.
    pub fn build(self) -> LocalEventBus {
        let container = match self.resolver {
            Some(fallback) => Container::with_fallback(fallback),
            None => Container::new(),
        };
        let bus = LocalEventBus {
            registry: Arc::new(HandlerRegistry::new()),
            container: Arc::new(container),
        };
        let added = bus.registry.extend(self.registrations);
        debug!(registrations = added, "local bus built");
        bus
    }
}
