//! # Built-in resolver.
//!
//! [`Container`] maps handler keys to providers. A provider is a fixed instance,
//! a lazily built singleton, or a transient factory called on every resolution.
//!
//! ```text
//! HandlerKey ──► routes: { TypeId(OrderPlaced) ──► Provider,
//!                          TypeId(Shipped)     ──► Provider }
//! ```
//!
//! One handler type may serve several event types under the same key; each event
//! type gets its own route and the payload type picks the route at dispatch.
//! Keys the container does not know are passed to the optional fallback resolver.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{HandlerError, ResolutionError};
use crate::events::{EventData, EventKey};
use crate::handlers::{erase, DynHandler, EventHandler, HandlerKey, HandlerRef};
use crate::resolve::HandlerResolver;

/// How long a factory-built instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifetime {
    /// Built on first resolution, then reused.
    Singleton,
    /// Built on every resolution.
    #[default]
    Transient,
}

type Factory = Arc<dyn Fn() -> Result<HandlerRef, String> + Send + Sync>;

#[derive(Clone)]
enum Provider {
    Instance(HandlerRef),
    Singleton {
        factory: Factory,
        cell: Arc<OnceLock<HandlerRef>>,
    },
    Transient(Factory),
}

impl Provider {
    fn from_factory(lifetime: Lifetime, factory: Factory) -> Self {
        match lifetime {
            Lifetime::Singleton => Provider::Singleton {
                factory,
                cell: Arc::new(OnceLock::new()),
            },
            Lifetime::Transient => Provider::Transient(factory),
        }
    }

    fn get(&self, key: &HandlerKey) -> Result<HandlerRef, ResolutionError> {
        let construction = |reason| ResolutionError::Construction {
            handler: key.clone(),
            reason,
        };
        match self {
            Provider::Instance(handler) => Ok(handler.clone()),
            Provider::Singleton { factory, cell } => {
                if let Some(handler) = cell.get() {
                    return Ok(handler.clone());
                }
                let built = factory().map_err(construction)?;
                // A concurrent first resolution may have won; keep whichever landed.
                Ok(cell.get_or_init(|| built).clone())
            }
            Provider::Transient(factory) => factory().map_err(construction),
        }
    }
}

type Routes = Arc<HashMap<TypeId, Provider>>;

/// Routes of one key with more than one event type; picks a route per payload.
struct Routed {
    key: HandlerKey,
    routes: Routes,
}

#[async_trait]
impl DynHandler for Routed {
    async fn handle_dyn(&self, event: &(dyn Any + Send + Sync)) -> Result<(), HandlerError> {
        let provider =
            self.routes
                .get(&event.type_id())
                .ok_or_else(|| HandlerError::EventMismatch {
                    handler: self.key.to_string(),
                })?;
        let instance = provider.get(&self.key)?;
        instance.handle_dyn(event).await
    }
}

/// Handler container: instances, singleton and transient factories.
#[derive(Default)]
pub struct Container {
    routes: DashMap<HandlerKey, Routes>,
    fallback: Option<Arc<dyn HandlerResolver>>,
}

impl Container {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty container that defers unknown keys to `fallback`.
    pub fn with_fallback(fallback: Arc<dyn HandlerResolver>) -> Self {
        Self {
            routes: DashMap::new(),
            fallback: Some(fallback),
        }
    }

    /// Stores a fixed instance under `key` for event type `E`.
    ///
    /// Replaces an earlier provider for the same key and event type.
    pub fn insert_instance<E, H>(&self, key: HandlerKey, handler: Arc<H>)
    where
        E: EventData,
        H: EventHandler<E>,
    {
        self.insert_route(key, EventKey::of::<E>(), Provider::Instance(erase::<E, H>(handler)));
    }

    /// Installs handler type `H` for event type `E`, built with `Default`.
    ///
    /// Returns the key the handler is installed under ([`HandlerKey::of::<H>`]).
    pub fn install<E, H>(&self, lifetime: Lifetime) -> HandlerKey
    where
        E: EventData,
        H: EventHandler<E> + Default,
    {
        self.install_with::<E, H, _, std::convert::Infallible>(lifetime, || Ok(H::default()))
    }

    /// Installs handler type `H` for event type `E`, built by `factory`.
    ///
    /// A factory error becomes [`ResolutionError::Construction`] at resolution time.
    pub fn install_with<E, H, F, Err>(&self, lifetime: Lifetime, factory: F) -> HandlerKey
    where
        E: EventData,
        H: EventHandler<E>,
        F: Fn() -> Result<H, Err> + Send + Sync + 'static,
        Err: fmt::Display,
    {
        let key = HandlerKey::of::<H>();
        let erased: Factory = Arc::new(move || {
            factory()
                .map(|handler| erase::<E, H>(Arc::new(handler)))
                .map_err(|e| e.to_string())
        });
        self.insert_route(
            key.clone(),
            EventKey::of::<E>(),
            Provider::from_factory(lifetime, erased),
        );
        key
    }

    /// True if the container itself has a provider for `key`.
    pub fn contains(&self, key: &HandlerKey) -> bool {
        self.routes.contains_key(key)
    }

    /// Drops every provider of `key`. Returns `true` if there was one.
    pub fn remove(&self, key: &HandlerKey) -> bool {
        self.routes.remove(key).is_some()
    }

    /// Drops the provider of `key` for one event type.
    pub fn remove_route(&self, key: &HandlerKey, event: EventKey) -> bool {
        match self.routes.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if !entry.get().contains_key(&event.type_id()) {
                    return false;
                }
                let mut next = HashMap::clone(entry.get());
                next.remove(&event.type_id());
                if next.is_empty() {
                    entry.remove();
                } else {
                    entry.insert(Arc::new(next));
                }
                true
            }
            Entry::Vacant(_) => false,
        }
    }

    fn insert_route(&self, key: HandlerKey, event: EventKey, provider: Provider) {
        match self.routes.entry(key) {
            Entry::Occupied(mut entry) => {
                let mut next = HashMap::clone(entry.get());
                next.insert(event.type_id(), provider);
                entry.insert(Arc::new(next));
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(HashMap::from([(event.type_id(), provider)])));
            }
        }
    }
}

impl HandlerResolver for Container {
    fn resolve(&self, key: &HandlerKey) -> Result<HandlerRef, ResolutionError> {
        let routes = self.routes.get(key).map(|r| Arc::clone(r.value()));
        match routes {
            Some(routes) if routes.len() == 1 => match routes.values().next() {
                Some(provider) => provider.get(key),
                None => Err(ResolutionError::NotRegistered {
                    handler: key.clone(),
                }),
            },
            Some(routes) => Ok(Arc::new(Routed {
                key: key.clone(),
                routes,
            })),
            None => match &self.fallback {
                Some(fallback) => fallback.resolve(key),
                None => Err(ResolutionError::NotRegistered {
                    handler: key.clone(),
                }),
            },
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("keys", &self.routes.len())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
