//! # Handler registry: which handler types are interested in which event types.
//!
//! ```text
//! EventKey("OrderPlaced") ──► [Audit, Mailer, fn#3:OrderPlaced]   (insertion order, no duplicates)
//! EventKey("Shipped")     ──► [Notify]
//!
//! names: "OrderPlaced" ──► EventKey, "Shipped" ──► EventKey    (routing key lookup)
//! ```
//!
//! ## Rules
//! - Adding an existing pair is a no-op.
//! - An event type whose last handler is removed is pruned, so
//!   [`HandlerRegistry::has_registration`] is exact.
//! - Every mutation runs under the entry lock of its event type; readers see either
//!   the old or the new handler list, never a partial one.
//! - The map is sharded: work on one event type does not block reads of an
//!   unrelated one (unless both hash to the same shard).
//! - Pruning an event type also drops its name, so name lookups only answer for
//!   types that currently have a registration.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::events::{EventData, EventKey};
use crate::handlers::HandlerKey;

/// One (event type, handler type) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Event type.
    pub event: EventKey,
    /// Handler type.
    pub handler: HandlerKey,
}

impl Registration {
    /// Creates a registration.
    pub fn new(event: EventKey, handler: HandlerKey) -> Self {
        Self { event, handler }
    }

    /// Registration of handler type `H` for event type `E`.
    pub fn of<E: EventData, H: 'static>() -> Self {
        Self::new(EventKey::of::<E>(), HandlerKey::of::<H>())
    }
}

/// Thread-safe mapping from event type to an ordered set of handler types.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: DashMap<EventKey, Vec<HandlerKey>>,
    names: DashMap<&'static str, EventKey>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a registration. Returns `false` if the pair already existed.
    pub fn add(&self, event: EventKey, handler: HandlerKey) -> bool {
        let inserted = {
            let mut handlers = self.handlers.entry(event).or_default();
            if handlers.contains(&handler) {
                false
            } else {
                handlers.push(handler);
                true
            }
        };
        self.names.insert(event.name(), event);
        inserted
    }

    /// Adds every registration from `registrations`; returns how many were new.
    pub fn extend(&self, registrations: impl IntoIterator<Item = Registration>) -> usize {
        registrations
            .into_iter()
            .filter(|r| self.add(r.event, r.handler.clone()))
            .count()
    }

    /// Removes one registration, pruning the event type if it was the last one.
    ///
    /// Returns `true` if the pair existed.
    pub fn remove(&self, event: EventKey, handler: &HandlerKey) -> bool {
        match self.handlers.entry(event) {
            Entry::Occupied(mut entry) => {
                let before = entry.get().len();
                entry.get_mut().retain(|h| h != handler);
                let removed = entry.get().len() != before;
                let emptied = entry.get().is_empty();
                if emptied {
                    entry.remove();
                    self.forget_name(event);
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Removes every registration of an event type; returns the removed handlers.
    pub fn remove_all(&self, event: EventKey) -> Vec<HandlerKey> {
        let removed = self
            .handlers
            .remove(&event)
            .map(|(_, handlers)| handlers)
            .unwrap_or_default();
        self.forget_name(event);
        removed
    }

    /// Drops the name of a pruned event type unless it was registered again.
    fn forget_name(&self, event: EventKey) {
        self.names.remove_if(event.name(), |_, key| {
            *key == event && !self.handlers.contains_key(&event)
        });
    }

    /// True if at least one handler is registered for `event`.
    pub fn has_registration(&self, event: EventKey) -> bool {
        self.handlers.contains_key(&event)
    }

    /// True if exactly this pair is registered.
    pub fn contains(&self, event: EventKey, handler: &HandlerKey) -> bool {
        self.handlers
            .get(&event)
            .is_some_and(|handlers| handlers.contains(handler))
    }

    /// Snapshot of the handlers for `event`, in registration order.
    ///
    /// Empty when nothing is registered.
    pub fn handlers(&self, event: EventKey) -> Vec<HandlerKey> {
        self.handlers
            .get(&event)
            .map(|handlers| handlers.value().clone())
            .unwrap_or_default()
    }

    /// Event type with this stable name, if it currently has a registration.
    pub fn event_by_name(&self, name: &str) -> Option<EventKey> {
        let key = *self.names.get(name)?.value();
        self.has_registration(key).then_some(key)
    }

    /// Event types that currently have at least one registration.
    pub fn event_types(&self) -> Vec<EventKey> {
        self.handlers.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of event types with registrations.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Removes every registration.
    pub fn clear(&self) {
        self.handlers.clear();
        self.names.clear();
    }
}
