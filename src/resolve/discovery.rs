//! # Startup discovery of handler registrations.
//!
//! A [`Discovery`] enumerates the (event type, handler type) pairs that should be
//! registered when a bus is built. It replaces scanning loaded code for handler
//! types: the pairs are listed explicitly, usually next to where the handlers are
//! installed into the [`Container`](crate::resolve::Container).
//!
//! ```text
//! StaticDiscovery::new()
//!     .handler::<OrderPlaced, Audit>()     ──► Registration(OrderPlaced, Audit)
//!     .handler::<Shipped, Audit>()         ──► Registration(Shipped, Audit)
//!     .named::<Shipped>("mailer")          ──► Registration(Shipped, "mailer")
//! ```

use crate::events::{EventData, EventKey};
use crate::handlers::{EventHandler, HandlerKey};
use crate::registry::Registration;

/// Source of registrations applied when a bus is built.
pub trait Discovery: Send + Sync {
    /// Every registration this source knows about.
    fn discover(&self) -> Vec<Registration>;
}

impl Discovery for Vec<Registration> {
    fn discover(&self) -> Vec<Registration> {
        self.clone()
    }
}

/// Explicit, build-time list of registrations.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    registrations: Vec<Registration>,
}

impl StaticDiscovery {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds handler type `H` for event type `E`.
    pub fn handler<E, H>(mut self) -> Self
    where
        E: EventData,
        H: EventHandler<E>,
    {
        self.registrations.push(Registration::of::<E, H>());
        self
    }

    /// Adds an explicitly named handler for event type `E`.
    pub fn named<E: EventData>(mut self, handler: impl Into<HandlerKey>) -> Self {
        self.registrations
            .push(Registration::new(EventKey::of::<E>(), handler.into()));
        self
    }

    /// Number of listed registrations.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// True if nothing is listed.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

impl Discovery for StaticDiscovery {
    fn discover(&self) -> Vec<Registration> {
        self.registrations.clone()
    }
}
