//! # Handler keys.
//!
//! A [`HandlerKey`] names a handler implementation: its type name, an explicit
//! name, or a generated `fn#<seq>:<Event>` key for each registered closure.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Sequence for closure registrations.
static CLOSURE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Stable identifier of a handler implementation.
///
/// Independent of the event types the handler is registered for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerKey(Cow<'static, str>);

impl HandlerKey {
    /// Key of handler type `H` (its type name).
    pub fn of<H: ?Sized + 'static>() -> Self {
        Self(Cow::Borrowed(std::any::type_name::<H>()))
    }

    /// Key with an explicit name.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Fresh key for one closure registration: `fn#<seq>:<event>`.
    pub(crate) fn closure(event: &str) -> Self {
        let seq = CLOSURE_SEQ.fetch_add(1, AtomicOrdering::Relaxed);
        Self(Cow::Owned(format!("fn#{seq}:{event}")))
    }

    /// True for keys minted by [`HandlerKey::closure`].
    pub fn is_closure(&self) -> bool {
        self.0.starts_with("fn#")
    }

    /// The key as text.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for HandlerKey {
    fn from(name: &'static str) -> Self {
        Self::named(name)
    }
}

impl From<String> for HandlerKey {
    fn from(name: String) -> Self {
        Self::named(name)
    }
}
