//! # Resolution capability: turns a [`HandlerKey`] into a live handler instance.

use crate::error::ResolutionError;
use crate::handlers::{HandlerKey, HandlerRef};

/// Fetches or constructs a handler instance for a handler key.
///
/// Called once per handler per dispatch. Whether the same instance is returned
/// every time is entirely up to the implementation.
///
/// Any `Fn(&HandlerKey) -> Result<HandlerRef, ResolutionError>` is a resolver.
pub trait HandlerResolver: Send + Sync + 'static {
    /// Resolves `key` into an instance.
    fn resolve(&self, key: &HandlerKey) -> Result<HandlerRef, ResolutionError>;
}

impl<F> HandlerResolver for F
where
    F: Fn(&HandlerKey) -> Result<HandlerRef, ResolutionError> + Send + Sync + 'static,
{
    fn resolve(&self, key: &HandlerKey) -> Result<HandlerRef, ResolutionError> {
        self(key)
    }
}
