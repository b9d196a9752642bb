//! Error types used by the buses, resolvers and transports.
//!
//! - [`HandlerError`] failure of a single handler invocation.
//! - [`ResolutionError`] a handler key could not be turned into an instance.
//! - [`DispatchError`] aggregate of every handler failure from one fan-out.
//! - [`TransportError`] broker-side failures.
//! - [`CodecError`] wire encoding/decoding failures.
//! - [`BusError`] what bus operations return to callers.
//!
//! Every enum exposes `as_label` (short snake_case label for logs/metrics).

use std::fmt;

use thiserror::Error;

use crate::handlers::HandlerKey;

/// # Errors produced while resolving a handler instance.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ResolutionError {
    /// The resolver has no provider for this key.
    #[error("no provider registered for handler {handler}")]
    NotRegistered {
        /// Key that was asked for.
        handler: HandlerKey,
    },

    /// A provider exists but failed to build the instance.
    #[error("failed to construct handler {handler}: {reason}")]
    Construction {
        /// Key that was asked for.
        handler: HandlerKey,
        /// Factory-provided reason.
        reason: String,
    },
}

impl ResolutionError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ResolutionError::NotRegistered { .. } => "resolution_not_registered",
            ResolutionError::Construction { .. } => "resolution_construction",
        }
    }
}

/// # Errors produced by a single handler invocation.
///
/// Handlers return [`HandlerError::Failed`] (usually via [`HandlerError::fail`]);
/// the other variants are produced by the bus itself.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum HandlerError {
    /// Handler reported a failure.
    #[error("handler failed: {error}")]
    Failed {
        /// Handler-provided message.
        error: String,
    },

    /// Handler panicked; the panic was caught.
    #[error("handler panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// The resolved instance does not handle the offered event type.
    #[error("handler {handler} does not accept this event type")]
    EventMismatch {
        /// Handler that was offered the event.
        handler: String,
    },

    /// The handler could not be resolved.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

impl HandlerError {
    /// Shorthand for [`HandlerError::Failed`].
    ///
    /// # Example
    /// ```
    /// use relaybus::HandlerError;
    ///
    /// let err = HandlerError::fail("disk full");
    /// assert_eq!(err.as_label(), "handler_failed");
    /// ```
    pub fn fail(error: impl Into<String>) -> Self {
        HandlerError::Failed {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Failed { .. } => "handler_failed",
            HandlerError::Panicked { .. } => "handler_panicked",
            HandlerError::EventMismatch { .. } => "handler_event_mismatch",
            HandlerError::Resolution(e) => e.as_label(),
        }
    }
}

/// One failed handler within a fan-out.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    /// Handler that failed.
    pub handler: HandlerKey,
    /// What went wrong.
    pub error: HandlerError,
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.handler, self.error)
    }
}

/// Aggregate failure of one trigger call.
///
/// Built only after the full fan-out completed; `failures` keeps registration order.
#[derive(Debug, Clone)]
pub struct DispatchError {
    /// Stable name of the triggered event.
    pub event: &'static str,
    /// Every failure, in the order the handlers ran.
    pub failures: Vec<HandlerFailure>,
}

impl DispatchError {
    /// Keys of the handlers that failed.
    pub fn failed_handlers(&self) -> Vec<&HandlerKey> {
        self.failures.iter().map(|f| &f.handler).collect()
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} handler(s) failed for event {}: [",
            self.failures.len(),
            self.event
        )?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        f.write_str("]")
    }
}

impl std::error::Error for DispatchError {}

/// # Errors produced by a broker transport.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Broker cannot be reached.
    #[error("broker unavailable: {reason}")]
    Unavailable {
        /// Transport-provided reason.
        reason: String,
    },

    /// Publish or bind against an exchange that was never declared.
    #[error("exchange {exchange:?} not declared")]
    ExchangeNotFound {
        /// Exchange name.
        exchange: String,
    },

    /// Bind or consume against a queue that does not exist.
    #[error("queue {queue:?} not found")]
    QueueNotFound {
        /// Queue name.
        queue: String,
    },

    /// The queue already has a consumer.
    #[error("queue {queue:?} already has a consumer")]
    QueueInUse {
        /// Queue name.
        queue: String,
    },

    /// The channel was closed before the operation.
    #[error("channel closed")]
    ChannelClosed,
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Unavailable { .. } => "transport_unavailable",
            TransportError::ExchangeNotFound { .. } => "transport_exchange_not_found",
            TransportError::QueueNotFound { .. } => "transport_queue_not_found",
            TransportError::QueueInUse { .. } => "transport_queue_in_use",
            TransportError::ChannelClosed => "transport_channel_closed",
        }
    }
}

/// # Errors produced by the wire codec.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CodecError {
    /// Payload could not be serialized.
    #[error("failed to encode {event}: {source}")]
    Encode {
        /// Stable event name.
        event: &'static str,
        /// Underlying serializer error.
        #[source]
        source: serde_json::Error,
    },

    /// Body could not be deserialized into the event type.
    #[error("failed to decode {event}: {source}")]
    Decode {
        /// Stable event name.
        event: &'static str,
        /// Underlying deserializer error.
        #[source]
        source: serde_json::Error,
    },
}

impl CodecError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CodecError::Encode { .. } => "codec_encode",
            CodecError::Decode { .. } => "codec_decode",
        }
    }
}

/// # Errors returned by bus operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BusError {
    /// One or more handlers failed during a fan-out.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The broker rejected or could not carry the operation.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The event could not be encoded for the wire.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The task running an async trigger died before reporting.
    #[error("trigger task failed: {reason}")]
    Join {
        /// Rendered join error.
        reason: String,
    },
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::Dispatch(_) => "bus_dispatch",
            BusError::Transport(e) => e.as_label(),
            BusError::Codec(e) => e.as_label(),
            BusError::Join { .. } => "bus_join",
        }
    }

    /// The aggregate dispatch failure, if this is one.
    pub fn as_dispatch(&self) -> Option<&DispatchError> {
        match self {
            BusError::Dispatch(e) => Some(e),
            _ => None,
        }
    }
}
