//! # Event payloads.
//!
//! Every event category embeds an [`EventRecord`] (when it happened and, optionally,
//! who raised it) and implements [`EventData`] to give itself a stable name.
//!
//! On the wire the record is flattened into the payload, so an event such as
//! ```text
//! OrderPlaced { record, order_id: 7 }
//! ```
//! is encoded as
//! ```text
//! {"event_time":"2026-01-01T00:00:00Z","event_source":"checkout","order_id":7}
//! ```
//!
//! ## Example
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use relaybus::{EventData, EventRecord};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct OrderPlaced {
//!     #[serde(flatten)]
//!     record: EventRecord,
//!     order_id: u64,
//! }
//!
//! impl EventData for OrderPlaced {
//!     const NAME: &'static str = "OrderPlaced";
//!     fn record(&self) -> &EventRecord { &self.record }
//! }
//!
//! let ev = OrderPlaced { record: EventRecord::from_source("checkout"), order_id: 7 };
//! assert_eq!(ev.event_source(), Some("checkout"));
//! ```

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Base fields shared by every event.
///
/// Fields are private: the timestamp is fixed when the record is built and
/// cannot be changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    event_time: DateTime<Utc>,
    #[serde(default)]
    event_source: Option<String>,
}

impl EventRecord {
    /// Creates a record stamped with the current time and no source.
    pub fn new() -> Self {
        Self {
            event_time: Utc::now(),
            event_source: None,
        }
    }

    /// Creates a record stamped with the current time and the given source.
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            event_time: Utc::now(),
            event_source: Some(source.into()),
        }
    }

    /// Creates a record with an explicit timestamp.
    ///
    /// Useful for replaying or for deterministic tests.
    pub fn at(event_time: DateTime<Utc>, event_source: Option<String>) -> Self {
        Self {
            event_time,
            event_source,
        }
    }

    /// When the event was raised.
    #[inline]
    pub fn event_time(&self) -> DateTime<Utc> {
        self.event_time
    }

    /// Opaque reference to whoever raised the event.
    #[inline]
    pub fn event_source(&self) -> Option<&str> {
        self.event_source.as_deref()
    }
}

impl Default for EventRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// An event category.
///
/// `NAME` must be unique among the event types a bus sees: it is the routing key
/// on the broker and the lookup key the consumer uses to rebuild payloads.
pub trait EventData: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable name of the category.
    const NAME: &'static str;

    /// The embedded base record.
    fn record(&self) -> &EventRecord;

    /// When the event was raised.
    fn event_time(&self) -> DateTime<Utc> {
        self.record().event_time()
    }

    /// Opaque reference to whoever raised the event.
    fn event_source(&self) -> Option<&str> {
        self.record().event_source()
    }
}

impl EventData for EventRecord {
    const NAME: &'static str = "EventRecord";

    fn record(&self) -> &EventRecord {
        self
    }
}
