//! Event data model.
//!
//! - [`EventRecord`] base fields (timestamp, source) embedded in every event
//! - [`EventData`] trait implemented by every event category
//! - [`EventKey`] stable key: type identity in-process, name on the wire

mod key;
mod record;

pub use key::{ErasedEvent, EventKey};
pub use record::{EventData, EventRecord};
