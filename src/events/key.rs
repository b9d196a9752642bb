//! # Event-type keys.
//!
//! An [`EventKey`] identifies an event category inside the process (by type
//! identity) and across processes (by [`EventData::NAME`]). It also carries the
//! decoder for its category so a consumer that only knows the routing key can
//! rebuild a typed payload.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::codec;
use crate::error::CodecError;
use crate::events::EventData;

/// Type-erased, owned event payload.
pub type ErasedEvent = Box<dyn Any + Send + Sync>;

type DecodeFn = fn(&[u8]) -> Result<ErasedEvent, CodecError>;

/// Stable key of an event category.
///
/// Equality and hashing use type identity only.
#[derive(Clone, Copy)]
pub struct EventKey {
    type_id: TypeId,
    name: &'static str,
    decode: DecodeFn,
}

impl EventKey {
    /// Key of event type `E`.
    pub fn of<E: EventData>() -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            name: E::NAME,
            decode: decode_erased::<E>,
        }
    }

    /// Stable name (the routing key on the wire).
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type identity of the event category.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// True if `payload` is an instance of this event category.
    #[inline]
    pub fn matches(&self, payload: &(dyn Any + Send + Sync)) -> bool {
        payload.type_id() == self.type_id
    }

    /// Decodes a wire body into a payload of this category.
    pub fn decode(&self, body: &[u8]) -> Result<ErasedEvent, CodecError> {
        (self.decode)(body)
    }
}

fn decode_erased<E: EventData>(body: &[u8]) -> Result<ErasedEvent, CodecError> {
    let event: E = codec::decode(body)?;
    Ok(Box::new(event))
}

impl PartialEq for EventKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for EventKey {}

impl Hash for EventKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventKey").field(&self.name).finish()
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventRecord;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Ping {
        #[serde(flatten)]
        record: EventRecord,
        n: u32,
    }

    impl EventData for Ping {
        const NAME: &'static str = "Ping";
        fn record(&self) -> &EventRecord {
            &self.record
        }
    }

    #[test]
    fn keys_compare_by_type() {
        assert_eq!(EventKey::of::<Ping>(), EventKey::of::<Ping>());
        assert_ne!(EventKey::of::<Ping>(), EventKey::of::<EventRecord>());
        assert_eq!(EventKey::of::<Ping>().to_string(), "Ping");
    }

    #[test]
    fn decode_rebuilds_typed_payload() {
        let key = EventKey::of::<Ping>();
        let body = br#"{"event_time":"2024-01-01T00:00:00Z","event_source":null,"n":5}"#;
        let erased = key.decode(body).unwrap();
        assert!(key.matches(erased.as_ref()));
        assert_eq!(erased.downcast_ref::<Ping>().unwrap().n, 5);
    }

    #[test]
    fn decode_reports_event_name() {
        let err = EventKey::of::<Ping>().decode(b"not json").unwrap_err();
        assert!(matches!(err, CodecError::Decode { event: "Ping", .. }));
    }
}
