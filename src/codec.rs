//! # Wire codec.
//!
//! Events travel as UTF-8 JSON: one object per message, containing the flattened
//! [`EventRecord`](crate::EventRecord) fields and every typed field of the payload.

use crate::error::CodecError;
use crate::events::EventData;

/// Encodes an event into a message body.
pub fn encode<E: EventData>(event: &E) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(event).map_err(|source| CodecError::Encode {
        event: E::NAME,
        source,
    })
}

/// Decodes a message body into an event.
pub fn decode<E: EventData>(body: &[u8]) -> Result<E, CodecError> {
    serde_json::from_slice(body).map_err(|source| CodecError::Decode {
        event: E::NAME,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventRecord;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum Fish {
        Carp,
        Pike,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Caught {
        #[serde(flatten)]
        record: EventRecord,
        angler: String,
        fish: Fish,
        weight_grams: Option<u32>,
        tags: Vec<String>,
    }

    impl EventData for Caught {
        const NAME: &'static str = "Caught";
        fn record(&self) -> &EventRecord {
            &self.record
        }
    }

    fn sample() -> Caught {
        Caught {
            record: EventRecord::at(
                Utc.with_ymd_and_hms(2025, 3, 9, 6, 30, 15).unwrap(),
                Some("rod-1".into()),
            ),
            angler: "Ann".into(),
            fish: Fish::Pike,
            weight_grams: Some(1250),
            tags: vec!["lake".into(), "dawn".into()],
        }
    }

    #[test]
    fn body_is_flat_json_with_record_fields() {
        let body = encode(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["event_time"], "2025-03-09T06:30:15Z");
        assert_eq!(value["event_source"], "rod-1");
        assert_eq!(value["angler"], "Ann");
        assert_eq!(value["fish"], "Pike");
        assert_eq!(value["weight_grams"], 1250);
    }

    #[test]
    fn round_trip_keeps_every_field() {
        let original = sample();
        let decoded: Caught = decode(&encode(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);

        let sparse = Caught {
            record: EventRecord::new(),
            fish: Fish::Carp,
            weight_grams: None,
            tags: vec![],
            ..original
        };
        let decoded: Caught = decode(&encode(&sparse).unwrap()).unwrap();
        assert_eq!(decoded, sparse);
    }

    #[test]
    fn decode_rejects_missing_fields() {
        let err = decode::<Caught>(br#"{"event_time":"2025-03-09T06:30:15Z"}"#).unwrap_err();
        assert_eq!(err.as_label(), "codec_decode");
    }
}
