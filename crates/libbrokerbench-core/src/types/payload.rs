//! Payload and batch types

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single record sent to every backend.
///
/// Only the identifier and timestamp are interpreted; every other field of the
/// JSON object is carried verbatim and re-emitted when the payload is
/// serialized for a broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(rename = "transactionId")]
    id: String,
    #[serde(with = "serde_timestamp")]
    timestamp: NaiveDateTime,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Payload {
    pub fn new(id: impl Into<String>, timestamp: NaiveDateTime, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            fields,
        }
    }

    /// Correlation key used for tracing, Kafka record keys and AMQP message ids
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Encode to the JSON body sent over the wire
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// An ordered, non-empty group of payloads
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    payloads: Vec<Payload>,
}

impl Batch {
    /// Returns `None` for an empty payload list
    pub fn new(payloads: Vec<Payload>) -> Option<Self> {
        if payloads.is_empty() {
            None
        } else {
            Some(Self { payloads })
        }
    }

    pub fn payloads(&self) -> &[Payload] {
        &self.payloads
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    // Never true: construction rejects empty batches.
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Payload> {
        self.payloads.iter()
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a Payload;
    type IntoIter = std::slice::Iter<'a, Payload>;

    fn into_iter(self) -> Self::IntoIter {
        self.payloads.iter()
    }
}

/// Microsecond-precision timestamps without a zone, e.g. `2024-03-01T12:30:45.123456`
pub(crate) mod serde_timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

    pub fn serialize<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&ts.format(FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        // %.f accepts any fractional precision, including none
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f").map_err(serde::de::Error::custom)
    }
}
