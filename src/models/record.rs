//! Extraction records and the change events derived from them.
//!
//! A [`Record`] is produced once per successful fetch and never mutated.
//! The store assigns it a sequence id ([`StoredRecord`]) and, when its
//! fingerprint is new for the source, the pipeline emits a [`ChangeEvent`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Extracted field values keyed by field name.
pub type FieldMap = BTreeMap<String, String>;

/// Stable digest of a record's salient content, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already computed hex digest (e.g. loaded from the database).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One extraction result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub source_id: String,
    pub url: String,
    pub fields: FieldMap,
    pub captured_at: DateTime<Utc>,
    pub fingerprint: Fingerprint,
}

impl Record {
    /// Value of a field, empty when the field was not configured.
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }
}

/// A record as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Storage-assigned sequence id.
    pub id: i64,
    #[serde(flatten)]
    pub record: Record,
    /// Arrival time in the store.
    pub stored_at: DateTime<Utc>,
}

/// Whether a change event is the first record ever seen for its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    FirstSeen,
    Changed,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstSeen => "first_seen",
            Self::Changed => "changed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "first_seen" => Some(Self::FirstSeen),
            "changed" => Some(Self::Changed),
            _ => None,
        }
    }
}

/// Emitted exactly once per insertion of a fingerprint not previously seen
/// for the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Sequence id of the stored record.
    pub record_id: i64,
    pub record: Record,
    pub kind: ChangeKind,
    /// Fingerprint of the source's most recent earlier record.
    pub previous_fingerprint: Option<Fingerprint>,
}

impl ChangeEvent {
    pub fn new(record_id: i64, record: Record, previous_fingerprint: Option<Fingerprint>) -> Self {
        let kind = if previous_fingerprint.is_some() {
            ChangeKind::Changed
        } else {
            ChangeKind::FirstSeen
        };
        Self {
            record_id,
            record,
            kind,
            previous_fingerprint,
        }
    }

    pub fn is_first_seen(&self) -> bool {
        self.kind == ChangeKind::FirstSeen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[(&str, &str)]) -> Record {
        Record {
            source_id: "S1".to_string(),
            url: "https://example.com".to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            captured_at: Utc::now(),
            fingerprint: Fingerprint::from_hex("abc"),
        }
    }

    #[test]
    fn test_missing_field_reads_empty() {
        let r = record(&[("title", "A")]);
        assert_eq!(r.field("title"), "A");
        assert_eq!(r.field("price"), "");
    }

    #[test]
    fn test_change_kind_follows_previous_fingerprint() {
        let first = ChangeEvent::new(1, record(&[]), None);
        assert!(first.is_first_seen());

        let changed = ChangeEvent::new(2, record(&[]), Some(Fingerprint::from_hex("old")));
        assert_eq!(changed.kind, ChangeKind::Changed);
        assert_eq!(ChangeKind::from_str(changed.kind.as_str()), Some(ChangeKind::Changed));
    }
}
