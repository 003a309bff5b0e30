//! Content fingerprints for change detection.
//!
//! When any of the salient fields (`title`, `content`, `price`) is
//! configured, the digest covers exactly those three in that order, with
//! absent ones treated as empty. Otherwise it covers every field in name
//! order. Each part is framed with unit/record separators so adjacent
//! values cannot run together.

use sha2::{Digest, Sha256};

use crate::models::{FieldMap, Fingerprint};

/// Fields that define a record's identity when present.
pub const SALIENT_FIELDS: &[&str] = &["title", "content", "price"];

const UNIT_SEP: u8 = 0x1f;
const RECORD_SEP: u8 = 0x1e;

/// Compute the fingerprint of an extracted field map.
pub fn fingerprint(fields: &FieldMap) -> Fingerprint {
    let mut hasher = Sha256::new();
    let mut feed = |name: &str, value: &str| {
        hasher.update(name.as_bytes());
        hasher.update([UNIT_SEP]);
        hasher.update(value.as_bytes());
        hasher.update([RECORD_SEP]);
    };

    if SALIENT_FIELDS.iter().any(|f| fields.contains_key(*f)) {
        for name in SALIENT_FIELDS {
            feed(name, fields.get(*name).map(String::as_str).unwrap_or(""));
        }
    } else {
        for (name, value) in fields {
            feed(name, value);
        }
    }

    let digest = hasher.finalize();
    Fingerprint::from_hex(hex::encode(&digest[..16]))
}
