//! Wire format of cache entries.
//!
//! Every value the crate writes under a data key takes one of three shapes:
//!
//! ```text
//! plain       [b"CGRD"] [VERSION: u32 LE] [POSTCARD(T)]
//! wrapped     [b"CGRL"] [VERSION: u32 LE] [POSTCARD(LogicalEntry<T>)]
//! null marker (empty byte string)
//! ```
//!
//! Plain and wrapped entries carry different magic numbers so a reader
//! configured for one shape never silently accepts the other.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Magic number of plain entries.
pub const PLAIN_MAGIC: [u8; 4] = *b"CGRD";

/// Magic number of wrapped (logically expiring) entries.
pub const LOGICAL_MAGIC: [u8; 4] = *b"CGRL";

/// Current schema version. Bump when the envelope layout changes.
pub const SCHEMA_VERSION: u32 = 1;

/// Value stored to record that the backing store has no such entity.
pub const NULL_MARKER: &[u8] = b"";

const HEADER_LEN: usize = 8;

/// A decoded plain entry.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue<T> {
    /// Entity payload.
    Present(T),
    /// Null marker: the entity was confirmed absent when it was written.
    Absent,
}

/// Wrapped entry used by the logical-expiration strategy.
///
/// The cache store never expires these on its own; staleness is decided
/// solely by `logical_expiry` (UNIX milliseconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalEntry<T> {
    pub data: T,
    #[serde(rename = "logicalExpiry")]
    pub logical_expiry: u64,
}

impl<T> LogicalEntry<T> {
    /// Wrap `data` so it turns stale `ttl` from now.
    pub fn new(data: T, ttl: Duration) -> Self {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        LogicalEntry {
            data,
            logical_expiry: now_millis().saturating_add(ttl_ms),
        }
    }

    /// Whether the entry is stale at `now` (UNIX milliseconds).
    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.logical_expiry
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }
}

/// Current wall-clock time in UNIX milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// Encode an entity as a plain entry.
pub fn serialize_for_cache<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    encode_envelope(PLAIN_MAGIC, value)
}

/// Decode a plain entry. Null markers are rejected; use [`decode_plain`] when
/// they may be present.
pub fn deserialize_from_cache<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    decode_envelope(PLAIN_MAGIC, bytes)
}

/// Decode whatever a plain-mode writer may have stored under a data key.
pub fn decode_plain<T: DeserializeOwned>(bytes: &[u8]) -> Result<CachedValue<T>> {
    if bytes == NULL_MARKER {
        return Ok(CachedValue::Absent);
    }
    decode_envelope(PLAIN_MAGIC, bytes).map(CachedValue::Present)
}

/// Encode a wrapped entry.
pub fn encode_logical<T: Serialize>(entry: &LogicalEntry<T>) -> Result<Vec<u8>> {
    encode_envelope(LOGICAL_MAGIC, entry)
}

/// Decode a wrapped entry.
pub fn decode_logical<T: DeserializeOwned>(bytes: &[u8]) -> Result<LogicalEntry<T>> {
    decode_envelope(LOGICAL_MAGIC, bytes)
}

fn encode_envelope<V: Serialize + ?Sized>(magic: [u8; 4], value: &V) -> Result<Vec<u8>> {
    let payload =
        postcard::to_allocvec(value).map_err(|e| Error::SerializationError(e.to_string()))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&magic);
    bytes.extend_from_slice(&SCHEMA_VERSION.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

fn decode_envelope<V: DeserializeOwned>(magic: [u8; 4], bytes: &[u8]) -> Result<V> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::InvalidCacheEntry(format!(
            "entry too short: {} bytes",
            bytes.len()
        )));
    }

    let (header, payload) = bytes.split_at(HEADER_LEN);
    if header[..4] != magic {
        return Err(Error::InvalidCacheEntry(format!(
            "unexpected magic {:?}",
            &header[..4]
        )));
    }

    let found = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if found != SCHEMA_VERSION {
        return Err(Error::VersionMismatch {
            expected: SCHEMA_VERSION,
            found,
        });
    }

    postcard::from_bytes(payload).map_err(|e| Error::DeserializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Shop {
        id: u64,
        name: String,
        score: i32,
    }

    fn shop() -> Shop {
        Shop {
            id: 1,
            name: "Tea House".to_string(),
            score: 47,
        }
    }

    #[test]
    fn test_plain_envelope_layout() {
        let bytes = serialize_for_cache(&shop()).unwrap();
        assert_eq!(&bytes[..4], b"CGRD");
        assert_eq!(&bytes[4..8], &SCHEMA_VERSION.to_le_bytes());
        assert_eq!(deserialize_from_cache::<Shop>(&bytes).unwrap(), shop());
    }

    #[test]
    fn test_null_marker_decodes_as_absent() {
        assert_eq!(
            decode_plain::<Shop>(NULL_MARKER).unwrap(),
            CachedValue::Absent
        );
        assert!(deserialize_from_cache::<Shop>(NULL_MARKER).is_err());
    }

    #[test]
    fn test_wrong_version_is_rejected() {
        let mut bytes = serialize_for_cache(&shop()).unwrap();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());

        match deserialize_from_cache::<Shop>(&bytes) {
            Err(Error::VersionMismatch { expected, found }) => {
                assert_eq!(expected, SCHEMA_VERSION);
                assert_eq!(found, 99);
            }
            other => panic!("expected version mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let bytes = serialize_for_cache(&shop()).unwrap();
        let err = deserialize_from_cache::<Shop>(&bytes[..10]).unwrap_err();
        assert!(err.is_decode_failure());
    }

    #[test]
    fn test_shapes_are_not_interchangeable() {
        let plain = serialize_for_cache(&shop()).unwrap();
        let wrapped = encode_logical(&LogicalEntry::new(shop(), Duration::from_secs(30))).unwrap();

        assert!(matches!(
            decode_logical::<Shop>(&plain),
            Err(Error::InvalidCacheEntry(_))
        ));
        assert!(matches!(
            decode_plain::<Shop>(&wrapped),
            Err(Error::InvalidCacheEntry(_))
        ));
    }

    #[test]
    fn test_logical_entry_expiry() {
        let entry = LogicalEntry {
            data: shop(),
            logical_expiry: 1_000,
        };
        assert!(!entry.is_expired_at(999));
        assert!(entry.is_expired_at(1_000));
        assert!(entry.is_expired());

        let fresh = LogicalEntry::new(shop(), Duration::from_secs(60));
        assert!(!fresh.is_expired());

        let bytes = encode_logical(&fresh).unwrap();
        assert_eq!(decode_logical::<Shop>(&bytes).unwrap(), fresh);
    }

    proptest! {
        #[test]
        fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let plain = decode_plain::<Shop>(&bytes);
            let wrapped = decode_logical::<Shop>(&bytes);
            if bytes.is_empty() {
                prop_assert_eq!(plain.unwrap(), CachedValue::Absent);
            } else if let Err(e) = plain {
                prop_assert!(e.is_decode_failure());
            }
            if let Err(e) = wrapped {
                prop_assert!(e.is_decode_failure());
            }
        }
    }
}
