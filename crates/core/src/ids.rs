use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

macro_rules! numeric_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(i64);

        impl $name {
            pub fn new(value: i64) -> Self {
                Self(value)
            }

            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// Physical insertion order of a revision; unique across the whole store.
numeric_id!(Sequence);
// Engine-assigned key of a document, stable for the document's lifetime.
numeric_id!(DocNumericId);

/// Generate a fresh document id: 32 lowercase hex characters.
pub fn new_doc_id() -> String {
    Uuid::now_v7().simple().to_string()
}

/// Number of hash bytes kept in a revision fingerprint.
const FINGERPRINT_BYTES: usize = 16;

/// A revision id of the form `<generation>-<fingerprint>`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RevId {
    generation: u64,
    suffix: String,
}

impl RevId {
    pub fn new(generation: u64, suffix: impl Into<String>) -> Result<Self, CoreError> {
        let suffix = suffix.into();
        if generation == 0 || suffix.is_empty() {
            return Err(CoreError::InvalidRevisionId(format!("{generation}-{suffix}")));
        }
        Ok(Self { generation, suffix })
    }

    /// Parse a `<generation>-<suffix>` string.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let (generation, suffix) = s
            .split_once('-')
            .ok_or_else(|| CoreError::InvalidRevisionId(s.to_string()))?;
        let generation: u64 = generation
            .parse()
            .map_err(|_| CoreError::InvalidRevisionId(s.to_string()))?;
        if generation == 0 || suffix.is_empty() {
            return Err(CoreError::InvalidRevisionId(s.to_string()));
        }
        Ok(Self {
            generation,
            suffix: suffix.to_string(),
        })
    }

    /// Derive the id of a new revision from its parent and content.
    ///
    /// The fingerprint covers the parent id, the deleted flag, the body bytes and
    /// the attachment digests (sorted by name), so the same edit made on two peers
    /// yields the same id.
    pub fn derive(
        parent: Option<&RevId>,
        deleted: bool,
        body: &[u8],
        attachments: &[(&str, &BlobHash)],
    ) -> Self {
        let mut hasher = blake3::Hasher::new();
        match parent {
            Some(p) => hasher.update(p.to_string().as_bytes()),
            None => hasher.update(b""),
        };
        hasher.update(&[0u8, deleted as u8]);
        hasher.update(&(body.len() as u64).to_be_bytes());
        hasher.update(body);

        let mut sorted: Vec<&(&str, &BlobHash)> = attachments.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        for (name, digest) in sorted {
            hasher.update(&(name.len() as u64).to_be_bytes());
            hasher.update(name.as_bytes());
            hasher.update(digest.as_bytes());
        }

        let hash = hasher.finalize();
        let suffix = hash.to_hex()[..FINGERPRINT_BYTES * 2].to_string();
        Self {
            generation: parent.map_or(1, |p| p.generation + 1),
            suffix,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

impl Ord for RevId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.generation
            .cmp(&other.generation)
            .then_with(|| self.suffix.cmp(&other.suffix))
    }
}

impl PartialOrd for RevId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for RevId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RevId({}-{})", self.generation, self.suffix)
    }
}

impl fmt::Display for RevId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.generation, self.suffix)
    }
}

impl FromStr for RevId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for RevId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RevId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = Deserialize::deserialize(deserializer)?;
        RevId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// BLAKE3 digest of attachment bytes as stored in the blob store.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlobHash([u8; 32]);

impl BlobHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        blake3::Hash::from_hex(s)
            .map(|h| Self(*h.as_bytes()))
            .map_err(|e| CoreError::InvalidData(format!("invalid blob hash {s:?}: {e}")))
    }
}

impl fmt::Debug for BlobHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobHash({:02x}{:02x}...)", self.0[0], self.0[1])
    }
}

impl fmt::Display for BlobHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let rev = RevId::parse("3-abc").unwrap();
        assert_eq!(rev.generation(), 3);
        assert_eq!(rev.suffix(), "abc");
        assert_eq!(rev.to_string(), "3-abc");
    }

    #[test]
    fn suffix_may_contain_dashes() {
        let rev = RevId::parse("2-a-b").unwrap();
        assert_eq!(rev.generation(), 2);
        assert_eq!(rev.suffix(), "a-b");
    }

    #[test]
    fn rejects_malformed_ids() {
        for bad in ["", "abc", "0-abc", "-abc", "3-", "x-abc", "-1-abc"] {
            assert!(RevId::parse(bad).is_err(), "expected {bad:?} to be rejected");
        }
    }

    #[test]
    fn ordering_is_generation_then_suffix() {
        let a = RevId::parse("3-zzz").unwrap();
        let b = RevId::parse("4-aaa").unwrap();
        let c = RevId::parse("4-bbb").unwrap();
        let d = RevId::parse("10-aaa").unwrap();
        assert!(a < b);
        assert!(b < c);
        assert!(c < d);
    }

    #[test]
    fn derive_is_deterministic() {
        let parent = RevId::parse("1-abc").unwrap();
        let digest = BlobHash::of(b"data");
        let x = RevId::derive(Some(&parent), false, br#"{"x":1}"#, &[("a", &digest)]);
        let y = RevId::derive(Some(&parent), false, br#"{"x":1}"#, &[("a", &digest)]);
        assert_eq!(x, y);
        assert_eq!(x.generation(), 2);
        assert_eq!(x.suffix().len(), FINGERPRINT_BYTES * 2);
    }

    #[test]
    fn derive_depends_on_all_inputs() {
        let parent = RevId::parse("1-abc").unwrap();
        let other_parent = RevId::parse("1-abd").unwrap();
        let base = RevId::derive(Some(&parent), false, b"{}", &[]);
        assert_ne!(base, RevId::derive(Some(&other_parent), false, b"{}", &[]));
        assert_ne!(base, RevId::derive(Some(&parent), true, b"{}", &[]));
        assert_ne!(base, RevId::derive(Some(&parent), false, br#"{"a":1}"#, &[]));
        let digest = BlobHash::of(b"data");
        assert_ne!(base, RevId::derive(Some(&parent), false, b"{}", &[("att", &digest)]));
    }

    #[test]
    fn derive_ignores_attachment_order() {
        let d1 = BlobHash::of(b"one");
        let d2 = BlobHash::of(b"two");
        let x = RevId::derive(None, false, b"{}", &[("a", &d1), ("b", &d2)]);
        let y = RevId::derive(None, false, b"{}", &[("b", &d2), ("a", &d1)]);
        assert_eq!(x, y);
        assert_eq!(x.generation(), 1);
    }

    #[test]
    fn blob_hash_hex_roundtrip() {
        let hash = BlobHash::of(b"hello");
        assert_eq!(BlobHash::from_hex(&hash.to_hex()).unwrap(), hash);
        assert!(BlobHash::from_hex("zz").is_err());
    }

    #[test]
    fn blob_hash_rejects_signed_or_non_hex_digits() {
        assert!(BlobHash::from_hex(&"+a".repeat(32)).is_err());
        assert!(BlobHash::from_hex(&"g".repeat(64)).is_err());
        assert!(BlobHash::from_hex(&"a".repeat(63)).is_err());
        assert!(BlobHash::from_hex(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn doc_ids_are_hex() {
        let id = new_doc_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
