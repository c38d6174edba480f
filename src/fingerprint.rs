//! Content-addressed identifiers used as cache keys.
//!
//! A [`Fingerprint`] is the hashed form of the tuple
//! `(image_content_hash, palette_config_hash, variant_config_hash, schema_version)`
//! described in spec §3. Each component hash is a hex-encoded SHA-256 digest;
//! the fingerprint itself is a shorter hex digest of those components joined,
//! since it is used as a directory name under the cache root and doesn't need
//! full collision resistance on its own — only stability for a given input.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of some input's raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub Arc<str>);

impl ContentHash {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(Arc::from(hex_encode(&hasher.finalize())))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hash of a canonicalized configuration fragment (backend options, template
/// identities, format list, variant chain specs, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigHash(pub Arc<str>);

impl ConfigHash {
    /// Hash a value via its canonical (key-sorted) JSON representation, so
    /// that field order in the source config never changes the hash.
    pub fn of_value<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        let canonical = serde_json::to_value(value)?;
        let bytes = serde_json::to_vec(&sort_value(canonical))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(Self(Arc::from(hex_encode(&hasher.finalize()))))
    }
}

impl fmt::Display for ConfigHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recursively sort object keys so two structurally-equal JSON values with
/// differently-ordered maps hash identically.
fn sort_value(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Value> = std::collections::BTreeMap::new();
            for (k, v) in map {
                sorted.insert(k, sort_value(v));
            }
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_value).collect()),
        other => other,
    }
}

/// Short stable identifier derived from `(image_content_hash,
/// palette_config_hash, variant_config_hash, schema_version)`. Used as the
/// cache entry's directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub Arc<str>);

impl Fingerprint {
    pub fn compute(
        image_content_hash: &ContentHash,
        palette_config_hash: &ConfigHash,
        variant_config_hash: &ConfigHash,
        schema_version: u32,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(image_content_hash.0.as_bytes());
        hasher.update(b"|");
        hasher.update(palette_config_hash.0.as_bytes());
        hasher.update(b"|");
        hasher.update(variant_config_hash.0.as_bytes());
        hasher.update(b"|");
        hasher.update(schema_version.to_le_bytes());
        let digest = hasher.finalize();
        // 16 bytes (32 hex chars) is ample for a local, single-machine cache
        // directory namespace while keeping entry paths short.
        Self(Arc::from(hex_encode(&digest[..16])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use fmt::Write;
        // String::write_fmt is infallible
        let _ = write!(out, "{byte:02x}");
    }
    out
}
