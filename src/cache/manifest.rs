//! `manifest.toml` (spec §6): the per-entry record of identity, content
//! hashes, and access/size bookkeeping, read back on every `lookup` to
//! validate an entry before trusting it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, StructuredError};
use crate::fingerprint::{ConfigHash, ContentHash, Fingerprint};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryManifest {
    pub schema_version: u32,
    pub fingerprint: Arc<str>,
    pub image_content_hash: Arc<str>,
    pub palette_config_hash: Arc<str>,
    pub variant_config_hash: Arc<str>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl EntryManifest {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint(Arc::clone(&self.fingerprint))
    }

    pub fn image_content_hash(&self) -> ContentHash {
        ContentHash(Arc::clone(&self.image_content_hash))
    }

    pub fn palette_config_hash(&self) -> ConfigHash {
        ConfigHash(Arc::clone(&self.palette_config_hash))
    }

    pub fn variant_config_hash(&self) -> ConfigHash {
        ConfigHash(Arc::clone(&self.variant_config_hash))
    }

    pub fn to_toml(&self) -> Result<String, StructuredError> {
        toml::to_string_pretty(self).map_err(|e| {
            StructuredError::new("cache:manifest", ErrorKind::Internal { reason: Arc::from(e.to_string()) })
        })
    }

    pub fn from_toml(s: &str) -> Result<Self, StructuredError> {
        toml::from_str(s).map_err(|e| {
            StructuredError::new(
                "cache:manifest",
                ErrorKind::CacheCorrupt { reason: Arc::from(format!("manifest.toml parse error: {e}")) },
            )
        })
    }
}
