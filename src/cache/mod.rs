//! Content-addressed cache of prior palette/variant computations (spec
//! §4.6): on-disk layout, single-flight per-fingerprint locking, corruption
//! handling, and quota-bounded LRU eviction.
//!
//! `index.db` is kept as a `serde_json` document rather than a binary KV
//! store, matching spec §6's "all manifests are human-readable structured
//! text" for every other on-disk format this crate defines.

pub mod lock;
pub mod manifest;
pub mod variants_manifest;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::CacheConfig;
use crate::effects::chain::VariantSet;
use crate::error::{ErrorKind, StructuredError};
use crate::fingerprint::{ConfigHash, ContentHash, Fingerprint};
use crate::palette::{Palette, Provenance};

use manifest::EntryManifest;

/// The four hashed components a cache lookup validates an entry against
/// (spec §4.6 validation rules 3-4). `fingerprint` is their combined digest.
#[derive(Debug, Clone)]
pub struct CacheKey {
    pub fingerprint: Fingerprint,
    pub image_content_hash: ContentHash,
    pub palette_config_hash: ConfigHash,
    pub variant_config_hash: ConfigHash,
}

/// `{fingerprint, palette_dir, variant_dir, palette, variant_index,
/// created_at, last_accessed_at, size_bytes, schema_version}` (spec §3).
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub palette_dir: PathBuf,
    pub variant_dir: PathBuf,
    pub palette: Palette,
    pub variant_index: VariantSet,
    pub created_at: chrono::DateTime<Utc>,
    pub last_accessed_at: chrono::DateTime<Utc>,
    pub size_bytes: u64,
    pub schema_version: u32,
}

/// A writable claim on one fingerprint, obtained from [`Cache::begin_insert`].
/// Holds the per-fingerprint lock for its lifetime; the caller builds the
/// palette and variant artifacts directly under `scratch_dir` before calling
/// [`Cache::commit`].
pub struct InsertHandle {
    pub fingerprint: Fingerprint,
    pub scratch_dir: PathBuf,
    _lock: lock::FingerprintLock,
}

impl InsertHandle {
    pub fn palette_dir(&self) -> PathBuf {
        self.scratch_dir.join("palette")
    }

    pub fn variant_dir(&self) -> PathBuf {
        self.scratch_dir.join("variants")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexRecord {
    schema_version: u32,
    image_content_hash: Arc<str>,
    palette_config_hash: Arc<str>,
    variant_config_hash: Arc<str>,
    created_at: chrono::DateTime<Utc>,
    last_accessed_at: chrono::DateTime<Utc>,
    size_bytes: u64,
}

type Index = BTreeMap<String, IndexRecord>;

/// Owns the on-disk cache root. All reads and writes flow through one
/// handle; the in-memory index is protected by a reader-writer lock (spec
/// §5 "single-writer / multi-reader").
pub struct Cache {
    root: PathBuf,
    config: CacheConfig,
    index: RwLock<Index>,
}

fn entries_dir(root: &Path) -> PathBuf {
    root.join("entries")
}

fn tmp_dir(root: &Path) -> PathBuf {
    root.join("tmp")
}

fn locks_dir(root: &Path) -> PathBuf {
    root.join("locks")
}

fn index_path(root: &Path) -> PathBuf {
    root.join("index.db")
}

fn io_err(step: &str, e: std::io::Error) -> StructuredError {
    StructuredError::new(step, ErrorKind::Internal { reason: Arc::from(e.to_string()) })
}

impl Cache {
    /// Opens (creating if absent) the cache rooted at `config.root`, loading
    /// `index.db` if one already exists.
    pub fn open(config: CacheConfig) -> Result<Self, StructuredError> {
        std::fs::create_dir_all(entries_dir(&config.root)).map_err(|e| io_err("cache:open", e))?;
        std::fs::create_dir_all(tmp_dir(&config.root)).map_err(|e| io_err("cache:open", e))?;
        std::fs::create_dir_all(locks_dir(&config.root)).map_err(|e| io_err("cache:open", e))?;

        let index = match std::fs::read(index_path(&config.root)) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Index::new(),
            Err(e) => return Err(io_err("cache:open", e)),
        };

        Ok(Self { root: config.root.clone(), config, index: RwLock::new(index) })
    }

    fn persist_index(&self, index: &Index) -> Result<(), StructuredError> {
        let bytes = serde_json::to_vec_pretty(index)
            .map_err(|e| StructuredError::new("cache:index", ErrorKind::Internal { reason: Arc::from(e.to_string()) }))?;
        crate::atomic::write_atomic(&index_path(&self.root), &bytes).map_err(|e| io_err("cache:index", e))
    }

    fn lock_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        locks_dir(&self.root).join(format!("{fingerprint}.lock"))
    }

    fn entry_dir(&self, fingerprint: &Fingerprint) -> PathBuf {
        entries_dir(&self.root).join(fingerprint.as_str())
    }

    /// `lookup(key) -> Some(CacheEntry) | None` (spec §4.6).
    ///
    /// Any validation failure is treated as a miss and the entry is moved
    /// aside to `tmp/corrupt-<ts>/` for postmortem (spec's corruption
    /// handling rule).
    pub fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        let entry_dir = self.entry_dir(&key.fingerprint);
        let manifest_path = entry_dir.join("manifest.toml");

        let manifest_bytes = std::fs::read_to_string(&manifest_path).ok()?;
        let manifest = match EntryManifest::from_toml(&manifest_bytes) {
            Ok(m) => m,
            Err(_) => {
                self.quarantine(&key.fingerprint, &entry_dir);
                return None;
            }
        };

        if !self.validate(&manifest, key) {
            self.quarantine(&key.fingerprint, &entry_dir);
            return None;
        }

        let entry = self.load_entry(&manifest, &entry_dir).ok()?;
        self.touch(&key.fingerprint).ok();
        Some(entry)
    }

    fn validate(&self, manifest: &EntryManifest, key: &CacheKey) -> bool {
        manifest.schema_version == self.config.schema_version
            && manifest.fingerprint() == key.fingerprint
            && manifest.image_content_hash() == key.image_content_hash
            && manifest.palette_config_hash() == key.palette_config_hash
            && manifest.variant_config_hash() == key.variant_config_hash
    }

    fn load_entry(&self, manifest: &EntryManifest, entry_dir: &Path) -> Result<CacheEntry, StructuredError> {
        let palette_dir = entry_dir.join("palette");
        let variant_dir = entry_dir.join("variants");

        let palette_json = std::fs::read(palette_dir.join("palette.json")).map_err(|e| io_err("cache:lookup", e))?;
        let (colors, background, foreground, cursor) = crate::palette::canonical::colors_from_json_bytes(&palette_json)?;

        let provenance_bytes = std::fs::read(palette_dir.join("provenance.json")).map_err(|e| io_err("cache:lookup", e))?;
        let provenance: Provenance = serde_json::from_slice(&provenance_bytes)
            .map_err(|e| StructuredError::new("cache:lookup", ErrorKind::CacheCorrupt { reason: Arc::from(e.to_string()) }))?;

        let palette = Palette { colors, background, foreground, cursor, provenance };
        palette
            .validate()
            .map_err(|reason| StructuredError::new("cache:lookup", ErrorKind::CacheCorrupt { reason: Arc::from(reason) }))?;

        let variants_bytes = std::fs::read(variant_dir.join("variants.json")).map_err(|e| io_err("cache:lookup", e))?;
        let variant_index = variants_manifest::from_json_bytes(&variants_bytes, entry_dir, &manifest.fingerprint())?;

        for variant in variant_index.values() {
            let meta = std::fs::metadata(&variant.output_path).map_err(|e| io_err("cache:lookup", e))?;
            if meta.len() == 0 {
                return Err(StructuredError::new("cache:lookup", ErrorKind::CacheCorrupt { reason: Arc::from("variant file is empty") }));
            }
        }

        Ok(CacheEntry {
            fingerprint: manifest.fingerprint(),
            palette_dir,
            variant_dir,
            palette,
            variant_index,
            created_at: manifest.created_at,
            last_accessed_at: manifest.last_accessed_at,
            size_bytes: manifest.size_bytes,
            schema_version: manifest.schema_version,
        })
    }

    /// Moves a failed-validation entry to `tmp/corrupt-<ts>/` and drops it
    /// from the index, so the caller sees a plain miss.
    fn quarantine(&self, fingerprint: &Fingerprint, entry_dir: &Path) {
        if entry_dir.exists() {
            let dest = tmp_dir(&self.root).join(format!("corrupt-{}-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default(), fingerprint));
            let _ = std::fs::rename(entry_dir, &dest);
        }
        self.index.write().unwrap().remove(fingerprint.as_str());
        let index = self.index.read().unwrap().clone();
        let _ = self.persist_index(&index);
    }

    /// `begin_insert(key) -> Handle` (spec §4.6). Returns `Ok(None)` if the
    /// per-fingerprint lock could not be acquired within
    /// `cache.lock_timeout_ms` — the caller may proceed without caching.
    pub fn begin_insert(&self, fingerprint: &Fingerprint) -> Result<Option<InsertHandle>, StructuredError> {
        let lock_path = self.lock_path(fingerprint);
        let timeout = Duration::from_millis(self.config.lock_timeout_ms);
        let held = lock::acquire_exclusive(&lock_path, timeout).map_err(|e| io_err("cache:begin_insert", e))?;

        let Some(held) = held else { return Ok(None) };

        let unique = format!("{}-{}-{:x}", fingerprint, std::process::id(), Utc::now().timestamp_nanos_opt().unwrap_or_default());
        let scratch_dir = tmp_dir(&self.root).join(unique);
        std::fs::create_dir_all(scratch_dir.join("palette")).map_err(|e| io_err("cache:begin_insert", e))?;
        std::fs::create_dir_all(scratch_dir.join("variants")).map_err(|e| io_err("cache:begin_insert", e))?;

        Ok(Some(InsertHandle { fingerprint: fingerprint.clone(), scratch_dir, _lock: held }))
    }

    /// `commit(handle, palette, variants) -> CacheEntry` (spec §4.6).
    ///
    /// Writes the canonical wire files, computes `size_bytes`, renames the
    /// scratch directory into `entries/<fingerprint>` and updates the index
    /// last — so a reader observes either the old entry, no entry, or the
    /// complete new one.
    pub fn commit(&self, handle: InsertHandle, palette: &Palette, variants: &VariantSet, key: &CacheKey) -> Result<CacheEntry, StructuredError> {
        let palette_dir = handle.palette_dir();
        let variant_dir = handle.variant_dir();

        let palette_json = crate::palette::canonical::to_json_bytes(palette)?;
        crate::atomic::write_atomic(&palette_dir.join("palette.json"), &palette_json).map_err(|e| io_err("cache:commit", e))?;

        let provenance_json = serde_json::to_vec_pretty(&palette.provenance)
            .map_err(|e| StructuredError::new("cache:commit", ErrorKind::Internal { reason: Arc::from(e.to_string()) }))?;
        crate::atomic::write_atomic(&palette_dir.join("provenance.json"), &provenance_json).map_err(|e| io_err("cache:commit", e))?;

        let variants_json = variants_manifest::to_json_bytes(variants, &handle.scratch_dir)?;
        crate::atomic::write_atomic(&variant_dir.join("variants.json"), &variants_json).map_err(|e| io_err("cache:commit", e))?;

        let now = Utc::now();
        let size_bytes = dir_size(&handle.scratch_dir).map_err(|e| io_err("cache:commit", e))?;

        let manifest = EntryManifest {
            schema_version: self.config.schema_version,
            fingerprint: Arc::from(handle.fingerprint.as_str()),
            image_content_hash: Arc::clone(&key.image_content_hash.0),
            palette_config_hash: Arc::clone(&key.palette_config_hash.0),
            variant_config_hash: Arc::clone(&key.variant_config_hash.0),
            created_at: now,
            last_accessed_at: now,
            size_bytes,
        };
        std::fs::write(handle.scratch_dir.join("manifest.toml"), manifest.to_toml()?).map_err(|e| io_err("cache:commit", e))?;

        let final_dir = self.entry_dir(&handle.fingerprint);
        if final_dir.exists() {
            std::fs::remove_dir_all(&final_dir).map_err(|e| io_err("cache:commit", e))?;
        }
        std::fs::rename(&handle.scratch_dir, &final_dir).map_err(|e| io_err("cache:commit", e))?;

        {
            let mut index = self.index.write().unwrap();
            index.insert(
                handle.fingerprint.as_str().to_string(),
                IndexRecord {
                    schema_version: manifest.schema_version,
                    image_content_hash: Arc::clone(&manifest.image_content_hash),
                    palette_config_hash: Arc::clone(&manifest.palette_config_hash),
                    variant_config_hash: Arc::clone(&manifest.variant_config_hash),
                    created_at: manifest.created_at,
                    last_accessed_at: manifest.last_accessed_at,
                    size_bytes: manifest.size_bytes,
                },
            );
            let snapshot = index.clone();
            drop(index);
            self.persist_index(&snapshot)?;
        }

        self.load_entry(&manifest, &final_dir)
    }

    /// `touch(key) -> ()`: bumps `last_accessed_at` in the index and the
    /// entry's own manifest, without otherwise reading the entry.
    pub fn touch(&self, fingerprint: &Fingerprint) -> Result<(), StructuredError> {
        let now = Utc::now();
        let updated = {
            let mut index = self.index.write().unwrap();
            match index.get_mut(fingerprint.as_str()) {
                Some(record) => {
                    record.last_accessed_at = now;
                    true
                }
                None => false,
            }
        };
        if !updated {
            return Ok(());
        }
        let snapshot = self.index.read().unwrap().clone();
        self.persist_index(&snapshot)?;

        let manifest_path = self.entry_dir(fingerprint).join("manifest.toml");
        if let Ok(bytes) = std::fs::read_to_string(&manifest_path) {
            if let Ok(mut manifest) = EntryManifest::from_toml(&bytes) {
                manifest.last_accessed_at = now;
                if let Ok(toml_str) = manifest.to_toml() {
                    let _ = std::fs::write(&manifest_path, toml_str);
                }
            }
        }
        Ok(())
    }

    /// `invalidate(key) -> ()`: removes the entry from the index first (so
    /// concurrent lookups see a miss immediately), then deletes its files.
    pub fn invalidate(&self, fingerprint: &Fingerprint) -> Result<(), StructuredError> {
        self.index.write().unwrap().remove(fingerprint.as_str());
        let snapshot = self.index.read().unwrap().clone();
        self.persist_index(&snapshot)?;

        let dir = self.entry_dir(fingerprint);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| io_err("cache:invalidate", e))?;
        }
        Ok(())
    }

    /// `prune(target_bytes) -> evicted_count` (spec §4.6): evicts
    /// least-recently-used entries, skipping any currently locked by another
    /// process, until total size is at or below `target_bytes`.
    pub fn prune(&self, target_bytes: u64) -> Result<usize, StructuredError> {
        let mut candidates: Vec<(String, IndexRecord)> = self.index.read().unwrap().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        candidates.sort_by_key(|(_, record)| record.last_accessed_at);

        let mut total: u64 = candidates.iter().map(|(_, r)| r.size_bytes).sum();
        let mut evicted = 0usize;

        for (fp_str, record) in candidates {
            if total <= target_bytes {
                break;
            }
            let fingerprint = Fingerprint(Arc::from(fp_str.as_str()));
            let lock_path = self.lock_path(&fingerprint);
            // A held lock means another process/thread is actively using or
            // building this entry; never evict it mid-flight.
            match lock::acquire_exclusive(&lock_path, Duration::from_millis(0)) {
                Ok(Some(_guard)) => {
                    self.invalidate(&fingerprint)?;
                    total = total.saturating_sub(record.size_bytes);
                    evicted += 1;
                }
                _ => continue,
            }
        }

        Ok(evicted)
    }

    pub fn total_bytes(&self) -> u64 {
        self.index.read().unwrap().values().map(|r| r.size_bytes).sum()
    }

    pub fn entry_count(&self) -> usize {
        self.index.read().unwrap().len()
    }

    /// Evicts down to `cache.low_watermark_bytes` if either quota is
    /// exceeded (spec §4.6 eviction triggers); a soft operation that never
    /// fails the caller even if it can't free enough (spec §7
    /// `CacheQuotaExceeded` policy).
    pub fn enforce_quota(&self) -> Result<(), StructuredError> {
        if self.total_bytes() > self.config.max_bytes || self.entry_count() > self.config.max_entries {
            self.prune(self.config.low_watermark_bytes)?;
        }
        Ok(())
    }
}

fn dir_size(dir: &Path) -> std::io::Result<u64> {
    let mut total = 0u64;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}
