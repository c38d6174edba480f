//! `variants.json` (spec §6): `{<variant_name>: {path, chain, engine_id}}`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::EffectSpec;
use crate::effects::chain::{Variant, VariantSet};
use crate::error::{ErrorKind, StructuredError};
use crate::fingerprint::Fingerprint;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VariantRecord {
    path: String,
    chain: Vec<EffectSpec>,
    engine_id: Arc<str>,
}

/// Serialize `variants`, recording each output path relative to `entry_dir`
/// so the manifest stays valid after the scratch directory is renamed into
/// its final cache location.
pub fn to_json_bytes(variants: &VariantSet, entry_dir: &Path) -> Result<Vec<u8>, StructuredError> {
    let mut records = BTreeMap::new();
    for (name, variant) in variants {
        let relative = variant
            .output_path
            .strip_prefix(entry_dir)
            .unwrap_or(&variant.output_path)
            .to_string_lossy()
            .into_owned();
        records.insert(
            name.to_string(),
            VariantRecord { path: relative, chain: variant.effect_chain_spec.clone(), engine_id: Arc::clone(&variant.engine_id) },
        );
    }
    serde_json::to_vec_pretty(&records)
        .map_err(|e| StructuredError::new("cache:variants", ErrorKind::Internal { reason: Arc::from(e.to_string()) }))
}

/// Reconstruct a [`VariantSet`] from previously-written bytes, resolving
/// each recorded relative path against `entry_dir`.
pub fn from_json_bytes(bytes: &[u8], entry_dir: &Path, source_fingerprint: &Fingerprint) -> Result<VariantSet, StructuredError> {
    let records: BTreeMap<String, VariantRecord> = serde_json::from_slice(bytes).map_err(|e| {
        StructuredError::new(
            "cache:variants",
            ErrorKind::CacheCorrupt { reason: Arc::from(format!("variants.json parse error: {e}")) },
        )
    })?;

    let mut variants = VariantSet::new();
    for (name, record) in records {
        let name: Arc<str> = Arc::from(name);
        variants.insert(
            Arc::clone(&name),
            Variant {
                name,
                source_image_fingerprint: source_fingerprint.clone(),
                effect_chain_spec: record.chain,
                output_path: entry_dir.join(record.path),
                engine_id: record.engine_id,
            },
        );
    }
    Ok(variants)
}
