//! Effect Variant Generator (spec §4.5): runs each configured variant's
//! effect chain against the source image and writes the result atomically.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rayon::prelude::*;

use crate::config::VariantSpec;
use crate::error::StructuredError;
use crate::fingerprint::Fingerprint;

use super::EffectRegistry;

/// `(name, source_image_fingerprint, effect_chain_spec, output_path)` (spec §3).
#[derive(Debug, Clone)]
pub struct Variant {
    pub name: Arc<str>,
    pub source_image_fingerprint: Fingerprint,
    pub effect_chain_spec: Vec<crate::config::EffectSpec>,
    pub output_path: PathBuf,
    pub engine_id: Arc<str>,
}

pub type VariantSet = BTreeMap<Arc<str>, Variant>;

/// One variant's outcome: either the written [`Variant`], or a failure that
/// the caller classifies by the originating spec's `critical` flag.
pub enum VariantOutcome {
    Written(Variant),
    Failed(StructuredError),
}

fn extension_for(source: &Path, configured: Option<&str>) -> String {
    configured
        .map(str::to_string)
        .or_else(|| source.extension().map(|e| e.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "png".to_string())
}

/// `EffectFailed(other)` is retried once before the per-variant criticality
/// policy applies (spec §7); `NoEngine` is never retried since a second
/// attempt can't change which engines are registered.
fn apply_with_retry(registry: &EffectRegistry, preferred_engine: &str, effect: &crate::config::EffectSpec, input: &Path, output: &Path) -> Result<(), StructuredError> {
    match registry.apply(effect, preferred_engine, input, output) {
        Ok(()) => Ok(()),
        Err(e) if matches!(e.kind, crate::error::ErrorKind::EffectFailed(crate::error::EffectFailure::EngineError)) => {
            registry.apply(effect, preferred_engine, input, output)
        }
        Err(e) => Err(e),
    }
}

fn run_chain(
    registry: &EffectRegistry,
    preferred_engine: &str,
    source: &Path,
    scratch_dir: &Path,
    spec: &VariantSpec,
) -> Result<PathBuf, StructuredError> {
    let mut current = source.to_path_buf();
    for (i, effect) in spec.chain.iter().enumerate() {
        let next = scratch_dir.join(format!("{}-{i}.png", spec.name));
        apply_with_retry(registry, preferred_engine, effect, &current, &next)?;
        current = next;
    }
    Ok(current)
}

/// Produce one output file per configured variant, fanned out up to
/// `concurrency` at a time (spec §4.5's "concurrency cap").
///
/// Returns one [`VariantOutcome`] per input `variants` entry, in the same
/// order, so callers can pair failures back to their `critical` flag.
pub fn generate(
    registry: &EffectRegistry,
    preferred_engine: &str,
    source: &Path,
    source_fingerprint: &Fingerprint,
    variants: &[VariantSpec],
    output_dir: &Path,
    scratch_dir: &Path,
    configured_extension: Option<&str>,
    concurrency: usize,
) -> Vec<VariantOutcome> {
    std::fs::create_dir_all(output_dir).ok();
    std::fs::create_dir_all(scratch_dir).ok();

    let outcomes: Mutex<Vec<(usize, VariantOutcome)>> = Mutex::new(Vec::with_capacity(variants.len()));
    let ext = extension_for(source, configured_extension);

    let run_one = |idx: usize, spec: &VariantSpec| {
        let variant_scratch = scratch_dir.join(spec.name.as_ref());
        if let Err(e) = std::fs::create_dir_all(&variant_scratch) {
            outcomes.lock().unwrap().push((
                idx,
                VariantOutcome::Failed(StructuredError::new(
                    format!("variant:{}", spec.name),
                    crate::error::ErrorKind::Internal { reason: Arc::from(e.to_string()) },
                )),
            ));
            return;
        }
        let outcome = match run_chain(registry, preferred_engine, source, &variant_scratch, spec) {
            Ok(final_path) => {
                let out_path = output_dir.join(format!("{}.{ext}", spec.name));
                std::fs::rename(&final_path, &out_path)
                    .or_else(|_| std::fs::copy(&final_path, &out_path).map(|_| ()))
                    .map(|()| Variant {
                        name: Arc::clone(&spec.name),
                        source_image_fingerprint: source_fingerprint.clone(),
                        effect_chain_spec: spec.chain.clone(),
                        output_path: out_path,
                        engine_id: Arc::from(preferred_engine),
                    })
                    .map(VariantOutcome::Written)
                    .unwrap_or_else(|e| {
                        VariantOutcome::Failed(StructuredError::new(
                            format!("variant:{}", spec.name),
                            crate::error::ErrorKind::Internal { reason: Arc::from(e.to_string()) },
                        ))
                    })
            }
            Err(e) => VariantOutcome::Failed(e),
        };
        outcomes.lock().unwrap().push((idx, outcome));
    };

    let fan_out = || variants.par_iter().enumerate().for_each(|(idx, spec)| run_one(idx, spec));

    // Pool construction only fails on pathological thread-count requests;
    // fall back to the global pool rather than losing work.
    match rayon::ThreadPoolBuilder::new().num_threads(concurrency.max(1)).build() {
        Ok(pool) => pool.install(fan_out),
        Err(_) => fan_out(),
    }

    let mut ordered = outcomes.into_inner().unwrap();
    ordered.sort_by_key(|(idx, _)| *idx);
    ordered.into_iter().map(|(_, outcome)| outcome).collect()
}
