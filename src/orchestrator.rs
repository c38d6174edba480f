//! The Orchestrator (spec §4.7): the public entry point. Given a source
//! image, it ensures the derived palette and variant artifacts exist and are
//! valid, applies the result to the display, and returns a structured
//! summary — consulting the cache first so a repeated call on unchanged
//! inputs does no derivation work at all.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::applier::{Applier, MonitorSelector};
use crate::backends::BackendRegistry;
use crate::cache::{Cache, CacheKey};
use crate::config::WallpaperConfig;
use crate::effects::chain::{self, VariantSet};
use crate::effects::EffectRegistry;
use crate::error::{ErrorKind, StructuredError};
use crate::fingerprint::{ConfigHash, ContentHash, Fingerprint};
use crate::palette::render::{self, PaletteOutputSet};
use crate::palette::Palette;
use crate::pipeline::{Entry, Executor, PipelineContext, Step, StepOutcome, StepValue};
use crate::reporter::{ProgressStatus, Reporter};
use crate::template::TemplateEngine;

/// `{output_palette_dir?, output_variants_dir?, monitor_selector, reporter,
/// allow_cache, force_rebuild}` (spec §4.7).
pub struct OrchestrationOptions {
    pub output_palette_dir: Option<PathBuf>,
    pub output_variants_dir: Option<PathBuf>,
    pub monitor_selector: MonitorSelector,
    pub reporter: Arc<dyn Reporter>,
    pub allow_cache: bool,
    pub force_rebuild: bool,
}

impl OrchestrationOptions {
    pub fn new(reporter: Arc<dyn Reporter>) -> Self {
        Self {
            output_palette_dir: None,
            output_variants_dir: None,
            monitor_selector: MonitorSelector::All,
            reporter,
            allow_cache: true,
            force_rebuild: false,
        }
    }
}

/// `{palette, palette_output_set, variant_set, applied, monitor_applied?,
/// from_cache, duration_ms, warnings}` (spec §4.7).
pub struct OrchestrationResult {
    pub palette: Palette,
    pub palette_output_set: PaletteOutputSet,
    pub variant_set: VariantSet,
    pub applied: bool,
    pub monitor_applied: Option<MonitorSelector>,
    pub from_cache: bool,
    pub duration_ms: u64,
    pub warnings: Vec<StructuredError>,
}

/// Fields of `palette.*` that change the derived artifact, hashed as one unit
/// (spec §3's `palette_config_hash`: backend id + options + template
/// identities + selected formats).
#[derive(Serialize)]
struct PaletteConfigFingerprint<'a> {
    backend_id: &'static str,
    backend_options: &'a crate::config::BackendOptions,
    available_templates: Vec<String>,
    formats: &'a [crate::config::OutputFormat],
}

/// `variant_config_hash`: the ordered variant list plus the engine id that
/// will run them (spec §3).
#[derive(Serialize)]
struct VariantConfigFingerprint<'a> {
    preferred_engine: &'static str,
    variants: &'a [crate::config::VariantSpec],
}

pub struct Orchestrator {
    config: WallpaperConfig,
    cache: Cache,
    applier: Arc<dyn Applier>,
    template_engine: Arc<dyn TemplateEngine>,
}

impl Orchestrator {
    pub fn new(config: WallpaperConfig, applier: Arc<dyn Applier>, template_engine: Arc<dyn TemplateEngine>) -> Result<Self, StructuredError> {
        let cache = Cache::open(config.cache.clone())?;
        Ok(Self { config, cache, applier, template_engine })
    }

    fn compute_key(&self, image_bytes: &[u8]) -> Result<CacheKey, StructuredError> {
        let image_content_hash = ContentHash::of_bytes(image_bytes);

        let palette_fingerprint = PaletteConfigFingerprint {
            backend_id: self.config.palette.backend.backend_id(),
            backend_options: &self.config.palette.backend_options,
            available_templates: self.template_engine.available_templates(),
            formats: &self.config.palette.formats,
        };
        let palette_config_hash = ConfigHash::of_value(&palette_fingerprint).map_err(|e| {
            StructuredError::new("orchestrator", ErrorKind::Internal { reason: Arc::from(e.to_string()) })
        })?;

        let variant_fingerprint = VariantConfigFingerprint {
            preferred_engine: self.config.effects.preferred_engine.engine_id(),
            variants: &self.config.variants,
        };
        let variant_config_hash = ConfigHash::of_value(&variant_fingerprint).map_err(|e| {
            StructuredError::new("orchestrator", ErrorKind::Internal { reason: Arc::from(e.to_string()) })
        })?;

        let fingerprint = Fingerprint::compute(&image_content_hash, &palette_config_hash, &variant_config_hash, self.config.cache.schema_version);

        Ok(CacheKey { fingerprint, image_content_hash, palette_config_hash, variant_config_hash })
    }

    /// `orchestrate(image_path, options) -> OrchestrationResult` (spec §4.7).
    pub fn orchestrate(&self, image_path: &Path, options: OrchestrationOptions) -> Result<OrchestrationResult, StructuredError> {
        let start = Instant::now();

        let image_path = std::fs::canonicalize(image_path).map_err(|_| StructuredError::new("orchestrator", ErrorKind::ImageInvalid))?;
        let image_bytes = std::fs::read(&image_path).map_err(|_| StructuredError::new("orchestrator", ErrorKind::ImageInvalid))?;
        image::load_from_memory(&image_bytes).map_err(|_| StructuredError::new("orchestrator", ErrorKind::ImageInvalid))?;

        let key = self.compute_key(&image_bytes)?;

        if options.allow_cache && self.config.orchestrator.allow_cache && !options.force_rebuild {
            if let Some(entry) = self.cache.lookup(&key) {
                return self.finish_from_cache(entry, &image_path, &options, start);
            }
        }

        self.run_pipeline(&image_path, &key, &options, start)
    }

    fn finish_from_cache(
        &self,
        entry: crate::cache::CacheEntry,
        image_path: &Path,
        options: &OrchestrationOptions,
        start: Instant,
    ) -> Result<OrchestrationResult, StructuredError> {
        let palette_output_set = self
            .config
            .palette
            .formats
            .iter()
            .map(|&format| (format, entry.palette_dir.join(format!("colors.{}", format.extension()))))
            .collect();

        let (applied, warnings) = self.run_apply(image_path, options);
        copy_outputs(&entry.palette_dir, &options.output_palette_dir)?;
        copy_outputs(&entry.variant_dir, &options.output_variants_dir)?;

        options.reporter.on_progress("orchestrate", 1.0, ProgressStatus::Complete);

        Ok(OrchestrationResult {
            palette: entry.palette,
            palette_output_set,
            variant_set: entry.variant_index,
            applied,
            monitor_applied: applied.then(|| options.monitor_selector.clone()),
            from_cache: true,
            duration_ms: start.elapsed().as_millis() as u64,
            warnings,
        })
    }

    fn run_pipeline(
        &self,
        image_path: &Path,
        key: &CacheKey,
        options: &OrchestrationOptions,
        start: Instant,
    ) -> Result<OrchestrationResult, StructuredError> {
        let handle = self.cache.begin_insert(&key.fingerprint)?;

        let scratch_root = match &handle {
            Some(handle) => handle.scratch_dir.clone(),
            None => tempfile::tempdir()
                .map_err(|e| StructuredError::new("orchestrator", ErrorKind::Internal { reason: Arc::from(e.to_string()) }))?
                .keep(),
        };
        let palette_scratch_dir = match &handle {
            Some(handle) => handle.palette_dir(),
            None => scratch_root.join("palette"),
        };
        let variant_scratch_dir = match &handle {
            Some(handle) => handle.variant_dir(),
            None => scratch_root.join("variants"),
        };
        std::fs::create_dir_all(&palette_scratch_dir)
            .and_then(|()| std::fs::create_dir_all(&variant_scratch_dir))
            .map_err(|e| StructuredError::new("orchestrator", ErrorKind::Internal { reason: Arc::from(e.to_string()) }))?;

        let ctx = PipelineContext::new(scratch_root.clone(), Arc::clone(&options.reporter));

        let palette_step = self.build_palette_step(image_path, palette_scratch_dir.clone());
        let variants_step = self.build_variants_step(
            image_path,
            key.fingerprint.clone(),
            variant_scratch_dir.clone(),
            Arc::clone(&ctx.errors),
            Arc::clone(&options.reporter),
        );
        let apply_step = self.build_apply_step(image_path, options.monitor_selector.clone());

        let entries = vec![Entry::Parallel(vec![palette_step, variants_step]), Entry::Single(apply_step)];
        let outcome = Executor::run(entries, &ctx);

        let palette = match ctx.result("palette") {
            Some(StepValue::Palette(p)) => Some(p),
            _ => None,
        };
        let variants = match ctx.result("variants") {
            Some(StepValue::Variants(v)) => v,
            _ => VariantSet::new(),
        };
        let applied = matches!(ctx.result("apply"), Some(StepValue::Applied(true)));

        let mut warnings = ctx.errors.lock().unwrap().clone();

        let derivation_failed = !outcome.entry_statuses.first().is_some_and(|s| {
            matches!(s, crate::pipeline::EntryStatus::Succeeded | crate::pipeline::EntryStatus::SucceededWithWarnings)
        });

        let Some(palette) = palette.filter(|_| !derivation_failed) else {
            // Cancelled (spec §7): sweep the scratch dir, leave no partial
            // entry; dropping `handle` here also releases the per-fingerprint
            // lock so a subsequent attempt isn't blocked by this one.
            let _ = std::fs::remove_dir_all(&scratch_root);
            drop(handle);
            return Err(warnings
                .pop()
                .unwrap_or_else(|| StructuredError::new("orchestrator", ErrorKind::ExtractionFailed { reason: Arc::from("palette derivation failed") })));
        };

        // `build_palette_step` already rendered the configured formats
        // directly into `palette_scratch_dir`; the cache commit below only
        // relocates that directory, so the paths are recomputed rather than
        // rendered a second time.
        // When the cache lock is busy, `handle` is `None` and the scratch
        // directory under `scratch_root` becomes the artifacts' only home;
        // it is intentionally left on disk rather than swept, since the
        // result returned below points into it (see `DESIGN.md`).
        let (palette_dir, variant_dir, variant_index) = match handle {
            Some(handle) => {
                let entry = self.cache.commit(handle, &palette, &variants, key)?;
                (entry.palette_dir, entry.variant_dir, entry.variant_index)
            }
            None => (palette_scratch_dir.clone(), variant_scratch_dir.clone(), variants),
        };

        copy_outputs(&palette_dir, &options.output_palette_dir)?;
        copy_outputs(&variant_dir, &options.output_variants_dir)?;

        let palette_output_set = self
            .config
            .palette
            .formats
            .iter()
            .map(|&format| (format, palette_dir.join(format!("colors.{}", format.extension()))))
            .collect();

        // Run after the mirrored copies above are made so a zero-`max_bytes`
        // cache (spec §8) can never evict the entry this call just committed
        // before its paths are handed back to the caller.
        self.cache.enforce_quota().ok();

        options.reporter.on_progress("orchestrate", 1.0, ProgressStatus::Complete);

        Ok(OrchestrationResult {
            palette,
            palette_output_set,
            variant_set: variant_index,
            applied,
            monitor_applied: applied.then(|| options.monitor_selector.clone()),
            from_cache: false,
            duration_ms: start.elapsed().as_millis() as u64,
            warnings,
        })
    }

    fn build_palette_step(&self, image_path: &Path, out_dir: PathBuf) -> Step {
        let image_path = image_path.to_path_buf();
        let backend_id: Arc<str> = Arc::from(self.config.palette.backend.backend_id());
        let backend_options = self.config.palette.backend_options.clone();
        let engine = Arc::clone(&self.template_engine);
        let formats = self.config.palette.formats.clone();

        Step::new("palette", true, move || {
            let registry = BackendRegistry::new();
            let backend = match registry.get(&backend_id) {
                Some(backend) => backend,
                None => return StepOutcome::Failed(StructuredError::new("palette", ErrorKind::BackendUnavailable)),
            };

            let result = backend.extract(&image_path, &backend_options).or_else(|e| {
                if matches!(e.kind, ErrorKind::BackendUnavailable) {
                    match registry.fallback(&backend_id) {
                        Some(fallback) => fallback.extract(&image_path, &backend_options),
                        None => Err(e),
                    }
                } else {
                    Err(e)
                }
            });

            let palette = match result {
                Ok(p) => p,
                Err(e) => return StepOutcome::Failed(e),
            };

            // Rendering is part of the palette step, not a separate entry: a
            // deterministic template failure should fail the step exactly
            // like the extraction it depends on (spec §7 `TemplateFailed`).
            if let Err(e) = render::render(&palette, engine.as_ref(), &out_dir, &formats) {
                return StepOutcome::Failed(e);
            }

            StepOutcome::Ok(StepValue::Palette(palette))
        })
        .with_max_attempts(self.config.pipeline.step_max_attempts)
        .with_timeout(Duration::from_millis(self.config.pipeline.step_timeout_ms))
        .with_weight(self.config.palette_weight())
    }

    fn build_variants_step(
        &self,
        image_path: &Path,
        fingerprint: Fingerprint,
        out_dir: PathBuf,
        warnings: Arc<Mutex<Vec<StructuredError>>>,
        reporter: Arc<dyn Reporter>,
    ) -> Step {
        let image_path = image_path.to_path_buf();
        let preferred_engine: Arc<str> = Arc::from(self.config.effects.preferred_engine.engine_id());
        let variants = self.config.variants.clone();
        let concurrency = self.config.effects.concurrency;
        let scratch_dir = out_dir.join(".chain-scratch");

        Step::new("variants", true, move || {
            if variants.is_empty() {
                return StepOutcome::Skipped(Arc::from("no variants configured"));
            }

            let registry = EffectRegistry::new();
            let outcomes = chain::generate(&registry, &preferred_engine, &image_path, &fingerprint, &variants, &out_dir, &scratch_dir, None, concurrency);

            let mut set = VariantSet::new();
            let mut any_critical_failure = false;
            let mut last_error = None;

            for (spec, outcome) in variants.iter().zip(outcomes) {
                match outcome {
                    chain::VariantOutcome::Written(variant) => {
                        set.insert(Arc::clone(&spec.name), variant);
                    }
                    chain::VariantOutcome::Failed(e) => {
                        if spec.critical {
                            any_critical_failure = true;
                        } else {
                            // Non-critical: the step itself still succeeds, but
                            // the failure must surface in the final result's
                            // `warnings` the same way a `Failed` outcome would.
                            reporter.on_error("variants", &e);
                            warnings.lock().unwrap().push(e.clone());
                        }
                        last_error = Some(e);
                    }
                }
            }

            let _ = std::fs::remove_dir_all(&scratch_dir);

            match (any_critical_failure, last_error) {
                (true, Some(e)) => StepOutcome::Failed(e),
                _ => StepOutcome::Ok(StepValue::Variants(set)),
            }
        })
        .with_max_attempts(1)
        .with_timeout(Duration::from_millis(self.config.pipeline.step_timeout_ms))
        .with_weight(self.config.variants_weight())
    }

    fn build_apply_step(&self, image_path: &Path, monitor_selector: MonitorSelector) -> Step {
        let image_path = image_path.to_path_buf();
        let applier = Arc::clone(&self.applier);

        Step::new("apply", false, move || match applier.set(&image_path, &monitor_selector) {
            Ok(()) => StepOutcome::Ok(StepValue::Applied(true)),
            Err(e) => StepOutcome::Failed(e),
        })
        .with_max_attempts(1)
        .with_timeout(Duration::from_millis(self.config.pipeline.step_timeout_ms))
        .with_weight(1.0)
    }

    fn run_apply(&self, image_path: &Path, options: &OrchestrationOptions) -> (bool, Vec<StructuredError>) {
        match self.applier.set(image_path, &options.monitor_selector) {
            Ok(()) => (true, Vec::new()),
            Err(e) => {
                options.reporter.on_error("apply", &e);
                (false, vec![e])
            }
        }
    }
}

/// Spec §4.7 options carry `output_palette_dir?`/`output_variants_dir?`: when
/// set, the cache's authoritative files are copied there so the cache root
/// stays the single source of truth an operator-facing directory mirrors.
fn copy_outputs(source_dir: &Path, dest_dir: &Option<PathBuf>) -> Result<(), StructuredError> {
    let Some(dest_dir) = dest_dir else { return Ok(()) };
    std::fs::create_dir_all(dest_dir).map_err(|e| StructuredError::new("orchestrator", ErrorKind::Internal { reason: Arc::from(e.to_string()) }))?;

    for entry in std::fs::read_dir(source_dir).map_err(|e| StructuredError::new("orchestrator", ErrorKind::Internal { reason: Arc::from(e.to_string()) }))? {
        let entry = entry.map_err(|e| StructuredError::new("orchestrator", ErrorKind::Internal { reason: Arc::from(e.to_string()) }))?;
        let path = entry.path();
        if path.is_file() {
            let dest = dest_dir.join(entry.file_name());
            std::fs::copy(&path, &dest).map_err(|e| StructuredError::new("orchestrator", ErrorKind::Internal { reason: Arc::from(e.to_string()) }))?;
        }
    }
    Ok(())
}

impl WallpaperConfig {
    fn palette_weight(&self) -> f64 {
        1.0
    }

    fn variants_weight(&self) -> f64 {
        self.variants.len().max(1) as f64
    }
}
