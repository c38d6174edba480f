//! Typed configuration record for the orchestrator, parsed from TOML.
//!
//! Generalizes the teacher's `PaletteManifest::from_toml` (one `toml::from_str`
//! call producing a validated struct) from a single theme file to the whole
//! pipeline's enumerated option surface (§6).

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, StructuredError};

/// `palette.backend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaletteBackendKind {
    PywalLike,
    WallustLike,
    InProcess,
}

/// `palette.backend_options.algorithm`, only meaningful for `in-process`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantizeAlgorithm {
    Kmeans,
    MedianCut,
    Octree,
}

/// `palette.backend_options.style`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaletteStyle {
    Light,
    Dark,
}

/// Backend-specific tuning for `palette.backend`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendOptions {
    #[serde(default = "default_algorithm")]
    pub algorithm: QuantizeAlgorithm,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_style")]
    pub style: PaletteStyle,
    /// Which of the external tool's library/CLI forms to prefer, when both exist.
    #[serde(default)]
    pub prefer_library: bool,
    /// `wallust-like` backend's output filename components: `Backend`,
    /// `Colorspace`, `Threshold`, `Palette`, joined as `<Backend>_<Colorspace>_<Threshold>_<Palette>`.
    #[serde(default = "default_wallust_filename")]
    pub wallust_filename: Arc<str>,
}

fn default_algorithm() -> QuantizeAlgorithm {
    QuantizeAlgorithm::Kmeans
}

fn default_style() -> PaletteStyle {
    PaletteStyle::Dark
}

fn default_wallust_filename() -> Arc<str> {
    Arc::from("Resized_Lch_auto_Dark")
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            seed: 0,
            style: default_style(),
            prefer_library: false,
            wallust_filename: default_wallust_filename(),
        }
    }
}

/// One recognized output format in `palette.formats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Css,
    Yaml,
    Shell,
    Toml,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Css => "css",
            OutputFormat::Yaml => "yaml",
            OutputFormat::Shell => "sh",
            OutputFormat::Toml => "toml",
        }
    }

    pub fn template_name(&self) -> String {
        format!("colors.{}.tmpl", self.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaletteConfig {
    #[serde(default = "default_palette_backend")]
    pub backend: PaletteBackendKind,
    #[serde(default)]
    pub backend_options: BackendOptions,
    pub templates_dir: PathBuf,
    pub formats: Vec<OutputFormat>,
}

fn default_palette_backend() -> PaletteBackendKind {
    PaletteBackendKind::InProcess
}

impl PaletteBackendKind {
    /// The [`crate::backends::ColorBackend::id`] this config value selects.
    pub fn backend_id(self) -> &'static str {
        match self {
            PaletteBackendKind::PywalLike => "pywal-like",
            PaletteBackendKind::WallustLike => "wallust-like",
            PaletteBackendKind::InProcess => "in-process",
        }
    }
}

/// One entry in `effect_chain_spec`: `{effect, params}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum EffectSpec {
    Blur { radius: f64 },
    Brightness { factor: f64 },
    Saturation { factor: f64 },
    Grayscale,
    Vignette { strength: f64, falloff: f64 },
    ColorOverlay { color: crate::color::Color, opacity: f64 },
    Negate,
}

impl EffectSpec {
    pub fn kind_name(&self) -> &'static str {
        match self {
            EffectSpec::Blur { .. } => "blur",
            EffectSpec::Brightness { .. } => "brightness",
            EffectSpec::Saturation { .. } => "saturation",
            EffectSpec::Grayscale => "grayscale",
            EffectSpec::Vignette { .. } => "vignette",
            EffectSpec::ColorOverlay { .. } => "color_overlay",
            EffectSpec::Negate => "negate",
        }
    }
}

/// One entry in `variants`: `{name, chain, critical}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSpec {
    pub name: Arc<str>,
    pub chain: Vec<EffectSpec>,
    #[serde(default)]
    pub critical: bool,
}

/// `effects.preferred_engine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    ExternalImager,
    InProcess,
}

impl EngineKind {
    /// The [`crate::effects::EffectEngine::engine_id`] this config value selects.
    pub fn engine_id(self) -> &'static str {
        match self {
            EngineKind::ExternalImager => "external-imager",
            EngineKind::InProcess => "in-process",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectsConfig {
    #[serde(default = "default_engine")]
    pub preferred_engine: EngineKind,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_engine() -> EngineKind {
    EngineKind::ExternalImager
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1).max(1))
        .unwrap_or(1)
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            preferred_engine: default_engine(),
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_root")]
    pub root: PathBuf,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_low_watermark")]
    pub low_watermark_bytes: u64,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

/// `<XDG cache>/wallpaper/`, mirroring the `wallflow` default-output-dir
/// split (XDG on Linux/macOS, local-app-data on Windows) rather than a
/// hardcoded Unix path.
fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wallpaper")
}

fn default_max_bytes() -> u64 {
    1 << 30 // 1 GiB
}

fn default_max_entries() -> usize {
    256
}

fn default_low_watermark() -> u64 {
    default_max_bytes() * 3 / 4
}

fn default_schema_version() -> u32 {
    1
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: default_cache_root(),
            max_bytes: default_max_bytes(),
            max_entries: default_max_entries(),
            low_watermark_bytes: default_low_watermark(),
            schema_version: default_schema_version(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
    #[serde(default = "default_step_max_attempts")]
    pub step_max_attempts: u32,
}

fn default_step_timeout_ms() -> u64 {
    30_000
}

fn default_step_max_attempts() -> u32 {
    3
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: default_step_timeout_ms(),
            step_max_attempts: default_step_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_true")]
    pub allow_cache: bool,
}

fn default_true() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { allow_cache: true }
    }
}

/// The full enumerated configuration surface from spec §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallpaperConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    pub palette: PaletteConfig,
    #[serde(default)]
    pub variants: Vec<VariantSpec>,
    #[serde(default)]
    pub effects: EffectsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl WallpaperConfig {
    /// Parse and validate a configuration document.
    ///
    /// Validation beyond what serde enforces structurally: variant names must
    /// be unique and identifier-safe (spec §6).
    pub fn from_toml(s: &str) -> Result<Self, StructuredError> {
        let config: WallpaperConfig = toml::from_str(s).map_err(|e| {
            StructuredError::new(
                "config",
                ErrorKind::Internal { reason: Arc::from(format!("config parse error: {e}")) },
            )
            .with_inner(e)
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), StructuredError> {
        let mut seen = std::collections::HashSet::new();
        for variant in &self.variants {
            if variant.name.is_empty()
                || !variant
                    .name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(StructuredError::new(
                    "config",
                    ErrorKind::Internal {
                        reason: Arc::from(format!("variant name {:?} is not identifier-safe", variant.name)),
                    },
                )
                .with_recoverable(false));
            }
            if !seen.insert(Arc::clone(&variant.name)) {
                return Err(StructuredError::new(
                    "config",
                    ErrorKind::Internal {
                        reason: Arc::from(format!("duplicate variant name {:?}", variant.name)),
                    },
                )
                .with_recoverable(false));
            }
        }
        Ok(())
    }
}
