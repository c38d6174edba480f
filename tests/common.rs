#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::{ImageBuffer, Rgba};

use wallwright::applier::{Applier, MonitorSelector};
use wallwright::config::{
    BackendOptions, CacheConfig, EffectsConfig, EngineKind, OrchestratorConfig, OutputFormat, PaletteBackendKind, PaletteConfig, PipelineConfig, VariantSpec, WallpaperConfig,
};
use wallwright::error::{ErrorKind, StructuredError};
use wallwright::template::{TemplateEngine, TemplateEngineError};

pub struct RecordingApplier {
    pub fail: bool,
    pub calls: Mutex<Vec<(PathBuf, MonitorSelector)>>,
}

impl RecordingApplier {
    pub fn new(fail: bool) -> Self {
        Self { fail, calls: Mutex::new(Vec::new()) }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Applier for RecordingApplier {
    fn set(&self, image_path: &Path, monitor_selector: &MonitorSelector) -> Result<(), StructuredError> {
        self.calls.lock().unwrap().push((image_path.to_path_buf(), monitor_selector.clone()));
        if self.fail {
            return Err(StructuredError::new("apply", ErrorKind::ApplyFailed { reason: Arc::from("no compositor") }));
        }
        Ok(())
    }
}

/// A `{variable}`-substitution engine standing in for a real one, matching
/// spec §1's "template engine (interface only)".
pub struct StubTemplateEngine {
    pub templates: BTreeMap<String, String>,
}

impl StubTemplateEngine {
    pub fn json_only() -> Self {
        let mut templates = BTreeMap::new();
        templates.insert("colors.json.tmpl".to_string(), "{\"background\": \"{background}\"}".to_string());
        Self { templates }
    }
}

impl TemplateEngine for StubTemplateEngine {
    fn render(&self, template_name: &str, variables: &BTreeMap<String, String>) -> Result<String, TemplateEngineError> {
        let template = self.templates.get(template_name).ok_or_else(|| TemplateEngineError::NotFound(template_name.to_string()))?;
        let mut rendered = template.clone();
        for (key, value) in variables {
            rendered = rendered.replace(&format!("{{{key}}}"), value);
        }
        Ok(rendered)
    }

    fn available_templates(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }

    fn required_variables(&self, _template_name: &str) -> Option<Vec<String>> {
        None
    }
}

pub fn write_test_image(path: &Path) {
    let img: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_fn(8, 8, |x, y| {
        if (x + y) % 2 == 0 {
            Rgba([10, 20, 30, 255])
        } else {
            Rgba([200, 210, 220, 255])
        }
    });
    img.save(path).unwrap();
}

pub fn write_distinct_image(path: &Path) {
    let img: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_fn(8, 8, |_, _| Rgba([250, 30, 90, 255]));
    img.save(path).unwrap();
}

pub fn minimal_config(cache_root: &Path, templates_dir: &Path) -> WallpaperConfig {
    WallpaperConfig {
        cache: CacheConfig {
            root: cache_root.to_path_buf(),
            max_bytes: 1 << 30,
            max_entries: 256,
            low_watermark_bytes: 1 << 20,
            schema_version: 1,
            lock_timeout_ms: 1000,
        },
        palette: PaletteConfig {
            backend: PaletteBackendKind::InProcess,
            backend_options: BackendOptions::default(),
            templates_dir: templates_dir.to_path_buf(),
            formats: vec![OutputFormat::Json],
        },
        variants: vec![VariantSpec { name: Arc::from("grayscale"), chain: vec![wallwright::config::EffectSpec::Grayscale], critical: false }],
        effects: EffectsConfig { preferred_engine: EngineKind::InProcess, concurrency: 2 },
        pipeline: PipelineConfig { step_timeout_ms: 10_000, step_max_attempts: 1 },
        orchestrator: OrchestratorConfig { allow_cache: true },
    }
}
