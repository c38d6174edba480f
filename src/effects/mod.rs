//! Effect engine backends (spec §4.4): apply a named effect to an image via
//! one of two interchangeable engines, discovered through an init-time
//! registry rather than a hard-wired factory (spec §9).

pub mod chain;
pub mod external_imager;
pub mod inprocess_imager;

use std::path::Path;

use crate::config::EffectSpec;
use crate::error::{EffectFailure, ErrorKind, StructuredError};

/// `apply(effect_kind, params, input_path, output_path) -> Ok | Failed` (spec §4.4).
pub trait EffectEngine: Send + Sync {
    fn engine_id(&self) -> &str;
    fn supports(&self, effect_kind: &str) -> bool;
    fn is_available(&self) -> bool;
    fn apply(&self, spec: &EffectSpec, input_path: &Path, output_path: &Path) -> Result<(), StructuredError>;
}

/// Effect kinds are discovered, not hard-wired: each engine registers the
/// kinds it supports at construction, keyed by `(effect_kind, engine_id)`.
pub struct EffectRegistry {
    engines: Vec<Box<dyn EffectEngine>>,
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self {
            engines: vec![
                Box::new(external_imager::ExternalImagerEngine::default()),
                Box::new(inprocess_imager::InProcessImagerEngine),
            ],
        }
    }

    /// Build a registry from an explicit engine list, bypassing the default
    /// discovery above. Exists for tests that need deterministic, fake, or
    /// deliberately-flaky engines rather than the two real ones.
    pub fn with_engines(engines: Vec<Box<dyn EffectEngine>>) -> Self {
        Self { engines }
    }

    /// Resolve an engine for `effect_kind`, preferring `preferred_id`; falls
    /// back to any other engine that supports the kind; `None` if neither does.
    pub fn resolve(&self, effect_kind: &str, preferred_id: &str) -> Option<&dyn EffectEngine> {
        if let Some(engine) = self.engines.iter().find(|e| e.engine_id() == preferred_id && e.supports(effect_kind) && e.is_available()) {
            return Some(engine.as_ref());
        }
        self.engines
            .iter()
            .find(|e| e.engine_id() != preferred_id && e.supports(effect_kind) && e.is_available())
            .map(|e| e.as_ref())
    }

    pub fn apply(
        &self,
        spec: &EffectSpec,
        preferred_id: &str,
        input_path: &Path,
        output_path: &Path,
    ) -> Result<(), StructuredError> {
        let kind = spec.kind_name();
        let engine = self.resolve(kind, preferred_id).ok_or_else(|| {
            StructuredError::new("effects:apply", ErrorKind::EffectFailed(EffectFailure::NoEngine))
        })?;

        engine.apply(spec, input_path, output_path).map_err(|e| {
            StructuredError::new("effects:apply", ErrorKind::EffectFailed(EffectFailure::EngineError)).with_inner(e)
        })
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::new()
    }
}
