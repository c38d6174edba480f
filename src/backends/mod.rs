//! Color extraction backends (spec §4.2): convert an image into a [`Palette`]
//! via one of three interchangeable strategies.
//!
//! The selection/fallback shape follows spec §9's "auto-detect-best-backend
//! factory": an ordered probe of candidates with an `is_available()` check,
//! first success wins, mirroring the teacher's own registry pattern
//! (`Registry::new` pre-populating entries, looked up by id) generalized
//! from theme presets to backend implementations.

pub mod external_wal;
pub mod external_wallust;
pub mod inprocess;

use std::path::Path;

use crate::config::BackendOptions;
use crate::error::StructuredError;
use crate::palette::Palette;

/// `extract(image_path, options) -> Palette | Failed(kind)` (spec §4.2).
pub trait ColorBackend: Send + Sync {
    fn id(&self) -> &str;
    fn is_available(&self) -> bool;
    fn extract(&self, image_path: &Path, options: &BackendOptions) -> Result<Palette, StructuredError>;
}

/// Registered color backends, probed in configured preference order.
pub struct BackendRegistry {
    backends: Vec<Box<dyn ColorBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: vec![
                Box::new(external_wal::ExternalWalBackend::default()),
                Box::new(external_wallust::ExternalWallustBackend::default()),
                Box::new(inprocess::InProcessBackend),
            ],
        }
    }

    pub fn get(&self, id: &str) -> Option<&dyn ColorBackend> {
        self.backends.iter().find(|b| b.id() == id).map(|b| b.as_ref())
    }

    /// The first available backend in registration order, excluding `skip`.
    ///
    /// Implements spec §7's "BackendUnavailable ... triggers fallback backend
    /// if one is configured": the orchestrator calls this with the failed
    /// backend's id once extraction reports `BackendUnavailable`.
    pub fn fallback(&self, skip: &str) -> Option<&dyn ColorBackend> {
        self.backends.iter().find(|b| b.id() != skip && b.is_available()).map(|b| b.as_ref())
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
