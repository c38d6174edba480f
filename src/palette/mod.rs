//! The resolved 16-slot terminal palette plus its distinguished colors.
//!
//! Generalizes the teacher's `Palette` (a bag of named, optional color
//! groups resolved from a theme manifest) into the fixed-shape palette
//! spec §3 describes: exactly 16 ordered ANSI slots, three distinguished
//! colors, and provenance recording how the palette was produced.

pub mod canonical;
pub mod render;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::color::Color;

/// How a palette came to exist, for cache manifests and operator inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source_image_absolute_path: PathBuf,
    pub backend_id: Arc<str>,
    pub generated_at_utc: DateTime<Utc>,
    /// Present only when the backend that produced this palette is stochastic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Exactly 16 ordered ANSI-slot colors plus `{background, foreground, cursor}`.
///
/// `colors[i]` is ANSI slot `i` (`color0`..`color15`). Constructing a
/// `Palette` does not itself enforce `background != foreground`; backends
/// call [`Palette::validate`] before returning one, and the orchestrator
/// treats a failing validation as [`crate::error::ErrorKind::ExtractionFailed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    pub colors: [Color; 16],
    pub background: Color,
    pub foreground: Color,
    pub cursor: Color,
    pub provenance: Provenance,
}

impl Palette {
    /// Checks the invariants spec §3 assigns to a `Palette` that aren't
    /// already enforced by the type (well-formed colors, fixed ordering).
    pub fn validate(&self) -> Result<(), String> {
        if self.background == self.foreground {
            return Err("background and foreground must differ".into());
        }
        Ok(())
    }

    pub fn color(&self, slot: usize) -> Option<Color> {
        self.colors.get(slot).copied()
    }
}
