//! Wallust-like external backend (spec §4.2, §9).
//!
//! The tool writes a per-image content-hash directory under its cache root;
//! this backend scans for the most-recently-modified subdirectory and reads
//! the file whose name matches the configured `<Backend>_<Colorspace>_<Threshold>_<Palette>`
//! pattern. Per spec §9's open question, "most-recent-mtime" is a documented
//! inference from the source's behavior, not a verified stable key — see
//! `DESIGN.md` for the resolution.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::Utc;

use crate::config::BackendOptions;
use crate::error::{ErrorKind, StructuredError};
use crate::palette::canonical::colors_from_json_bytes;
use crate::palette::{Palette, Provenance};

use super::ColorBackend;

const CLI_BINARY: &str = "wallust";

pub struct ExternalWallustBackend {
    cache_dir: PathBuf,
}

impl Default for ExternalWallustBackend {
    fn default() -> Self {
        Self {
            cache_dir: dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".")).join("wallust"),
        }
    }
}

impl ExternalWallustBackend {
    fn run_cli(&self, image_path: &Path) -> Result<(), StructuredError> {
        let status = Command::new(CLI_BINARY)
            .arg("run")
            .arg(image_path)
            .arg("--skip-sequences")
            .arg("--skip-templates")
            .status()
            .map_err(|e| StructuredError::new("palette:extract", ErrorKind::BackendUnavailable).with_inner(e))?;

        if !status.success() {
            return Err(StructuredError::new(
                "palette:extract",
                ErrorKind::ExtractionFailed { reason: Arc::from(format!("{CLI_BINARY} exited with {status}")) },
            ));
        }
        Ok(())
    }

    /// The most-recently-modified subdirectory of the tool's cache root.
    fn most_recent_subdir(&self) -> Result<PathBuf, StructuredError> {
        let entries = std::fs::read_dir(&self.cache_dir).map_err(|e| {
            StructuredError::new(
                "palette:extract",
                ErrorKind::ExtractionFailed { reason: Arc::from(format!("reading {}: {e}", self.cache_dir.display())) },
            )
        })?;

        let mut best: Option<(PathBuf, SystemTime)> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Ok(metadata) = entry.metadata() else { continue };
            let Ok(modified) = metadata.modified() else { continue };
            match &best {
                Some((_, best_time)) if *best_time >= modified => {}
                _ => best = Some((path, modified)),
            }
        }

        best.map(|(path, _)| path).ok_or_else(|| {
            StructuredError::new(
                "palette:extract",
                ErrorKind::ExtractionFailed { reason: Arc::from("no output subdirectory found") },
            )
        })
    }
}

impl ColorBackend for ExternalWallustBackend {
    fn id(&self) -> &str {
        "wallust-like"
    }

    fn is_available(&self) -> bool {
        which::which(CLI_BINARY).is_ok()
    }

    fn extract(&self, image_path: &Path, options: &BackendOptions) -> Result<Palette, StructuredError> {
        if !self.is_available() {
            return Err(StructuredError::new("palette:extract", ErrorKind::BackendUnavailable));
        }

        self.run_cli(image_path)?;

        let subdir = self.most_recent_subdir()?;
        let output_file = subdir.join(options.wallust_filename.as_ref());
        let bytes = std::fs::read(&output_file).map_err(|e| {
            StructuredError::new(
                "palette:extract",
                ErrorKind::ExtractionFailed { reason: Arc::from(format!("reading {}: {e}", output_file.display())) },
            )
        })?;

        let (colors, background, foreground, cursor) = colors_from_json_bytes(&bytes)?;

        let palette = Palette {
            colors,
            background,
            foreground,
            cursor,
            provenance: Provenance {
                source_image_absolute_path: image_path.to_path_buf(),
                backend_id: Arc::from(self.id()),
                generated_at_utc: Utc::now(),
                seed: None,
            },
        };
        palette.validate().map_err(|reason| {
            StructuredError::new("palette:extract", ErrorKind::ExtractionFailed { reason: Arc::from(reason) })
        })?;
        Ok(palette)
    }
}
