//! Pywal-like external backend (spec §4.2).
//!
//! Invokes an external color-extraction tool that writes its result as a
//! canonical palette JSON file under its own cache directory, then parses
//! that file with [`crate::palette::canonical`] (the schema the external
//! tool emits — `{special: {...}, colors: {...}}` plus tool-specific extra
//! keys we ignore — matches our own canonical `palette.json` shape).

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use chrono::Utc;

use crate::config::BackendOptions;
use crate::error::{ErrorKind, StructuredError};
use crate::palette::canonical::colors_from_json_bytes;
use crate::palette::{Palette, Provenance};

use super::ColorBackend;

const LIBRARY_CRATE_HINT: &str = "pywal";
const CLI_BINARY: &str = "wal";

/// Whether to invoke the tool as a library call or shell out to its CLI.
///
/// The choice is `options.prefer_library`, a configuration option per spec
/// §4.2 ("the choice is a configuration option").
pub struct ExternalWalBackend {
    cache_dir: PathBuf,
}

impl Default for ExternalWalBackend {
    fn default() -> Self {
        Self {
            cache_dir: dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".")).join("wal"),
        }
    }
}

impl ExternalWalBackend {
    fn cache_json_path(&self) -> PathBuf {
        self.cache_dir.join("colors.json")
    }

    fn run_cli(&self, image_path: &Path) -> Result<(), StructuredError> {
        let status = Command::new(CLI_BINARY)
            .arg("-i")
            .arg(image_path)
            .arg("-n") // skip terminal reload; we only need the cache file
            .status()
            .map_err(|e| {
                StructuredError::new(
                    "palette:extract",
                    ErrorKind::BackendUnavailable,
                )
                .with_inner(e)
            })?;

        if !status.success() {
            return Err(StructuredError::new(
                "palette:extract",
                ErrorKind::ExtractionFailed { reason: Arc::from(format!("{CLI_BINARY} exited with {status}")) },
            ));
        }
        Ok(())
    }
}

impl ColorBackend for ExternalWalBackend {
    fn id(&self) -> &str {
        "pywal-like"
    }

    fn is_available(&self) -> bool {
        which::which(CLI_BINARY).is_ok()
    }

    fn extract(&self, image_path: &Path, options: &BackendOptions) -> Result<Palette, StructuredError> {
        if options.prefer_library {
            // No Rust binding for the library form is vendored; the CLI form
            // is the only path this backend actually exercises.
            tracing::debug!(hint = LIBRARY_CRATE_HINT, "library form requested, falling back to CLI invocation");
        }

        if !self.is_available() {
            return Err(StructuredError::new("palette:extract", ErrorKind::BackendUnavailable));
        }

        self.run_cli(image_path)?;

        let json_path = self.cache_json_path();
        let bytes = std::fs::read(&json_path).map_err(|e| {
            StructuredError::new(
                "palette:extract",
                ErrorKind::ExtractionFailed { reason: Arc::from(format!("reading {}: {e}", json_path.display())) },
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
