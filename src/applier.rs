//! The `Applier` external interface (spec §6): sets the desktop wallpaper
//! for the environments this crate runs under. No concrete implementation
//! ships here — callers supply one per windowing system / compositor,
//! mirroring how [`crate::template::TemplateEngine`] is external-only.

use std::path::Path;

use crate::error::StructuredError;

/// Which monitor(s) a wallpaper set applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorSelector {
    All,
    Focused,
    Named(String),
}

/// `set(image_path, monitor_selector) -> Result<(), StructuredError>` (spec §6).
///
/// Implementations should map failures to [`crate::error::ErrorKind::ApplyFailed`].
pub trait Applier: Send + Sync {
    fn set(&self, image_path: &Path, monitor_selector: &MonitorSelector) -> Result<(), StructuredError>;
}
