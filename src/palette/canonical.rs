//! Canonical `palette.json` serialization: `{special: {...}, colors: {...}}`.
//!
//! Generalizes the teacher's `snapshot.rs` (`to_json`/`to_json_value` over a
//! `Palette`) from the theme-manifest shape to the on-disk wire format spec
//! §6 defines for cache entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::error::{ErrorKind, StructuredError};

use super::Palette;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SpecialColors {
    background: Color,
    foreground: Color,
    cursor: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CanonicalPalette {
    special: SpecialColors,
    colors: BTreeMap<String, Color>,
}

/// Serialize `palette` into the canonical `palette.json` bytes.
///
/// Map keys are sorted (`BTreeMap`) so two serializations of an
/// equal palette are byte-identical, satisfying spec §8's
/// `render(parse(palette.json)) == palette.json` round-trip law.
pub fn to_json_bytes(palette: &Palette) -> Result<Vec<u8>, StructuredError> {
    let mut colors = BTreeMap::new();
    for (i, color) in palette.colors.iter().enumerate() {
        colors.insert(format!("color{i}"), *color);
    }
    let canonical = CanonicalPalette {
        special: SpecialColors {
            background: palette.background,
            foreground: palette.foreground,
            cursor: palette.cursor,
        },
        colors,
    };
    serde_json::to_vec_pretty(&canonical).map_err(|e| {
        StructuredError::new("palette:canonical", ErrorKind::Internal { reason: std::sync::Arc::from(e.to_string()) })
    })
}

/// Reconstruct just the color data from a previously-written `palette.json`.
///
/// Provenance is not recoverable from the canonical JSON (it lives in the
/// cache entry's `manifest.toml`); callers that need a full [`Palette`]
/// reattach provenance themselves after calling this.
pub fn colors_from_json_bytes(bytes: &[u8]) -> Result<([Color; 16], Color, Color, Color), StructuredError> {
    let canonical: CanonicalPalette = serde_json::from_slice(bytes).map_err(|e| {
        StructuredError::new(
            "palette:canonical",
            ErrorKind::CacheCorrupt { reason: std::sync::Arc::from(format!("palette.json parse error: {e}")) },
        )
    })?;

    let mut colors = [Color::new(0, 0, 0); 16];
    for (i, slot) in colors.iter_mut().enumerate() {
        let key = format!("color{i}");
        *slot = *canonical.colors.get(&key).ok_or_else(|| {
            StructuredError::new(
                "palette:canonical",
                ErrorKind::CacheCorrupt { reason: std::sync::Arc::from(format!("palette.json missing {key}")) },
            )
        })?;
    }

    Ok((colors, canonical.special.background, canonical.special.foreground, canonical.special.cursor))
}
