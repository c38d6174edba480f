use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use wallwright::color::Color;
use wallwright::config::OutputFormat;
use wallwright::error::ErrorKind;
use wallwright::palette::canonical::{colors_from_json_bytes, to_json_bytes};
use wallwright::palette::render::render;
use wallwright::palette::{Palette, Provenance};
use wallwright::template::{TemplateEngine, TemplateEngineError};

fn sample_palette() -> Palette {
    let mut colors = [Color::new(0, 0, 0); 16];
    for (i, c) in colors.iter_mut().enumerate() {
        *c = Color::new(i as u8, i as u8, i as u8);
    }
    Palette {
        colors,
        background: Color::new(0, 0, 0),
        foreground: Color::new(255, 255, 255),
        cursor: Color::new(255, 0, 0),
        provenance: Provenance {
            source_image_absolute_path: PathBuf::from("/tmp/a.png"),
            backend_id: Arc::from("in-process:kmeans"),
            generated_at_utc: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            seed: Some(0),
        },
    }
}

#[test]
fn round_trips_color_data() {
    let palette = sample_palette();
    let bytes = to_json_bytes(&palette).unwrap();
    let (colors, bg, fg, cursor) = colors_from_json_bytes(&bytes).unwrap();
    assert_eq!(colors, palette.colors);
    assert_eq!(bg, palette.background);
    assert_eq!(fg, palette.foreground);
    assert_eq!(cursor, palette.cursor);
}

#[test]
fn serialization_is_deterministic() {
    let palette = sample_palette();
    let a = to_json_bytes(&palette).unwrap();
    let b = to_json_bytes(&palette).unwrap();
    assert_eq!(a, b);
}

#[test]
fn rejects_truncated_json() {
    assert!(colors_from_json_bytes(b"{\"special\": {}}").is_err());
}

struct FakeEngine;

impl TemplateEngine for FakeEngine {
    fn render(&self, template_name: &str, variables: &std::collections::BTreeMap<String, String>) -> Result<String, TemplateEngineError> {
        if template_name == "colors.json.tmpl" {
            Ok(format!("{{\"background\": \"{}\"}}", variables.get("background").unwrap()))
        } else {
            Err(TemplateEngineError::NotFound(template_name.to_string()))
        }
    }

    fn available_templates(&self) -> Vec<String> {
        vec!["colors.json.tmpl".to_string()]
    }

    fn required_variables(&self, _template_name: &str) -> Option<Vec<String>> {
        Some(vec!["background".to_string()])
    }
}

fn render_sample_palette() -> Palette {
    Palette {
        colors: [Color::new(10, 20, 30); 16],
        background: Color::new(0, 0, 0),
        foreground: Color::new(255, 255, 255),
        cursor: Color::new(255, 0, 0),
        provenance: Provenance {
            source_image_absolute_path: PathBuf::from("/tmp/a.png"),
            backend_id: Arc::from("in-process:kmeans"),
            generated_at_utc: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            seed: None,
        },
    }
}

#[test]
fn renders_configured_formats_only() {
    let dir = tempfile::tempdir().unwrap();
    let palette = render_sample_palette();
    let output = render(&palette, &FakeEngine, dir.path(), &[OutputFormat::Json]).unwrap();
    assert_eq!(output.keys().copied().collect::<Vec<_>>(), vec![OutputFormat::Json]);
    assert!(output[&OutputFormat::Json].exists());
}

#[test]
fn missing_template_is_template_failed() {
    let dir = tempfile::tempdir().unwrap();
    let palette = render_sample_palette();
    let err = render(&palette, &FakeEngine, dir.path(), &[OutputFormat::Css]).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::TemplateFailed { .. }));
}

#[test]
fn rejects_matching_background_and_foreground() {
    let c = Color::new(0x10, 0x10, 0x10);
    let palette = Palette {
        colors: [c; 16],
        background: c,
        foreground: c,
        cursor: Color::new(0xff, 0, 0),
        provenance: sample_palette().provenance,
    };
    assert!(palette.validate().is_err());
}

#[test]
fn accepts_distinct_background_and_foreground() {
    let palette = Palette {
        colors: [Color::new(0, 0, 0); 16],
        background: Color::new(0, 0, 0),
        foreground: Color::new(0xff, 0xff, 0xff),
        cursor: Color::new(0xff, 0, 0),
        provenance: sample_palette().provenance,
    };
    assert!(palette.validate().is_ok());
}
