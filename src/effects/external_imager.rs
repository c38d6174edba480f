//! External imager engine (spec §4.4): shells out to an ImageMagick-like
//! `convert` tool, deriving its command line from `effect_kind` and params.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use crate::config::EffectSpec;
use crate::error::StructuredError;

use super::EffectEngine;

const CLI_BINARY: &str = "convert";

#[derive(Default)]
pub struct ExternalImagerEngine;

fn args_for(spec: &EffectSpec) -> Vec<String> {
    match spec {
        EffectSpec::Blur { radius } => vec!["-blur".into(), format!("0x{radius}")],
        EffectSpec::Brightness { factor } => vec!["-modulate".into(), format!("{},100,100", factor * 100.0)],
        EffectSpec::Saturation { factor } => vec!["-modulate".into(), format!("100,{},100", factor * 100.0)],
        EffectSpec::Grayscale => vec!["-colorspace".into(), "Gray".into()],
        EffectSpec::Vignette { strength, falloff } => {
            vec!["-vignette".into(), format!("{}x{}", strength * 100.0, falloff * 100.0)]
        }
        EffectSpec::ColorOverlay { color, opacity } => {
            vec!["-fill".into(), color.to_hex(), "-colorize".into(), format!("{}", opacity * 100.0)]
        }
        EffectSpec::Negate => vec!["-negate".into()],
    }
}

impl EffectEngine for ExternalImagerEngine {
    fn engine_id(&self) -> &str {
        "external-imager"
    }

    fn supports(&self, effect_kind: &str) -> bool {
        matches!(
            effect_kind,
            "blur" | "brightness" | "saturation" | "grayscale" | "vignette" | "color_overlay" | "negate"
        )
    }

    fn is_available(&self) -> bool {
        which::which(CLI_BINARY).is_ok()
    }

    fn apply(&self, spec: &EffectSpec, input_path: &Path, output_path: &Path) -> Result<(), StructuredError> {
        let mut command = Command::new(CLI_BINARY);
        command.arg(input_path);
        command.args(args_for(spec));
        command.arg(output_path);

        let status = command.status().map_err(|e| {
            StructuredError::new("effects:external-imager", crate::error::ErrorKind::Internal { reason: Arc::from(e.to_string()) })
        })?;

        if !status.success() {
            return Err(StructuredError::new(
                "effects:external-imager",
                crate::error::ErrorKind::Internal { reason: Arc::from(format!("{CLI_BINARY} exited with {status}")) },
            ));
        }
        Ok(())
    }
}
