//! Renders a [`Palette`] into named output files via a [`TemplateEngine`].
//!
//! The variable-binding scheme (`color0`..`color15`, `background`,
//! `foreground`, `cursor`, each exposing `.hex`/`.rgb`/`.r`/`.g`/`.b`)
//! generalizes `wallflow`'s `TemplateEngine::build_variables`, which builds
//! the same family of pywal-compatible keys for a fixed color scheme.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::atomic::write_atomic;
use crate::config::OutputFormat;
use crate::error::{ErrorKind, StructuredError};
use crate::template::{TemplateEngine, TemplateEngineError};

use super::Palette;

/// Mapping from format name to the absolute path of its rendered file.
pub type PaletteOutputSet = BTreeMap<OutputFormat, PathBuf>;

fn push_color_vars(vars: &mut BTreeMap<String, String>, prefix: &str, color: crate::color::Color) {
    vars.insert(prefix.to_string(), color.to_hex());
    vars.insert(format!("{prefix}.hex"), color.to_hex());
    vars.insert(format!("{prefix}.rgb"), format!("{},{},{}", color.r, color.g, color.b));
    vars.insert(format!("{prefix}.r"), color.r.to_string());
    vars.insert(format!("{prefix}.g"), color.g.to_string());
    vars.insert(format!("{prefix}.b"), color.b.to_string());
}

/// Build the full variable binding for `palette`: every ANSI slot plus the
/// three distinguished colors.
pub fn build_variables(palette: &Palette) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for (i, color) in palette.colors.iter().enumerate() {
        push_color_vars(&mut vars, &format!("color{i}"), *color);
    }
    push_color_vars(&mut vars, "background", palette.background);
    push_color_vars(&mut vars, "foreground", palette.foreground);
    push_color_vars(&mut vars, "cursor", palette.cursor);
    vars
}

fn map_template_error(format: OutputFormat, err: TemplateEngineError) -> StructuredError {
    let reason = match err {
        TemplateEngineError::NotFound(name) => format!("template {name:?} not found"),
        TemplateEngineError::MissingVariable { template, variable } => {
            format!("template {template:?} missing required variable {variable:?}")
        }
        TemplateEngineError::Syntax { template, reason } => format!("template {template:?}: {reason}"),
    };
    StructuredError::new(
        "palette:render",
        ErrorKind::TemplateFailed { reason: Arc::from(reason) },
    )
    .with_inner(format!("format={format:?}"))
}

/// Render `palette` through `engine` for every format in `formats`, writing
/// each result atomically to `<out_dir>/colors.<ext>`.
///
/// Strict mode (spec §4.3 default): a missing template or missing required
/// variable is a [`ErrorKind::TemplateFailed`], not a partial render.
pub fn render(
    palette: &Palette,
    engine: &dyn TemplateEngine,
    out_dir: &Path,
    formats: &[OutputFormat],
) -> Result<PaletteOutputSet, StructuredError> {
    let vars = build_variables(palette);
    let available = engine.available_templates();
    let mut output = PaletteOutputSet::new();

    for &format in formats {
        let template_name = format.template_name();
        if !available.contains(&template_name) {
            return Err(map_template_error(format, TemplateEngineError::NotFound(template_name)));
        }

        if let Some(required) = engine.required_variables(&template_name) {
            for variable in &required {
                if !vars.contains_key(variable) {
                    return Err(map_template_error(
                        format,
                        TemplateEngineError::MissingVariable { template: template_name.clone(), variable: variable.clone() },
                    ));
                }
            }
        }

        let rendered = engine
            .render(&template_name, &vars)
            .map_err(|e| map_template_error(format, e))?;

        let out_path = out_dir.join(format!("colors.{}", format.extension()));
        write_atomic(&out_path, rendered.as_bytes()).map_err(|e| {
            StructuredError::new(
                "palette:render",
                ErrorKind::TemplateFailed { reason: Arc::from(format!("write failed: {e}")) },
            )
        })?;

        output.insert(format, out_path);
    }

    Ok(output)
}
