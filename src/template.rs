//! The template engine external interface (spec §6).
//!
//! Out of scope per spec §1: we depend only on `render(template_name, vars)
//! -> string`, not on any concrete templating implementation. Generalizes
//! `wallflow`'s `TemplateEngine::render` (`{variable}` placeholder
//! substitution over a flat string map) from a fixed pywal-compatible
//! variable set to whatever variable set a caller's implementation wants,
//! since the renderer in [`crate::palette::render`] builds the variable map.

use std::collections::BTreeMap;

/// A rendering backend for named templates.
///
/// Implementations are supplied by the caller; this crate ships no concrete
/// engine, matching spec §1's "template engine (interface only)".
pub trait TemplateEngine: Send + Sync {
    /// Render `template_name` with `variables` bound, returning the rendered text.
    fn render(&self, template_name: &str, variables: &BTreeMap<String, String>) -> Result<String, TemplateEngineError>;

    /// Names of templates this engine can currently resolve.
    fn available_templates(&self) -> Vec<String>;

    /// Variable names `template_name` requires to render in strict mode.
    fn required_variables(&self, template_name: &str) -> Option<Vec<String>>;
}

/// Error surface a [`TemplateEngine`] implementation reports.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateEngineError {
    #[error("template {0:?} not found")]
    NotFound(String),
    #[error("template {template:?} is missing required variable {variable:?}")]
    MissingVariable { template: String, variable: String },
    #[error("template {template:?} failed to render: {reason}")]
    Syntax { template: String, reason: String },
}
