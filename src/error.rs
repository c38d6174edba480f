//! Structured error taxonomy shared across every component.
//!
//! Steps never raise to the executor; they *return* [`StepOutcome`]
//! (see [`crate::pipeline`]), and a `Failed` outcome always carries a
//! [`StructuredError`]. The `kind` taxonomy and its handling policy are
//! fixed by spec §7; this module is the single place that encodes both.

use std::fmt;
use std::sync::Arc;

use crate::fingerprint::Fingerprint;

/// Why an [`ErrorKind::EffectFailed`] occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectFailure {
    /// Neither the preferred nor the fallback engine registers this effect kind.
    NoEngine,
    /// The engine that does support this effect kind failed to apply it.
    EngineError,
}

impl fmt::Display for EffectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoEngine => write!(f, "no engine registers this effect kind"),
            Self::EngineError => write!(f, "engine failed to apply effect"),
        }
    }
}

/// The fixed taxonomy from spec §7. Each variant's handling policy lives in
/// the component that produces it (retry counts, fallback, criticality);
/// this enum only carries identity and display text.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("image could not be decoded")]
    ImageInvalid,

    #[error("backend prerequisites are not present")]
    BackendUnavailable,

    #[error("color extraction failed: {reason}")]
    ExtractionFailed { reason: Arc<str> },

    #[error("effect failed: {0}")]
    EffectFailed(EffectFailure),

    #[error("template rendering failed: {reason}")]
    TemplateFailed { reason: Arc<str> },

    #[error("cache entry is corrupt: {reason}")]
    CacheCorrupt { reason: Arc<str> },

    #[error("cache quota exceeded and could not be pruned enough")]
    CacheQuotaExceeded,

    #[error("applying the wallpaper failed: {reason}")]
    ApplyFailed { reason: Arc<str> },

    #[error("operation was cancelled")]
    Cancelled,

    #[error("internal error: {reason}")]
    Internal { reason: Arc<str> },
}

impl ErrorKind {
    /// Whether this kind is non-critical by default policy (spec §7), absent
    /// an explicit per-step/per-variant criticality override.
    pub fn default_recoverable(&self) -> bool {
        match self {
            ErrorKind::ImageInvalid => false,
            ErrorKind::BackendUnavailable => false,
            ErrorKind::ExtractionFailed { .. } => false,
            ErrorKind::EffectFailed(_) => true,
            ErrorKind::TemplateFailed { .. } => false,
            ErrorKind::CacheCorrupt { .. } => true,
            ErrorKind::CacheQuotaExceeded => true,
            ErrorKind::ApplyFailed { .. } => true,
            ErrorKind::Cancelled => false,
            ErrorKind::Internal { .. } => false,
        }
    }
}

/// `{kind, step_name, message, source_image_fingerprint?, recoverable, inner?}`
/// as specified in spec §3. This is the only error type that crosses a step
/// boundary into [`crate::pipeline::PipelineContext::errors`].
#[derive(Debug, Clone)]
pub struct StructuredError {
    pub kind: ErrorKind,
    pub step_name: Arc<str>,
    pub message: Arc<str>,
    pub source_image_fingerprint: Option<Fingerprint>,
    pub recoverable: bool,
    pub inner: Option<Arc<str>>,
}

impl StructuredError {
    pub fn new(step_name: impl Into<Arc<str>>, kind: ErrorKind) -> Self {
        let recoverable = kind.default_recoverable();
        let message: Arc<str> = Arc::from(kind.to_string());
        Self {
            kind,
            step_name: step_name.into(),
            message,
            source_image_fingerprint: None,
            recoverable,
            inner: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.source_image_fingerprint = Some(fingerprint);
        self
    }

    pub fn with_recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    pub fn with_inner(mut self, inner: impl fmt::Display) -> Self {
        self.inner = Some(Arc::from(inner.to_string()));
        self
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.step_name, self.message)?;
        if let Some(inner) = &self.inner {
            write!(f, " ({inner})")?;
        }
        Ok(())
    }
}

impl std::error::Error for StructuredError {}
