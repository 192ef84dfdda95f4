use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Failures raised at the boundaries of the card pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input document could not be read or rendered to text.
    #[error("failed to read text from {path}: {reason}")]
    TextSource { path: PathBuf, reason: String },

    /// The lookup table could not be loaded.
    #[error("enrichment source unavailable: {0}")]
    EnrichmentSource(String),

    /// The form application rejected a write or the regenerate action.
    #[error("form interaction failed: {0}")]
    FormInteraction(String),

    /// Export or persistence of a single record failed.
    #[error("output failed: {0}")]
    Output(String),
}

impl PipelineError {
    pub fn text_source(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::TextSource {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::TextSource { .. } => FailureKind::Io,
            Self::EnrichmentSource(_) => FailureKind::EnrichmentSource,
            Self::FormInteraction(_) => FailureKind::FormInteraction,
            Self::Output(_) => FailureKind::Output,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Io,
    EnrichmentSource,
    FormInteraction,
    Output,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Io => "io",
            Self::EnrichmentSource => "enrichment_source",
            Self::FormInteraction => "form_interaction",
            Self::Output => "output",
        }
    }
}
