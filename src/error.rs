use std::fmt;

use thiserror::Error;

/// Structured error hierarchy for `ragward`.
///
/// Policy blocks are NOT errors: a blocked query is an expected,
/// user-visible outcome carried inside a successful `ChatResult`. Errors
/// cover the failure families around the pipeline: a collaborator being
/// unavailable, input that never enters the pipeline, and configuration
/// problems.
#[derive(Debug, Error)]
pub enum GuardrailError {
    /// Empty or whitespace-only query; rejected before the pipeline runs
    /// and never logged as a security event.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A retrieval/generation/document-store collaborator failed or timed
    /// out. Recovered locally; never logged as a security event.
    #[error("upstream {stage} unavailable: {message}")]
    Upstream {
        stage: UpstreamStage,
        message: String,
    },

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // Generic fallthrough (wraps anyhow for interop)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Which external collaborator failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamStage {
    Retrieval,
    Generation,
    DocumentStore,
}

impl fmt::Display for UpstreamStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Retrieval => "retrieval",
            Self::Generation => "generation",
            Self::DocumentStore => "document store",
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, GuardrailError>;
