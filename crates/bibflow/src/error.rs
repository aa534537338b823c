//! Error types for bibflow

use thiserror::Error;

use bibflow_middleware::PipelineError;

use crate::config::ConfigError;

/// Result type alias for bibflow operations
pub type Result<T> = std::result::Result<T, BibflowError>;

/// Main error type for bibflow operations
///
/// Broken blocks and failed block stages are not errors: they end up in the library as
/// failed blocks. Only configuration problems and library-wide stage failures are.
#[derive(Error, Debug)]
pub enum BibflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

impl BibflowError {
    /// The library as it was before the failing stage, if a stage failed.
    pub fn into_library(self) -> Option<bibflow_model::Library> {
        match self {
            BibflowError::Pipeline(err) => Some(*err.library),
            BibflowError::Config(_) => None,
        }
    }
}
