mod pipeline_error;

pub use pipeline_error::PipelineError;

/// Convenience alias used throughout the domain and runtime crates.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
