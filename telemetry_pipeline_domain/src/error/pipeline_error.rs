// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! A hierarchical error type for the telemetry pipeline runtime. Errors are
//! organized into categories so that callers can decide whether to retry,
//! route to a dead-letter path, or abort the pipeline.
//!
//! ## Error Categories
//!
//! - **Configuration** - malformed or missing settings (`InvalidConfiguration`,
//!   `IncompatibleStage`)
//! - **Data** - malformed events or keys (`InvalidEvent`, `InvalidKey`,
//!   `UnknownField`, `TypeMismatch`)
//! - **Evaluation** - expression evaluation failures (`ExpressionEvaluation`)
//! - **Backpressure** - bounded-buffer and shutdown signaling (`BufferFull`,
//!   `Shutdown`, `BarrierBroken`)
//! - **Infrastructure** - I/O, database, network (`IoError`, `DatabaseError`,
//!   `ResourceExhausted`, `TimeoutError`)
//! - **System** - unexpected failures (`InternalError`, `PluginError`,
//!   `MetricsError`, `Cancelled`)

use thiserror::Error;

/// Domain-specific errors for the telemetry pipeline.
///
/// Each variant carries a descriptive message. `category()` groups variants
/// for metrics and logging; `is_recoverable()` tells a caller whether a retry
/// is worth attempting.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Incompatible stage: {0}")]
    IncompatibleStage(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Invalid key path: {0}")]
    InvalidKey(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Expression evaluation failed: {0}")]
    ExpressionEvaluation(String),

    #[error("Buffer full: {0}")]
    BufferFull(String),

    #[error("Shutdown in progress: {0}")]
    Shutdown(String),

    #[error("Barrier broken: {0}")]
    BarrierBroken(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Integrity check failed: {0}")]
    IntegrityError(String),

    #[error("Security violation: {0}")]
    SecurityViolation(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Plugin error: {0}")]
    PluginError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),
}

impl PipelineError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn invalid_event(msg: impl Into<String>) -> Self {
        Self::InvalidEvent(msg.into())
    }

    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    pub fn unknown_field(msg: impl Into<String>) -> Self {
        Self::UnknownField(msg.into())
    }

    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        Self::TypeMismatch(msg.into())
    }

    pub fn expression_evaluation(msg: impl Into<String>) -> Self {
        Self::ExpressionEvaluation(msg.into())
    }

    pub fn buffer_full(msg: impl Into<String>) -> Self {
        Self::BufferFull(msg.into())
    }

    pub fn shutdown(msg: impl Into<String>) -> Self {
        Self::Shutdown(msg.into())
    }

    pub fn barrier_broken(msg: impl Into<String>) -> Self {
        Self::BarrierBroken(msg.into())
    }

    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    pub fn security_violation(msg: impl Into<String>) -> Self {
        Self::SecurityViolation(msg.into())
    }

    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::IoError(msg.into())
    }

    pub fn database_error(msg: impl Into<String>) -> Self {
        Self::DatabaseError(msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    pub fn metrics_error(msg: impl Into<String>) -> Self {
        Self::MetricsError(msg.into())
    }

    /// Whether retrying the operation that produced this error is worthwhile.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::TimeoutError(_)
                | PipelineError::ResourceExhausted(_)
                | PipelineError::IoError(_)
                | PipelineError::BufferFull(_)
                | PipelineError::DatabaseError(_)
        )
    }

    /// Whether this error should be treated as a security incident for
    /// audit logging.
    pub fn is_security_error(&self) -> bool {
        matches!(self, PipelineError::SecurityViolation(_) | PipelineError::IntegrityError(_))
    }

    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::InvalidConfiguration(_) => "configuration",
            PipelineError::IncompatibleStage(_) => "configuration",
            PipelineError::InvalidEvent(_) => "data",
            PipelineError::InvalidKey(_) => "data",
            PipelineError::UnknownField(_) => "data",
            PipelineError::TypeMismatch(_) => "data",
            PipelineError::ExpressionEvaluation(_) => "evaluation",
            PipelineError::BufferFull(_) => "backpressure",
            PipelineError::Shutdown(_) => "backpressure",
            PipelineError::BarrierBroken(_) => "backpressure",
            PipelineError::ProcessingFailed(_) => "processing",
            PipelineError::IntegrityError(_) => "integrity",
            PipelineError::SecurityViolation(_) => "security",
            PipelineError::ResourceExhausted(_) => "resource",
            PipelineError::IoError(_) => "io",
            PipelineError::DatabaseError(_) => "database",
            PipelineError::SerializationError(_) => "serialization",
            PipelineError::ValidationError(_) => "validation",
            PipelineError::PluginError(_) => "plugin",
            PipelineError::TimeoutError(_) => "timeout",
            PipelineError::Cancelled(_) => "cancellation",
            PipelineError::PipelineNotFound(_) => "pipeline",
            PipelineError::InternalError(_) => "internal",
            PipelineError::MetricsError(_) => "metrics",
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_errors_are_flagged() {
        assert!(PipelineError::buffer_full("full").is_recoverable());
        assert!(PipelineError::TimeoutError("slow".into()).is_recoverable());
        assert!(!PipelineError::invalid_config("bad").is_recoverable());
    }

    #[test]
    fn security_errors_are_flagged() {
        assert!(PipelineError::security_violation("nope").is_security_error());
        assert!(!PipelineError::invalid_event("bad").is_security_error());
    }

    #[test]
    fn category_groups_variants() {
        assert_eq!(PipelineError::buffer_full("x").category(), "backpressure");
        assert_eq!(PipelineError::invalid_key("x").category(), "data");
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: PipelineError = io_err.into();
        assert_eq!(err.category(), "io");
    }
}
