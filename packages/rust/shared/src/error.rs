//! Error types for NewsRouter.
//!
//! Library crates use [`NewsRouterError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Per-source and per-stage failures are *not* errors: they are contained and
//! recorded in the run's [`ErrorLedger`](crate::ErrorLedger). Only conditions
//! that invalidate a whole run surface here.

use std::path::PathBuf;

/// Top-level error type for all NewsRouter operations.
#[derive(Debug, thiserror::Error)]
pub enum NewsRouterError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during live retrieval.
    #[error("network error: {0}")]
    Network(String),

    /// Response body or protocol message could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad limit, empty identifier, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The external reasoning capability failed (bridge, protocol, or reply).
    #[error("reasoning error: {0}")]
    Reasoning(String),

    /// A requested stage identifier is not registered.
    #[error("unknown stage '{0}'")]
    UnknownStage(String),

    /// The requested stage sequence is structurally invalid. Fatal for the run.
    #[error("pipeline configuration error at stage {position} ('{stage}'): {message}")]
    PipelineConfiguration {
        stage: String,
        position: usize,
        message: String,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, NewsRouterError>;

impl NewsRouterError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is the fatal stage-sequence condition.
    pub fn is_pipeline_configuration(&self) -> bool {
        matches!(self, Self::PipelineConfiguration { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = NewsRouterError::config("missing user agent");
        assert_eq!(err.to_string(), "config error: missing user agent");

        let err = NewsRouterError::validation("limit must be at least 1");
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn pipeline_configuration_display() {
        let err = NewsRouterError::PipelineConfiguration {
            stage: "politics-analysis".into(),
            position: 0,
            message: "no preceding classification".into(),
        };
        assert!(err.is_pipeline_configuration());
        assert_eq!(
            err.to_string(),
            "pipeline configuration error at stage 0 ('politics-analysis'): no preceding classification"
        );
        assert!(!NewsRouterError::UnknownStage("x".into()).is_pipeline_configuration());
    }
}
