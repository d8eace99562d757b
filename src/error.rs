//! Judging-system error types
//!
//! Everything in here is an *infrastructure* failure: the judge could not
//! produce a verdict. Problems with the submitted code (compile errors,
//! crashes, wrong output, limits) are verdicts, never errors.

use std::path::PathBuf;

use crate::models::VerdictKind;

/// Engine-wide error type
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    // Request errors
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Too many submissions, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    // Environment errors
    #[error("Workspace error at {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    // Lifecycle errors
    #[error("Judging cancelled")]
    Cancelled,

    #[error("Judging deadline of {0}ms exceeded")]
    DeadlineExceeded(u64),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal judge error")]
    Internal(#[from] anyhow::Error),
}

impl JudgeError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnsupportedLanguage(_) => "UNSUPPORTED_LANGUAGE",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Workspace { .. } => "WORKSPACE_ERROR",
            Self::Spawn { .. } => "SPAWN_ERROR",
            Self::Sandbox(_) => "SANDBOX_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::DeadlineExceeded(_) => "DEADLINE_EXCEEDED",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Status a caller should record when it persists a failed judgement
    pub fn verdict(&self) -> VerdictKind {
        VerdictKind::InternalError
    }

    /// Whether re-submitting the same request may succeed.
    ///
    /// Request errors are permanent; environment and lifecycle errors are not.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::UnsupportedLanguage(_) | Self::Validation(_) | Self::Configuration(_)
        )
    }

    /// Build a workspace error for `path`
    pub fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Workspace {
            path: path.into(),
            source,
        }
    }
}

impl From<validator::ValidationErrors> for JudgeError {
    fn from(err: validator::ValidationErrors) -> Self {
        JudgeError::Validation(err.to_string())
    }
}

/// Result type alias using JudgeError
pub type AppResult<T> = Result<T, JudgeError>;
