//! Error types for the lead pipeline
//!
//! Errors are classified by recoverability:
//! - Retryable: network issues, timeouts
//! - RequiresUserAction: bad credentials, wrong spreadsheet identifier
//!
//! Row-level parse failures are never errors; they degrade to null fields.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Why the data source could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnavailableCause {
    Network,
    Timeout,
    Credentials,
}

impl fmt::Display for UnavailableCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UnavailableCause::Network => "network",
            UnavailableCause::Timeout => "timeout",
            UnavailableCause::Credentials => "credentials",
        };
        f.write_str(label)
    }
}

/// Fetch-level failures. Every other pipeline stage is total.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Data source unavailable ({cause}): {detail}")]
    SourceUnavailable {
        cause: UnavailableCause,
        detail: String,
    },

    #[error("Spreadsheet not found: {0}")]
    SourceNotFound(String),
}

impl PipelineError {
    pub fn network(detail: impl Into<String>) -> Self {
        PipelineError::SourceUnavailable {
            cause: UnavailableCause::Network,
            detail: detail.into(),
        }
    }

    pub fn timeout(seconds: u64) -> Self {
        PipelineError::SourceUnavailable {
            cause: UnavailableCause::Timeout,
            detail: format!("no response after {} seconds", seconds),
        }
    }

    pub fn credentials(detail: impl Into<String>) -> Self {
        PipelineError::SourceUnavailable {
            cause: UnavailableCause::Credentials,
            detail: detail.into(),
        }
    }

    /// Returns true if retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::SourceUnavailable { .. })
    }

    /// Returns true if the operator has to change something before retrying
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            PipelineError::SourceNotFound(_)
                | PipelineError::SourceUnavailable {
                    cause: UnavailableCause::Credentials,
                    ..
                }
        )
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            PipelineError::SourceUnavailable { cause, .. } => match cause {
                UnavailableCause::Network => "Check your internet connection and press Refresh.",
                UnavailableCause::Timeout => {
                    "Google Sheets took too long to answer. Press Refresh to try again."
                }
                UnavailableCause::Credentials => {
                    "Set GOOGLE_CREDENTIALS (or place credentials.json next to the app) and \
                     share the sheet with the credential's account."
                }
            },
            PipelineError::SourceNotFound(_) => {
                "Check GOOGLE_SHEET_ID: it must be the identifier from the sheet URL, and the \
                 sheet must be shared with the credential's account."
            }
        }
    }
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not find home directory")]
    NoHomeDir,

    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Serializable error representation for the presentation layer
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardError {
    pub message: String,
    pub error_type: ErrorType,
    pub can_retry: bool,
    pub recovery_suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorType {
    Retryable,
    RequiresUserAction,
}

impl From<&PipelineError> for DashboardError {
    fn from(err: &PipelineError) -> Self {
        let error_type = if err.requires_user_action() {
            ErrorType::RequiresUserAction
        } else {
            ErrorType::Retryable
        };

        DashboardError {
            message: err.to_string(),
            error_type,
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}
