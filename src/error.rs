//! Error types for planguard operations.
//!
//! Defines error types for the major subsystems:
//! - Plan document loading and persistence
//! - Dataflow runtime (NiFi REST) interactions
//! - LLM API interactions used by the repair oracle
//! - Engine configuration and run aborts

use thiserror::Error;

/// Errors that can occur while loading or saving the plan document.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("JSON Parse Error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Plan document is not a JSON object")]
    NotAnObject,

    #[error("Failed to persist plan to '{path}': {reason}")]
    Persist { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classification of a runtime refusal to create a sandbox processor.
///
/// The runtime only reports free-form text; the adapter maps it onto this
/// enum so callers never inspect message wording themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// The scheduling strategy/period combination was refused.
    InvalidScheduling,
    /// Any other refusal.
    Other,
}

/// Errors that can occur while talking to the dataflow runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Runtime base URL is not configured")]
    MissingBaseUrl,

    #[error("Runtime request failed: {0}")]
    Transport(String),

    #[error("Runtime rejected the request. Status: {status}, Response: {message}")]
    Rejected {
        status: u16,
        kind: RejectionKind,
        message: String,
    },

    #[error("Runtime API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response format from runtime: {0}")]
    UnexpectedResponse(String),
}

impl RuntimeError {
    /// Returns the rejection classification when the runtime refused creation.
    pub fn rejection_kind(&self) -> Option<RejectionKind> {
        match self {
            RuntimeError::Rejected { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Errors raised when the engine configuration is unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors that abort a validation run outright.
///
/// Validation findings are not errors; they are reported in the run report.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_kind_only_for_rejections() {
        let rejected = RuntimeError::Rejected {
            status: 400,
            kind: RejectionKind::InvalidScheduling,
            message: "bad period".to_string(),
        };
        assert_eq!(
            rejected.rejection_kind(),
            Some(RejectionKind::InvalidScheduling)
        );

        let transport = RuntimeError::Transport("connection refused".to_string());
        assert_eq!(transport.rejection_kind(), None);
    }

    #[test]
    fn test_rejected_message_carries_status_and_body() {
        let err = RuntimeError::Rejected {
            status: 409,
            kind: RejectionKind::Other,
            message: "conflict".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Runtime rejected the request. Status: 409, Response: conflict"
        );
    }
}
