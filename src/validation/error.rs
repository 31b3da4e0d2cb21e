//! Validation findings reported to the operator.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which check produced a [`ValidationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorScope {
    /// Shape/type problems in the plan document.
    Structural,
    /// A processor type that is unknown or ambiguous in the runtime.
    TypeResolution,
    /// A controller-service placeholder that must be replaced manually.
    ControllerService,
    /// Configuration rejected by the runtime for a sandbox instance.
    SandboxConfig,
    /// Relationships that are neither connected nor auto-terminated.
    SandboxRelationship,
    /// The runtime could not be reached or answered nonsense.
    RuntimeTransport,
}

impl ErrorScope {
    /// Whether the repair oracle can plausibly fix errors of this scope.
    pub fn is_repairable(self) -> bool {
        !matches!(
            self,
            ErrorScope::ControllerService | ErrorScope::RuntimeTransport
        )
    }
}

impl fmt::Display for ErrorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorScope::Structural => "structural",
            ErrorScope::TypeResolution => "type-resolution",
            ErrorScope::ControllerService => "controller-service",
            ErrorScope::SandboxConfig => "sandbox-config",
            ErrorScope::SandboxRelationship => "sandbox-relationship",
            ErrorScope::RuntimeTransport => "runtime-transport",
        };
        f.write_str(name)
    }
}

/// A single problem found in the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub scope: ErrorScope,
    /// Human-readable message, already prefixed with the processor or
    /// connection it concerns.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_index: Option<usize>,
    /// False when only a human can fix the problem.
    pub repairable: bool,
}

impl ValidationError {
    pub fn new(scope: ErrorScope, message: impl Into<String>) -> Self {
        Self {
            scope,
            message: message.into(),
            processor_index: None,
            connection_index: None,
            repairable: scope.is_repairable(),
        }
    }

    pub fn structural(message: impl Into<String>) -> Self {
        Self::new(ErrorScope::Structural, message)
    }

    pub fn for_processor(scope: ErrorScope, index: usize, message: impl Into<String>) -> Self {
        Self {
            processor_index: Some(index),
            ..Self::new(scope, message)
        }
    }

    pub fn for_connection(index: usize, message: impl Into<String>) -> Self {
        Self {
            connection_index: Some(index),
            ..Self::structural(message)
        }
    }

    /// Marks the error as one the oracle must not be asked about.
    pub fn fatal(mut self) -> Self {
        self.repairable = false;
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
