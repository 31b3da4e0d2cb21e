//! Validation engine configuration.

use crate::error::ConfigError;

/// Default number of oracle-assisted retries per processor.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default number of oracle structure repairs in non-interactive mode.
pub const DEFAULT_MAX_STRUCTURE_REPAIRS: u32 = 3;

const MAX_RETRIES_LIMIT: u32 = 50;

/// Settings for a validation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Oracle-assisted retries per processor during sandbox validation.
    pub max_retries: u32,
    /// Identifier of the container sandbox instances are created in.
    /// Only needed for sandbox validation.
    pub sandbox_container: Option<String>,
    /// Upper bound on oracle structure repairs when the static decision is
    /// made non-interactively.
    pub max_structure_repairs: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            sandbox_container: None,
            max_structure_repairs: DEFAULT_MAX_STRUCTURE_REPAIRS,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_sandbox_container(mut self, container: impl Into<String>) -> Self {
        self.sandbox_container = Some(container.into());
        self
    }

    pub fn with_max_structure_repairs(mut self, repairs: u32) -> Self {
        self.max_structure_repairs = repairs;
        self
    }

    /// Validates the settings needed by every run.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::InvalidValue {
                key: "MAX_VALIDATION_FIX_RETRIES".to_string(),
                message: format!("must be at most {}, got {}", MAX_RETRIES_LIMIT, self.max_retries),
            });
        }
        if let Some(container) = &self.sandbox_container {
            if container.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "SANDBOX_VALIDATION_PROCESSOR_GROUP".to_string(),
                    message: "must not be blank".to_string(),
                });
            }
        }
        Ok(())
    }

    /// The sandbox container id, required for sandbox validation.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` when no container is configured.
    pub fn require_sandbox_container(&self) -> Result<&str, ConfigError> {
        self.validate()?;
        self.sandbox_container
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("SANDBOX_VALIDATION_PROCESSOR_GROUP".to_string()))
    }
}
