//! planguard: validation and repair of generated NiFi flow plans.
//!
//! A plan is checked statically (structure, processor types, controller
//! service placeholders) and then processor by processor in a sandbox
//! process group of a live runtime. Failures are optionally repaired by an
//! LLM oracle and every correction is saved back to the plan file.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod plan;
pub mod repair;
pub mod runtime;
pub mod utils;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use config::EngineConfig;
pub use engine::{
    AutomaticDecision, RunStatus, StaticFailureChoice, StaticFailureHandler, ValidationEngine,
    ValidationReport,
};
pub use error::{ConfigError, EngineError, LlmError, PlanError, RuntimeError};
pub use validation::{ErrorScope, ValidationError};
