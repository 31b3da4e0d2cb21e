//! Heuristic repairs proposed by an external oracle.

pub mod oracle;
pub mod prompts;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use oracle::{OracleConfig, RepairOracle, RepairRejection};

/// Result of asking the oracle for a fix.
#[derive(Debug, Clone, PartialEq)]
pub enum Repair<T> {
    Fix(T),
    NoFixAvailable,
}

impl<T> Repair<T> {
    pub fn is_fix(&self) -> bool {
        matches!(self, Repair::Fix(_))
    }
}

/// Replacement configuration for one processor. `None` leaves the field as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationFix {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_terminated_relationships: Option<Vec<String>>,
}
