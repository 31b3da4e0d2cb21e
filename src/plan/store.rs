//! Durable storage for the plan document.
//!
//! The store reads the document either as raw JSON (for structural checking)
//! or as a typed [`VersionedPlan`], and writes it back atomically through a
//! temporary file in the same directory followed by a rename.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use super::types::PipelinePlan;
use super::versioned::VersionedPlan;
use crate::error::PlanError;

/// File-backed plan store.
#[derive(Debug, Clone)]
pub struct PlanStore {
    path: PathBuf,
}

impl PlanStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the plan as an untyped JSON document.
    ///
    /// # Errors
    ///
    /// Returns `PlanError::NotFound` when the file is missing,
    /// `PlanError::Parse` for malformed JSON and `PlanError::NotAnObject` when
    /// the top-level value is not an object.
    pub fn load_document(&self) -> Result<Value, PlanError> {
        if !self.path.exists() {
            return Err(PlanError::NotFound(self.path.display().to_string()));
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let document: Value = serde_json::from_str(&contents)?;
        if !document.is_object() {
            return Err(PlanError::NotAnObject);
        }
        Ok(document)
    }

    /// Atomically replaces the stored document.
    pub fn save_document(&self, document: &Value) -> Result<(), PlanError> {
        let contents = serde_json::to_string_pretty(document)?;
        self.write_atomically(&contents)?;
        info!(path = %self.path.display(), "Saved plan");
        Ok(())
    }

    /// Persists the plan only if it changed since it was loaded or last saved.
    ///
    /// Returns `true` when a write happened.
    pub fn save_if_changed(&self, plan: &mut VersionedPlan) -> Result<bool, PlanError> {
        if !plan.is_dirty() {
            return Ok(false);
        }
        let document = serde_json::to_value(plan.plan())?;
        self.save_document(&document)?;
        plan.mark_saved();
        Ok(true)
    }

    fn write_atomically(&self, contents: &str) -> Result<(), PlanError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| PlanError::Persist {
            path: self.path.display().to_string(),
            reason: e.error.to_string(),
        })?;
        Ok(())
    }
}

/// Types an already-loaded plan document.
pub fn parse_plan(document: &Value) -> Result<PipelinePlan, PlanError> {
    Ok(serde_json::from_value(document.clone())?)
}
