//! Resolution of processor types against the runtime's installed catalog.

use std::collections::BTreeSet;

use tracing::info;

use super::error::{ErrorScope, ValidationError};
use crate::plan::{PlanDelta, VersionedPlan};
use crate::runtime::ProcessorTypeEntry;

/// Outcome of resolving one raw type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeResolution {
    /// The name is already a fully-qualified identifier in the catalog.
    Exact,
    /// Exactly one identifier ends with `.{name}`.
    Unique(String),
    /// Nothing matches.
    Unknown,
    /// Several identifiers match; sorted.
    Ambiguous(Vec<String>),
}

/// The set of processor type identifiers installed in the runtime.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    identifiers: BTreeSet<String>,
}

impl TypeCatalog {
    pub fn from_entries(entries: impl IntoIterator<Item = ProcessorTypeEntry>) -> Self {
        Self {
            identifiers: entries.into_iter().map(|e| e.identifier).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    /// Identifiers in sorted order.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.identifiers.iter().map(String::as_str)
    }

    /// Identifiers containing `filter`, case-insensitively.
    pub fn matching<'a>(&'a self, filter: &str) -> Vec<&'a str> {
        let needle = filter.to_lowercase();
        self.identifiers()
            .filter(|id| id.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn resolve(&self, raw: &str) -> TypeResolution {
        if self.identifiers.contains(raw) {
            return TypeResolution::Exact;
        }

        let suffix = format!(".{}", raw);
        let mut candidates: Vec<String> = self
            .identifiers
            .iter()
            .filter(|id| id.ends_with(&suffix))
            .cloned()
            .collect();

        match candidates.len() {
            0 => TypeResolution::Unknown,
            1 => TypeResolution::Unique(candidates.remove(0)),
            _ => TypeResolution::Ambiguous(candidates),
        }
    }
}

/// Rewrites short type names to their fully-qualified form and reports the
/// ones that cannot be resolved.
pub struct TypeResolver<'a> {
    catalog: &'a TypeCatalog,
}

impl<'a> TypeResolver<'a> {
    pub fn new(catalog: &'a TypeCatalog) -> Self {
        Self { catalog }
    }

    /// Resolves every processor of the plan, applying a `SetType` delta for
    /// each uniquely resolved short name.
    pub fn resolve_plan(&self, plan: &mut VersionedPlan) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut deltas = Vec::new();

        for (index, processor) in plan.processors().iter().enumerate() {
            let raw = processor.processor_type.as_str();
            match self.catalog.resolve(raw) {
                TypeResolution::Exact => {}
                TypeResolution::Unique(identifier) => {
                    info!(
                        processor = %processor.label(index),
                        from = raw,
                        to = %identifier,
                        "Updating processor type"
                    );
                    deltas.push(PlanDelta::SetType {
                        index,
                        processor_type: identifier,
                    });
                }
                TypeResolution::Unknown => errors.push(ValidationError::for_processor(
                    ErrorScope::TypeResolution,
                    index,
                    format!(
                        "{}: Type '{}' does not exist in your NiFi instance.",
                        processor.label(index),
                        raw
                    ),
                )),
                TypeResolution::Ambiguous(candidates) => {
                    errors.push(ValidationError::for_processor(
                        ErrorScope::TypeResolution,
                        index,
                        format!(
                            "{}: Type '{}' is ambiguous. Matches: [{}]",
                            processor.label(index),
                            raw,
                            candidates.join(", ")
                        ),
                    ))
                }
            }
        }

        for delta in deltas {
            plan.apply(delta);
        }
        errors
    }
}
