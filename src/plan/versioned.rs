//! Revisioned in-memory plan and the deltas that mutate it.
//!
//! Every accepted repair is expressed as a [`PlanDelta`]. Applying a delta that
//! changes nothing leaves the revision untouched, so persistence can be a
//! plain "save if the revision moved" step.

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::types::{PipelinePlan, ProcessorSpec, SchedulingConfig};

/// A single field-level change to one processor.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanDelta {
    /// Rewrite the processor's type identifier.
    SetType { index: usize, processor_type: String },
    /// Set (or insert) one configuration property.
    SetProperty {
        index: usize,
        key: String,
        value: String,
    },
    /// Replace the whole configuration property map.
    ReplaceProperties {
        index: usize,
        properties: IndexMap<String, String>,
    },
    /// Replace the auto-terminated relationship list.
    SetAutoTerminated {
        index: usize,
        relationships: Vec<String>,
    },
    /// Replace the scheduling configuration.
    SetScheduling {
        index: usize,
        scheduling: SchedulingConfig,
    },
}

impl PlanDelta {
    /// Index of the processor this delta targets.
    pub fn index(&self) -> usize {
        match self {
            PlanDelta::SetType { index, .. }
            | PlanDelta::SetProperty { index, .. }
            | PlanDelta::ReplaceProperties { index, .. }
            | PlanDelta::SetAutoTerminated { index, .. }
            | PlanDelta::SetScheduling { index, .. } => *index,
        }
    }

    /// Applies the delta, returning whether the processor actually changed.
    fn apply_to(self, processor: &mut ProcessorSpec) -> bool {
        match self {
            PlanDelta::SetType { processor_type, .. } => {
                replace_if_different(&mut processor.processor_type, processor_type)
            }
            PlanDelta::SetProperty { key, value, .. } => {
                if processor.properties.get(&key) == Some(&value) {
                    false
                } else {
                    processor.properties.insert(key, value);
                    true
                }
            }
            PlanDelta::ReplaceProperties { properties, .. } => {
                replace_if_different(&mut processor.properties, properties)
            }
            PlanDelta::SetAutoTerminated { relationships, .. } => {
                replace_if_different(&mut processor.auto_terminated_relationships, relationships)
            }
            PlanDelta::SetScheduling { scheduling, .. } => {
                replace_if_different(&mut processor.scheduling, scheduling)
            }
        }
    }
}

fn replace_if_different<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

/// The plan currently being validated, with revision tracking.
#[derive(Debug, Clone)]
pub struct VersionedPlan {
    plan: PipelinePlan,
    revision: u64,
    saved_revision: u64,
}

impl VersionedPlan {
    /// Wraps a freshly loaded plan. It starts clean.
    pub fn new(plan: PipelinePlan) -> Self {
        Self {
            plan,
            revision: 0,
            saved_revision: 0,
        }
    }

    pub fn plan(&self) -> &PipelinePlan {
        &self.plan
    }

    pub fn processors(&self) -> &[ProcessorSpec] {
        &self.plan.plan_details.processors
    }

    pub fn processor(&self, index: usize) -> Option<&ProcessorSpec> {
        self.plan.plan_details.processors.get(index)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// True when a delta changed the plan since it was loaded or last saved.
    pub fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision
    }

    /// Applies a delta. Returns `true` if the plan changed.
    pub fn apply(&mut self, delta: PlanDelta) -> bool {
        let index = delta.index();
        let Some(processor) = self.plan.plan_details.processors.get_mut(index) else {
            warn!(index, "Ignoring plan delta for a processor index that does not exist");
            return false;
        };

        let changed = delta.apply_to(processor);
        if changed {
            self.revision += 1;
            debug!(index, revision = self.revision, "Applied plan delta");
        }
        changed
    }

    pub(crate) fn mark_saved(&mut self) {
        self.saved_revision = self.revision;
    }
}
