//! Per-processor validation against live sandbox instances.
//!
//! For each attempt a disposable copy of the processor is created in the
//! sandbox container, inspected and deleted again before anything else
//! happens. Deterministic corrections (see [`SandboxValidator`]) are applied
//! after every inspection; the repair oracle is consulted only while the
//! attempt budget lasts.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::error::{ErrorScope, ValidationError};
use super::relationships::relationship_problem;
use crate::error::{RejectionKind, RuntimeError};
use crate::plan::{PipelinePlan, PlanDelta, ProcessorSpec, VersionedPlan};
use crate::repair::{Repair, RepairOracle};
use crate::runtime::{
    DiagnosticKind, FlowRuntime, ProcessorInspection, SandboxHandle, SandboxRequest,
};

/// Result of validating one processor.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessorOutcome {
    pub index: usize,
    pub name: String,
    /// Number of sandbox creations attempted.
    pub attempts: u32,
    pub passed: bool,
    /// Properties rewritten to their single allowable value.
    pub auto_corrections: usize,
    pub errors: Vec<ValidationError>,
}

/// Relationship names routed out of each source processor, keyed by id.
pub fn routed_relationships(plan: &PipelinePlan) -> HashMap<String, BTreeSet<String>> {
    plan.plan_details
        .outgoing_relationships()
        .into_iter()
        .map(|(id, names)| {
            (
                id.to_string(),
                names.into_iter().map(str::to_string).collect(),
            )
        })
        .collect()
}

/// A sandbox instance that still has to be deleted.
struct SandboxLease {
    handle: SandboxHandle,
    released: bool,
}

impl SandboxLease {
    fn new(handle: SandboxHandle) -> Self {
        debug!(instance_id = %handle.instance_id, "Sandbox instance created");
        Self {
            handle,
            released: false,
        }
    }

    fn handle(&self) -> &SandboxHandle {
        &self.handle
    }

    /// Deletes the instance. Failures are logged and otherwise ignored.
    async fn release(mut self, runtime: &dyn FlowRuntime) {
        match runtime.delete_instance(&self.handle).await {
            Ok(()) => debug!(instance_id = %self.handle.instance_id, "Sandbox instance deleted"),
            Err(e) => warn!(
                instance_id = %self.handle.instance_id,
                error = %e,
                "Failed to delete sandbox instance"
            ),
        }
        self.released = true;
    }
}

impl Drop for SandboxLease {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                instance_id = %self.handle.instance_id,
                "Sandbox instance dropped without being deleted"
            );
        }
    }
}

/// Validates processors one at a time in the sandbox container.
///
/// After every successful inspection, any property whose descriptor offers
/// exactly one allowable value is set to that value. With an oracle
/// configured a processor gets `max_retries + 1` attempts, otherwise one.
pub struct SandboxValidator {
    runtime: Arc<dyn FlowRuntime>,
    oracle: Option<RepairOracle>,
    container_id: String,
    max_retries: u32,
}

impl SandboxValidator {
    pub fn new(
        runtime: Arc<dyn FlowRuntime>,
        oracle: Option<RepairOracle>,
        container_id: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            runtime,
            oracle,
            container_id: container_id.into(),
            max_retries,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        if self.oracle.is_some() {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }

    /// Validates the processor at `index`, mutating the plan with every
    /// accepted correction.
    pub async fn validate_processor(
        &self,
        plan: &mut VersionedPlan,
        index: usize,
        routes: &HashMap<String, BTreeSet<String>>,
    ) -> ProcessorOutcome {
        let max_attempts = self.max_attempts();
        let mut attempts = 0;
        let mut auto_corrections = 0;

        loop {
            let Some(processor) = plan.processor(index).cloned() else {
                warn!(index, "No processor at index; skipping sandbox validation");
                return ProcessorOutcome {
                    index,
                    name: String::new(),
                    attempts,
                    passed: false,
                    auto_corrections,
                    errors: Vec::new(),
                };
            };
            attempts += 1;
            let label = processor.label(index);
            info!(
                processor = %label,
                processor_type = %processor.processor_type,
                attempt = attempts,
                max_attempts,
                "Validating in sandbox"
            );

            let outcome = |attempts, auto_corrections, errors: Vec<ValidationError>| ProcessorOutcome {
                index,
                name: processor.name.clone(),
                attempts,
                passed: errors.is_empty(),
                auto_corrections,
                errors,
            };

            let request = SandboxRequest::for_processor(index, &processor);
            let handle = match self
                .runtime
                .create_sandbox_processor(&self.container_id, &request)
                .await
            {
                Ok(handle) => handle,
                Err(err) => {
                    if err.rejection_kind() == Some(RejectionKind::InvalidScheduling)
                        && attempts < max_attempts
                    {
                        if let Some(oracle) = &self.oracle {
                            warn!(processor = %label, error = %err, "Scheduling rejected by runtime");
                            let repair = oracle
                                .repair_scheduling(&processor.scheduling, rejection_detail(&err))
                                .await;
                            if let Repair::Fix(scheduling) = repair {
                                info!(processor = %label, "Applying oracle scheduling fix");
                                plan.apply(PlanDelta::SetScheduling { index, scheduling });
                                continue;
                            }
                        }
                    }
                    return outcome(attempts, auto_corrections, vec![creation_error(index, &label, &err)]);
                }
            };

            let lease = SandboxLease::new(handle);
            let inspection = self.runtime.inspect(lease.handle()).await;
            lease.release(self.runtime.as_ref()).await;

            let inspection = match inspection {
                Ok(inspection) => inspection,
                Err(err) => {
                    return outcome(
                        attempts,
                        auto_corrections,
                        vec![transport_error(index, &label, &err)],
                    )
                }
            };

            auto_corrections += apply_single_choice_values(plan, index, &inspection);

            let config = config_problems(&processor, &inspection);
            let relationship = routes.get(&processor.id).and_then(|routed| {
                relationship_problem(
                    &inspection.available_relationships,
                    &processor.auto_terminated_relationships,
                    routed,
                )
            });

            if config.is_empty() && relationship.is_none() {
                info!(processor = %label, attempts, "Sandbox validation passed");
                return outcome(attempts, auto_corrections, Vec::new());
            }

            let mut errors: Vec<ValidationError> = config
                .iter()
                .map(|problem| {
                    ValidationError::for_processor(
                        ErrorScope::SandboxConfig,
                        index,
                        format!("{} Config Error: {}", label, problem),
                    )
                })
                .collect();
            errors.extend(relationship.iter().map(|problem| {
                ValidationError::for_processor(
                    ErrorScope::SandboxRelationship,
                    index,
                    format!("{} Relationship Error: {}", label, problem),
                )
            }));

            for error in &errors {
                warn!(processor = %label, attempt = attempts, "{}", error.message);
            }

            if attempts < max_attempts {
                if let Some(oracle) = &self.oracle {
                    let current = plan
                        .processor(index)
                        .cloned()
                        .unwrap_or_else(|| processor.clone());
                    let problems: Vec<String> =
                        config.iter().cloned().chain(relationship.clone()).collect();
                    let repair = oracle
                        .repair_configuration(&current, &problems, &inspection.descriptors)
                        .await;
                    if let Repair::Fix(fix) = repair {
                        info!(processor = %label, "Applying oracle configuration fix");
                        if let Some(properties) = fix.properties {
                            plan.apply(PlanDelta::ReplaceProperties { index, properties });
                        }
                        if let Some(relationships) = fix.auto_terminated_relationships {
                            plan.apply(PlanDelta::SetAutoTerminated {
                                index,
                                relationships,
                            });
                        }
                        auto_corrections += apply_single_choice_values(plan, index, &inspection);
                        continue;
                    }
                }
            }

            return outcome(attempts, auto_corrections, errors);
        }
    }
}

/// Sets every property whose descriptor allows exactly one value to that
/// value. Returns the number of properties changed.
fn apply_single_choice_values(
    plan: &mut VersionedPlan,
    index: usize,
    inspection: &ProcessorInspection,
) -> usize {
    let mut names: Vec<&String> = inspection.descriptors.keys().collect();
    names.sort();

    let mut changed = 0;
    for name in names {
        let Some(value) = inspection.descriptors[name].single_allowable_value() else {
            continue;
        };
        let current = plan
            .processor(index)
            .and_then(|p| p.properties.get(name.as_str()))
            .cloned();
        if current.as_deref() == Some(value) {
            continue;
        }
        info!(
            index,
            property = %name,
            from = current.as_deref().unwrap_or("<unset>"),
            to = value,
            "Auto-correcting property to its only allowable value"
        );
        if plan.apply(PlanDelta::SetProperty {
            index,
            key: name.clone(),
            value: value.to_string(),
        }) {
            changed += 1;
        }
    }
    changed
}

/// Property diagnostics plus properties the processor cannot accept.
fn config_problems(processor: &ProcessorSpec, inspection: &ProcessorInspection) -> Vec<String> {
    let mut problems: Vec<String> = inspection
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::Property)
        .map(|d| d.message.clone())
        .collect();

    if !inspection.supports_dynamic_properties && !inspection.descriptors.is_empty() {
        problems.extend(
            processor
                .properties
                .keys()
                .filter(|key| !inspection.descriptors.contains_key(key.as_str()))
                .map(|key| {
                    format!(
                        "Property '{}' is invalid because the processor does not support dynamic properties. It must be removed.",
                        key
                    )
                }),
        );
    }
    problems
}

fn rejection_detail(err: &RuntimeError) -> &str {
    match err {
        RuntimeError::Rejected { message, .. } => message.as_str(),
        _ => "",
    }
}

fn creation_error(index: usize, label: &str, err: &RuntimeError) -> ValidationError {
    match err {
        RuntimeError::Rejected {
            status, message, ..
        } => ValidationError::for_processor(
            ErrorScope::SandboxConfig,
            index,
            format!(
                "{}: Failed to create in sandbox. Status: {}, Response: {}",
                label, status, message
            ),
        )
        .fatal(),
        other => transport_error(index, label, other),
    }
}

fn transport_error(index: usize, label: &str, err: &RuntimeError) -> ValidationError {
    ValidationError::for_processor(
        ErrorScope::RuntimeTransport,
        index,
        format!("{}: NiFi API error during sandbox validation: {}", label, err),
    )
}
