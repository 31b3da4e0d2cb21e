//! The validation run: static pass, decision point, sandbox pass.
//!
//! The static pass repeats until it is clean or the [`StaticFailureHandler`]
//! gives up. Processors are then validated in the sandbox one at a time, in
//! plan order, and the plan is saved after each processor whenever a
//! correction changed it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, PlanError, RuntimeError};
use crate::plan::{parse_plan, PlanStore, VersionedPlan};
use crate::repair::{Repair, RepairOracle};
use crate::runtime::FlowRuntime;
use crate::validation::{
    check_controller_services, routed_relationships, ErrorScope, ProcessorOutcome,
    SandboxValidator, StructuralChecker, TypeCatalog, TypeResolver, ValidationError,
};

/// What to do after a failed static pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticFailureChoice {
    /// Reload the plan from disk and check again.
    Retry,
    /// Ask the oracle to repair the plan, then check again.
    Repair,
    /// Stop the run.
    Abort,
}

/// Decides how to continue after static validation errors.
#[async_trait]
pub trait StaticFailureHandler: Send + Sync {
    /// `repair_available` is false when no oracle is configured or none of
    /// the errors is repairable.
    async fn decide(&self, errors: &[ValidationError], repair_available: bool)
        -> StaticFailureChoice;
}

/// Non-interactive handler: repairs up to a fixed number of times, then aborts.
#[derive(Debug)]
pub struct AutomaticDecision {
    max_repairs: u32,
    repairs_used: AtomicU32,
}

impl AutomaticDecision {
    /// Abort on the first failure.
    pub fn abort() -> Self {
        Self::repair(0)
    }

    /// Request at most `max_repairs` oracle repairs.
    pub fn repair(max_repairs: u32) -> Self {
        Self {
            max_repairs,
            repairs_used: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl StaticFailureHandler for AutomaticDecision {
    async fn decide(
        &self,
        _errors: &[ValidationError],
        repair_available: bool,
    ) -> StaticFailureChoice {
        if !repair_available {
            return StaticFailureChoice::Abort;
        }
        let used = self.repairs_used.fetch_add(1, Ordering::SeqCst);
        if used < self.max_repairs {
            StaticFailureChoice::Repair
        } else {
            StaticFailureChoice::Abort
        }
    }
}

/// Final state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    Failed,
    Aborted,
}

/// Everything a run found, for the operator.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub status: RunStatus,
    pub plan_path: String,
    pub static_passes: u32,
    pub structure_repairs: u32,
    /// True if the plan file was rewritten during the run.
    pub plan_saved: bool,
    pub errors: Vec<ValidationError>,
    pub processors: Vec<ProcessorOutcome>,
    pub finished_at: DateTime<Utc>,
}

impl ValidationReport {
    fn start(store: &PlanStore) -> Self {
        Self {
            status: RunStatus::Failed,
            plan_path: store.path().display().to_string(),
            static_passes: 0,
            structure_repairs: 0,
            plan_saved: false,
            errors: Vec::new(),
            processors: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    fn finish(mut self, status: RunStatus, errors: Vec<ValidationError>) -> Self {
        self.status = status;
        self.errors = errors;
        self.finished_at = Utc::now();
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Passed
    }
}

enum StaticPass {
    Clean(VersionedPlan),
    Defective {
        document: Value,
        errors: Vec<ValidationError>,
    },
    Unloadable(ValidationError),
}

/// Drives a validation run over one plan file.
pub struct ValidationEngine {
    store: PlanStore,
    runtime: Arc<dyn FlowRuntime>,
    oracle: Option<RepairOracle>,
    config: EngineConfig,
    catalog: Option<TypeCatalog>,
}

impl ValidationEngine {
    pub fn new(store: PlanStore, runtime: Arc<dyn FlowRuntime>, config: EngineConfig) -> Self {
        Self {
            store,
            runtime,
            oracle: None,
            config,
            catalog: None,
        }
    }

    pub fn with_oracle(mut self, oracle: RepairOracle) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// The runtime's type catalog, fetched on first use. A failed fetch is
    /// not cached.
    pub async fn catalog(&mut self) -> Result<&TypeCatalog, RuntimeError> {
        let catalog = match self.catalog.take() {
            Some(catalog) => catalog,
            None => {
                let entries = self.runtime.list_types().await?;
                let catalog = TypeCatalog::from_entries(entries);
                info!(count = catalog.len(), "Fetched processor types from runtime");
                catalog
            }
        };
        Ok(self.catalog.insert(catalog))
    }

    /// Runs the static checks once, without prompting or sandboxing.
    pub async fn check(&mut self) -> Result<ValidationReport, EngineError> {
        self.config.validate()?;
        let mut report = ValidationReport::start(&self.store);
        report.static_passes = 1;

        let report = match self.static_pass(&mut report).await? {
            StaticPass::Clean(_) => report.finish(RunStatus::Passed, Vec::new()),
            StaticPass::Defective { errors, .. } => report.finish(RunStatus::Failed, errors),
            StaticPass::Unloadable(error) => report.finish(RunStatus::Failed, vec![error]),
        };
        Ok(report)
    }

    /// Full run: static pass with decision point, then sandbox validation of
    /// every processor.
    pub async fn run(
        &mut self,
        handler: &dyn StaticFailureHandler,
    ) -> Result<ValidationReport, EngineError> {
        let container = self.config.require_sandbox_container()?.to_string();
        let mut report = ValidationReport::start(&self.store);

        let mut plan = loop {
            report.static_passes += 1;
            match self.static_pass(&mut report).await? {
                StaticPass::Clean(plan) => break plan,
                StaticPass::Unloadable(error) => {
                    return Ok(report.finish(RunStatus::Failed, vec![error]))
                }
                StaticPass::Defective { document, errors } => {
                    warn!(count = errors.len(), "Static validation failed");
                    for error in &errors {
                        warn!(scope = %error.scope, "{}", error.message);
                    }

                    let repair_available =
                        self.oracle.is_some() && errors.iter().any(|e| e.repairable);
                    match handler.decide(&errors, repair_available).await {
                        StaticFailureChoice::Retry => info!("Reloading plan"),
                        StaticFailureChoice::Repair if repair_available => {
                            report.structure_repairs += 1;
                            if self.repair_structure(document, &errors).await? {
                                report.plan_saved = true;
                            }
                        }
                        StaticFailureChoice::Repair => {
                            warn!("Repair requested but not available; aborting");
                            return Ok(report.finish(RunStatus::Aborted, errors));
                        }
                        StaticFailureChoice::Abort => {
                            return Ok(report.finish(RunStatus::Aborted, errors))
                        }
                    }
                }
            }
        };

        info!(
            processors = plan.processors().len(),
            "Static validation passed; validating processors in sandbox"
        );
        let sandbox = SandboxValidator::new(
            Arc::clone(&self.runtime),
            self.oracle.clone(),
            container,
            self.config.max_retries,
        );
        let routes = routed_relationships(plan.plan());

        let mut errors = Vec::new();
        for index in 0..plan.processors().len() {
            let outcome = sandbox.validate_processor(&mut plan, index, &routes).await;
            if self.store.save_if_changed(&mut plan)? {
                report.plan_saved = true;
            }
            errors.extend(outcome.errors.iter().cloned());
            report.processors.push(outcome);
        }

        let status = if errors.is_empty() {
            info!("All processors validated");
            RunStatus::Passed
        } else {
            RunStatus::Failed
        };
        Ok(report.finish(status, errors))
    }

    async fn static_pass(&mut self, report: &mut ValidationReport) -> Result<StaticPass, EngineError> {
        let document = match self.store.load_document() {
            Ok(document) => document,
            Err(e @ (PlanError::NotFound(_) | PlanError::Parse(_) | PlanError::NotAnObject)) => {
                return Ok(StaticPass::Unloadable(
                    ValidationError::structural(e.to_string()).fatal(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        let mut errors = StructuralChecker::check(&document);
        let mut plan = match parse_plan(&document) {
            Ok(plan) => VersionedPlan::new(plan),
            Err(e) => {
                if errors.is_empty() {
                    errors.push(ValidationError::structural(format!(
                        "Plan does not match the expected schema: {}",
                        e
                    )));
                }
                return Ok(StaticPass::Defective { document, errors });
            }
        };

        match self.catalog().await {
            Ok(catalog) => errors.extend(TypeResolver::new(catalog).resolve_plan(&mut plan)),
            Err(e) => errors.push(
                ValidationError::new(
                    ErrorScope::TypeResolution,
                    format!("Failed to fetch processor types from NiFi: {}", e),
                )
                .fatal(),
            ),
        }
        errors.extend(check_controller_services(plan.plan()));

        if self.store.save_if_changed(&mut plan)? {
            report.plan_saved = true;
        }

        if errors.is_empty() {
            return Ok(StaticPass::Clean(plan));
        }
        let document = serde_json::to_value(plan.plan()).map_err(PlanError::from)?;
        Ok(StaticPass::Defective { document, errors })
    }

    /// Replaces `plan_details` with the oracle's correction and saves it.
    async fn repair_structure(
        &mut self,
        mut document: Value,
        errors: &[ValidationError],
    ) -> Result<bool, EngineError> {
        let Some(oracle) = self.oracle.clone() else {
            return Ok(false);
        };

        let available_types: Vec<String> = match self.catalog().await {
            Ok(catalog) => catalog.identifiers().map(str::to_string).collect(),
            Err(e) => {
                warn!(error = %e, "Repairing without the processor type catalog");
                Vec::new()
            }
        };
        let details = document
            .get("plan_details")
            .cloned()
            .unwrap_or_else(|| json!({}));

        info!("Asking the oracle to repair the plan structure");
        match oracle.repair_structure(&details, errors, &available_types).await {
            Repair::Fix(fixed) => {
                if let Some(root) = document.as_object_mut() {
                    root.insert("plan_details".to_string(), fixed);
                }
                self.store.save_document(&document)?;
                info!("Applied oracle structure repair");
                Ok(true)
            }
            Repair::NoFixAvailable => {
                warn!("Oracle could not repair the plan");
                Ok(false)
            }
        }
    }
}
