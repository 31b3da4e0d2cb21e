//! Detection of controller-service placeholders left in the plan.

use crate::plan::PipelinePlan;

use super::error::{ErrorScope, ValidationError};

/// Property value the plan producer writes when a controller service still
/// has to be created by hand.
pub const CREATE_NEW_CS: &str = "CREATE_NEW_CS";

/// Reports every property whose value is the [`CREATE_NEW_CS`] placeholder.
pub fn check_controller_services(plan: &PipelinePlan) -> Vec<ValidationError> {
    plan.plan_details
        .processors
        .iter()
        .enumerate()
        .flat_map(|(index, processor)| {
            processor
                .properties
                .iter()
                .filter(|(_, value)| value.as_str() == CREATE_NEW_CS)
                .map(move |(key, _)| {
                    ValidationError::for_processor(
                        ErrorScope::ControllerService,
                        index,
                        format!(
                            "{}: Property '{}' requires a new Controller Service (value is '{}'). \
                             Please create it manually in NiFi and update the plan.json with the actual UUID.",
                            processor.label(index),
                            key,
                            CREATE_NEW_CS
                        ),
                    )
                })
        })
        .collect()
}
