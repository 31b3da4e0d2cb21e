//! The plan document: typed model, revision tracking and persistence.

pub mod store;
pub mod types;
pub mod versioned;

pub use store::{parse_plan, PlanStore};
pub use types::{ConnectionSpec, PipelinePlan, PlanDetails, ProcessorSpec, SchedulingConfig};
pub use versioned::{PlanDelta, VersionedPlan};
