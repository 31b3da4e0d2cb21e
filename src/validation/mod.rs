//! Plan validation: static checks and sandbox validation.
//!
//! The static checks ([`StructuralChecker`], [`TypeResolver`],
//! [`check_controller_services`]) need at most the runtime's type catalog.
//! [`SandboxValidator`] creates real, disposable processor instances.

pub mod controller_services;
pub mod error;
pub mod relationships;
pub mod sandbox;
pub mod structure;
pub mod types;

pub use controller_services::{check_controller_services, CREATE_NEW_CS};
pub use error::{ErrorScope, ValidationError};
pub use relationships::{relationship_problem, unaccounted};
pub use sandbox::{routed_relationships, ProcessorOutcome, SandboxValidator};
pub use structure::StructuralChecker;
pub use types::{TypeCatalog, TypeResolution, TypeResolver};
