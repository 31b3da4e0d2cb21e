//! Dataflow runtime integration.
//!
//! The validator only needs four operations from the runtime: list the
//! installed processor types, create a disposable processor inside a sandbox
//! container, read back what the runtime thinks of it, and delete it again.
//! [`FlowRuntime`] captures exactly that so the engine can run against the
//! real NiFi REST API ([`NifiClient`]) or an in-memory fake.

pub mod nifi;

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RuntimeError;
use crate::plan::{ProcessorSpec, SchedulingConfig};

pub use nifi::NifiClient;

/// One installed processor implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorTypeEntry {
    /// Fully-qualified type identifier.
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProcessorTypeEntry {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            description: None,
        }
    }
}

/// What to create in the sandbox for one validation attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SandboxRequest {
    /// Position of the processor in the plan; used for layout only.
    pub index: usize,
    pub name: String,
    pub processor_type: String,
    pub properties: IndexMap<String, String>,
    pub scheduling: SchedulingConfig,
}

impl SandboxRequest {
    pub fn for_processor(index: usize, processor: &ProcessorSpec) -> Self {
        Self {
            index,
            name: processor.name.clone(),
            processor_type: processor.processor_type.clone(),
            properties: processor.properties.clone(),
            scheduling: processor.scheduling.clone(),
        }
    }
}

/// Optimistic-concurrency token the runtime requires to delete an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionToken {
    pub version: u64,
    pub client_id: Option<String>,
}

/// A live sandbox instance. Must always be passed to
/// [`FlowRuntime::delete_instance`] once inspected.
#[derive(Debug, Clone)]
pub struct SandboxHandle {
    pub instance_id: String,
    pub revision: RevisionToken,
    /// Entity the runtime returned when the instance was created.
    pub payload: Value,
}

/// One permitted value of an enumerated property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowableValue {
    pub value: String,
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Runtime metadata about one configuration property of a processor type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PropertyDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    pub sensitive: bool,
    #[serde(rename = "supportsEl")]
    pub supports_expression_language: bool,
    #[serde(rename = "allowableValues", skip_serializing_if = "Option::is_none")]
    pub allowable_values: Option<Vec<AllowableValue>>,
}

impl PropertyDescriptor {
    /// The only value this property may take, if the runtime offers exactly one.
    pub fn single_allowable_value(&self) -> Option<&str> {
        match self.allowable_values.as_deref() {
            Some([only]) => Some(only.value.as_str()),
            _ => None,
        }
    }
}

/// Category of a runtime validation diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Anything about the processor's own configuration.
    Property,
    /// Relationship routing (re-derived from the plan by the validator).
    Relationship,
    /// Missing upstream connections (meaningless for an isolated instance).
    UpstreamConnection,
}

/// A validation message reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn property(message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::Property,
            message: message.into(),
        }
    }
}

/// Everything the validator reads back from a sandbox instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessorInspection {
    pub descriptors: HashMap<String, PropertyDescriptor>,
    pub available_relationships: BTreeSet<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub supports_dynamic_properties: bool,
}

/// Operations the validator needs from the dataflow runtime.
#[async_trait]
pub trait FlowRuntime: Send + Sync {
    /// List every processor type installed in the runtime.
    async fn list_types(&self) -> Result<Vec<ProcessorTypeEntry>, RuntimeError>;

    /// Create a disposable processor inside the sandbox container.
    async fn create_sandbox_processor(
        &self,
        container_id: &str,
        request: &SandboxRequest,
    ) -> Result<SandboxHandle, RuntimeError>;

    /// Read descriptors, relationships and diagnostics of a live instance.
    async fn inspect(&self, handle: &SandboxHandle) -> Result<ProcessorInspection, RuntimeError>;

    /// Delete a sandbox instance using its revision token.
    async fn delete_instance(&self, handle: &SandboxHandle) -> Result<(), RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(values: &[&str]) -> PropertyDescriptor {
        PropertyDescriptor {
            allowable_values: Some(
                values
                    .iter()
                    .map(|v| AllowableValue {
                        value: v.to_string(),
                        display_name: None,
                    })
                    .collect(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_single_allowable_value() {
        assert_eq!(descriptor(&["cs-1"]).single_allowable_value(), Some("cs-1"));
        assert_eq!(descriptor(&["a", "b"]).single_allowable_value(), None);
        assert_eq!(descriptor(&[]).single_allowable_value(), None);
        assert_eq!(PropertyDescriptor::default().single_allowable_value(), None);
    }
}
