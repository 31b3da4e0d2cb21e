//! Typed model of the persisted plan document.
//!
//! Field names follow the on-disk format written by the plan producer.
//! Keys this model does not know about are carried in `extra` maps so a
//! load/save cycle never drops data.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Root of the plan document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelinePlan {
    /// Free-form narrative (markdown). Informational only.
    pub plan_summary: String,
    /// The flow definition itself.
    pub plan_details: PlanDetails,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// Flow definition: processors and the connections wiring them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_name: Option<String>,
    pub processors: Vec<ProcessorSpec>,
    pub connections: Vec<ConnectionSpec>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl PlanDetails {
    /// Union of relationship names carried by each source processor's
    /// outgoing connections, keyed by processor id.
    pub fn outgoing_relationships(&self) -> HashMap<&str, BTreeSet<&str>> {
        let mut map: HashMap<&str, BTreeSet<&str>> = HashMap::new();
        for connection in &self.connections {
            map.entry(connection.from_id.as_str())
                .or_default()
                .extend(connection.relationships.iter().map(String::as_str));
        }
        map
    }
}

/// A single processor in the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorSpec {
    pub id: String,
    pub name: String,
    /// Runtime implementation type. May be a short name until resolved.
    #[serde(rename = "type")]
    pub processor_type: String,
    pub properties: IndexMap<String, String>,
    pub scheduling: SchedulingConfig,
    pub auto_terminated_relationships: Vec<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl ProcessorSpec {
    /// Label used in operator-facing messages, e.g. `Processor[2] 'Fetch'`.
    pub fn label(&self, index: usize) -> String {
        format!("Processor[{}] '{}'", index, self.name)
    }
}

/// Scheduling parameters of a processor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrent_tasks: Option<u32>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// A directed edge between two processors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub from_id: String,
    pub to_id: String,
    pub relationships: Vec<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "plan_summary": "Copy documents",
            "plan_details": {
                "flow_name": "Mongo Copy",
                "processors": [{
                    "id": "p1",
                    "name": "Read",
                    "type": "GetMongo",
                    "properties": {"Mongo URI": "mongodb://db", "Batch Size": "10"},
                    "scheduling": {"strategy": "TIMER_DRIVEN", "period": "1 min", "concurrent_tasks": 1},
                    "auto_terminated_relationships": ["failure"],
                    "position": {"x": 10}
                }],
                "connections": [
                    {"from_id": "p1", "to_id": "p2", "relationships": ["success"]},
                    {"id": "c2", "from_id": "p1", "to_id": "p3", "relationships": ["original", "success"]}
                ]
            }
        })
    }

    #[test]
    fn test_plan_deserializes_and_keeps_unknown_keys() {
        let plan: PipelinePlan = serde_json::from_value(sample()).expect("plan should parse");
        let processor = &plan.plan_details.processors[0];
        assert_eq!(processor.processor_type, "GetMongo");
        assert_eq!(processor.scheduling.concurrent_tasks, Some(1));
        assert!(processor.extra.contains_key("position"));

        let back = serde_json::to_value(&plan).expect("plan should serialize");
        assert_eq!(back["plan_details"]["processors"][0]["position"]["x"], 10);
        assert!(back["plan_details"]["connections"][0].get("id").is_none());
    }

    #[test]
    fn test_property_order_is_preserved() {
        let plan: PipelinePlan = serde_json::from_value(sample()).expect("plan should parse");
        let keys: Vec<&str> = plan.plan_details.processors[0]
            .properties
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["Mongo URI", "Batch Size"]);
    }

    #[test]
    fn test_outgoing_relationships_unions_per_source() {
        let plan: PipelinePlan = serde_json::from_value(sample()).expect("plan should parse");
        let outgoing = plan.plan_details.outgoing_relationships();
        let p1: Vec<&str> = outgoing["p1"].iter().copied().collect();
        assert_eq!(p1, vec!["original", "success"]);
        assert!(!outgoing.contains_key("p2"));
    }
}
