//! End-to-end runs of the validation engine against an in-memory runtime.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use planguard::error::{LlmError, RejectionKind, RuntimeError};
use planguard::llm::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};
use planguard::plan::PlanStore;
use planguard::repair::RepairOracle;
use planguard::runtime::{
    Diagnostic, FlowRuntime, ProcessorInspection, ProcessorTypeEntry, RevisionToken,
    SandboxHandle, SandboxRequest,
};
use planguard::{AutomaticDecision, EngineConfig, ErrorScope, RunStatus, ValidationEngine};
use serde_json::{json, Value};
use tempfile::TempDir;

const CONSUME_KAFKA: &str = "org.apache.nifi.processors.kafka.pubsub.ConsumeKafka_2_6";
const PUT_FILE: &str = "org.apache.nifi.processors.standard.PutFile";

/// Runtime that requires `Directory` on PutFile and reports the wiring of
/// ConsumeKafka as given.
#[derive(Default)]
struct ScriptedNifi {
    live: Mutex<HashMap<String, SandboxRequest>>,
    attempts: Mutex<HashMap<String, u32>>,
    reject_cron: bool,
}

impl ScriptedNifi {
    fn live_count(&self) -> usize {
        self.live.lock().expect("lock").len()
    }

    fn attempts(&self, name: &str) -> u32 {
        self.attempts.lock().expect("lock").get(name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl FlowRuntime for ScriptedNifi {
    async fn list_types(&self) -> Result<Vec<ProcessorTypeEntry>, RuntimeError> {
        Ok(vec![
            ProcessorTypeEntry::new(CONSUME_KAFKA),
            ProcessorTypeEntry::new(PUT_FILE),
        ])
    }

    async fn create_sandbox_processor(
        &self,
        _container_id: &str,
        request: &SandboxRequest,
    ) -> Result<SandboxHandle, RuntimeError> {
        *self
            .attempts
            .lock()
            .expect("lock")
            .entry(request.name.clone())
            .or_default() += 1;

        if self.reject_cron && request.scheduling.strategy.as_deref() == Some("CRON_DRIVEN") {
            return Err(RuntimeError::Rejected {
                status: 400,
                kind: RejectionKind::InvalidScheduling,
                message: "'1 min' is not a valid scheduling period".to_string(),
            });
        }

        let mut live = self.live.lock().expect("lock");
        let instance_id = format!("proc-{}", live.len() + 1);
        live.insert(instance_id.clone(), request.clone());
        Ok(SandboxHandle {
            instance_id,
            revision: RevisionToken {
                version: 1,
                client_id: None,
            },
            payload: Value::Null,
        })
    }

    async fn inspect(&self, handle: &SandboxHandle) -> Result<ProcessorInspection, RuntimeError> {
        let live = self.live.lock().expect("lock");
        let request = live
            .get(&handle.instance_id)
            .ok_or_else(|| RuntimeError::UnexpectedResponse("unknown instance".to_string()))?;

        let mut inspection = ProcessorInspection::default();
        if request.processor_type == PUT_FILE && !request.properties.contains_key("Directory") {
            inspection.diagnostics.push(Diagnostic::property(
                "'Directory' is invalid because Directory is required",
            ));
        }
        if request.processor_type == CONSUME_KAFKA {
            inspection.available_relationships =
                BTreeSet::from(["success".to_string(), "parse.failure".to_string()]);
        }
        Ok(inspection)
    }

    async fn delete_instance(&self, handle: &SandboxHandle) -> Result<(), RuntimeError> {
        self.live.lock().expect("lock").remove(&handle.instance_id);
        Ok(())
    }
}

struct QueuedLlm(Mutex<VecDeque<String>>);

impl QueuedLlm {
    fn new(answers: &[Value]) -> Self {
        Self(Mutex::new(answers.iter().map(Value::to_string).collect()))
    }
}

#[async_trait]
impl LlmProvider for QueuedLlm {
    async fn generate(&self, _request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let content = self
            .0
            .lock()
            .expect("lock")
            .pop_front()
            .ok_or_else(|| LlmError::RequestFailed("no more answers".to_string()))?;
        Ok(GenerationResponse {
            id: "q".to_string(),
            model: "queued".to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(content),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        })
    }
}

fn kafka_to_file(auto_terminated: Value, put_properties: Value) -> Value {
    json!({
        "plan_summary": "Consume orders and write them to disk",
        "plan_details": {
            "flow_name": "orders",
            "processors": [
                {"id": "consume", "name": "Consume Orders", "type": "ConsumeKafka_2_6",
                 "properties": {"Topic Name(s)": "orders"},
                 "scheduling": {"strategy": "TIMER_DRIVEN", "period": "0 sec"},
                 "auto_terminated_relationships": auto_terminated},
                {"id": "write", "name": "Write Orders", "type": "PutFile",
                 "properties": put_properties, "scheduling": {},
                 "auto_terminated_relationships": ["success", "failure"]}
            ],
            "connections": [
                {"from_id": "consume", "to_id": "write", "relationships": ["success"]}
            ]
        }
    })
}

fn write_plan(dir: &TempDir, document: &Value) -> std::path::PathBuf {
    let path = dir.path().join("plan.json");
    std::fs::write(&path, serde_json::to_string_pretty(document).expect("json")).expect("write");
    path
}

fn read_plan(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).expect("read")).expect("json")
}

fn engine(path: &Path, runtime: Arc<ScriptedNifi>, max_retries: u32) -> ValidationEngine {
    ValidationEngine::new(
        PlanStore::new(path),
        runtime,
        EngineConfig::new()
            .with_sandbox_container("sandbox")
            .with_max_retries(max_retries),
    )
}

#[tokio::test]
async fn test_valid_plan_passes_and_types_are_qualified() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_plan(&dir, &kafka_to_file(json!(["parse.failure"]), json!({"Directory": "/data"})));
    let runtime = Arc::new(ScriptedNifi::default());

    let report = engine(&path, runtime.clone(), 3)
        .run(&AutomaticDecision::abort())
        .await
        .expect("run");

    assert_eq!(report.status, RunStatus::Passed, "{:?}", report.errors);
    assert_eq!(runtime.live_count(), 0);
    let saved = read_plan(&path);
    assert_eq!(saved["plan_details"]["processors"][0]["type"], CONSUME_KAFKA);
    assert_eq!(saved["plan_details"]["processors"][1]["type"], PUT_FILE);
    assert_eq!(saved["plan_summary"], "Consume orders and write them to disk");
}

#[tokio::test]
async fn test_unfixable_processor_is_attempted_once_without_oracle() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_plan(&dir, &kafka_to_file(json!(["parse.failure"]), json!({})));
    let runtime = Arc::new(ScriptedNifi::default());

    let report = engine(&path, runtime.clone(), 3)
        .run(&AutomaticDecision::abort())
        .await
        .expect("run");

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(runtime.attempts("Write Orders"), 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].scope, ErrorScope::SandboxConfig);
    assert!(report.errors[0].message.contains("Config Error"));
    assert_eq!(runtime.live_count(), 0);
}

#[tokio::test]
async fn test_oracle_fixes_configuration_and_relationships() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_plan(&dir, &kafka_to_file(json!([]), json!({})));
    let runtime = Arc::new(ScriptedNifi::default());
    let llm = Arc::new(QueuedLlm::new(&[
        json!({"auto_terminated_relationships": ["parse.failure"]}),
        json!({"properties": {"Directory": "/var/orders"}}),
    ]));

    let report = engine(&path, runtime.clone(), 2)
        .with_oracle(RepairOracle::with_defaults(llm))
        .run(&AutomaticDecision::abort())
        .await
        .expect("run");

    assert_eq!(report.status, RunStatus::Passed, "{:?}", report.errors);
    assert_eq!(runtime.attempts("Consume Orders"), 2);
    assert_eq!(runtime.attempts("Write Orders"), 2);

    let saved = read_plan(&path);
    let processors = &saved["plan_details"]["processors"];
    assert_eq!(processors[0]["auto_terminated_relationships"], json!(["parse.failure"]));
    assert_eq!(processors[1]["properties"]["Directory"], "/var/orders");
}

#[tokio::test]
async fn test_retry_budget_is_bounded() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_plan(&dir, &kafka_to_file(json!(["parse.failure"]), json!({})));
    let runtime = Arc::new(ScriptedNifi::default());
    // Answers that never add the missing property.
    let answers: Vec<Value> = (0..10)
        .map(|i| json!({"properties": {"Conflict Resolution Strategy": format!("attempt-{}", i)}}))
        .collect();

    let report = engine(&path, runtime.clone(), 2)
        .with_oracle(RepairOracle::with_defaults(Arc::new(QueuedLlm::new(&answers))))
        .run(&AutomaticDecision::abort())
        .await
        .expect("run");

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(runtime.attempts("Write Orders"), 3);
    assert_eq!(runtime.live_count(), 0);
}

#[tokio::test]
async fn test_scheduling_rejection_is_repaired() {
    let dir = TempDir::new().expect("tempdir");
    let mut plan = kafka_to_file(json!(["parse.failure"]), json!({"Directory": "/data"}));
    plan["plan_details"]["processors"][0]["scheduling"] =
        json!({"strategy": "CRON_DRIVEN", "period": "1 min"});
    let path = write_plan(&dir, &plan);
    let runtime = Arc::new(ScriptedNifi {
        reject_cron: true,
        ..Default::default()
    });
    let llm = Arc::new(QueuedLlm::new(&[
        json!({"scheduling": {"strategy": "TIMER_DRIVEN", "period": "1 min"}}),
    ]));

    let report = engine(&path, runtime.clone(), 1)
        .with_oracle(RepairOracle::with_defaults(llm))
        .run(&AutomaticDecision::abort())
        .await
        .expect("run");

    assert_eq!(report.status, RunStatus::Passed, "{:?}", report.errors);
    assert_eq!(
        read_plan(&path)["plan_details"]["processors"][0]["scheduling"]["strategy"],
        "TIMER_DRIVEN"
    );
}

#[tokio::test]
async fn test_structural_errors_abort_without_sandbox() {
    let dir = TempDir::new().expect("tempdir");
    let mut plan = kafka_to_file(json!([]), json!({}));
    plan["plan_details"]["connections"][0]["to_id"] = json!("nowhere");
    let path = write_plan(&dir, &plan);
    let runtime = Arc::new(ScriptedNifi::default());

    let report = engine(&path, runtime.clone(), 3)
        .run(&AutomaticDecision::repair(2))
        .await
        .expect("run");

    assert_eq!(report.status, RunStatus::Aborted);
    assert!(report.errors.iter().all(|e| e.scope == ErrorScope::Structural));
    assert_eq!(runtime.attempts("Consume Orders"), 0);
}
