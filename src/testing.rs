//! In-memory fakes shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{LlmError, RuntimeError};
use crate::llm::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};
use crate::runtime::{
    FlowRuntime, ProcessorInspection, ProcessorTypeEntry, RevisionToken, SandboxHandle,
    SandboxRequest,
};

type InspectFn = dyn Fn(&SandboxRequest) -> ProcessorInspection + Send + Sync;
type RejectFn = dyn Fn(&SandboxRequest) -> Option<RuntimeError> + Send + Sync;

#[derive(Default)]
struct FakeState {
    next_id: usize,
    live: HashMap<String, SandboxRequest>,
    created: Vec<SandboxRequest>,
    deleted: usize,
    list_calls: usize,
}

/// Runtime fake that tracks live sandbox instances.
pub(crate) struct FakeRuntime {
    types: Vec<String>,
    fail_list_types: bool,
    fail_inspect: bool,
    fail_delete: bool,
    inspect: Box<InspectFn>,
    reject: Box<RejectFn>,
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub(crate) fn new(types: &[&str]) -> Self {
        Self {
            types: types.iter().map(|t| t.to_string()).collect(),
            fail_list_types: false,
            fail_inspect: false,
            fail_delete: false,
            inspect: Box::new(|_| ProcessorInspection::default()),
            reject: Box::new(|_| None),
            state: Mutex::new(FakeState::default()),
        }
    }

    pub(crate) fn with_inspection(
        mut self,
        inspect: impl Fn(&SandboxRequest) -> ProcessorInspection + Send + Sync + 'static,
    ) -> Self {
        self.inspect = Box::new(inspect);
        self
    }

    pub(crate) fn with_rejection(
        mut self,
        reject: impl Fn(&SandboxRequest) -> Option<RuntimeError> + Send + Sync + 'static,
    ) -> Self {
        self.reject = Box::new(reject);
        self
    }

    pub(crate) fn failing_list_types(mut self) -> Self {
        self.fail_list_types = true;
        self
    }

    pub(crate) fn failing_inspect(mut self) -> Self {
        self.fail_inspect = true;
        self
    }

    /// Deletes fail as if the revision token were stale; instances stay live.
    pub(crate) fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    /// Every creation request received, in order, including rejected ones.
    pub(crate) fn created(&self) -> Vec<SandboxRequest> {
        self.state.lock().expect("lock not poisoned").created.clone()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.state.lock().expect("lock not poisoned").live.len()
    }

    /// Delete calls received, including failed ones.
    pub(crate) fn deleted(&self) -> usize {
        self.state.lock().expect("lock not poisoned").deleted
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.state.lock().expect("lock not poisoned").list_calls
    }
}

#[async_trait]
impl FlowRuntime for FakeRuntime {
    async fn list_types(&self) -> Result<Vec<ProcessorTypeEntry>, RuntimeError> {
        self.state.lock().expect("lock not poisoned").list_calls += 1;
        if self.fail_list_types {
            return Err(RuntimeError::Transport("connection refused".to_string()));
        }
        Ok(self.types.iter().map(ProcessorTypeEntry::new).collect())
    }

    async fn create_sandbox_processor(
        &self,
        _container_id: &str,
        request: &SandboxRequest,
    ) -> Result<SandboxHandle, RuntimeError> {
        let mut state = self.state.lock().expect("lock not poisoned");
        state.created.push(request.clone());
        if let Some(err) = (self.reject)(request) {
            return Err(err);
        }
        state.next_id += 1;
        let instance_id = format!("instance-{}", state.next_id);
        state.live.insert(instance_id.clone(), request.clone());
        Ok(SandboxHandle {
            instance_id,
            revision: RevisionToken {
                version: 1,
                client_id: Some("fake-client".to_string()),
            },
            payload: Value::Null,
        })
    }

    async fn inspect(&self, handle: &SandboxHandle) -> Result<ProcessorInspection, RuntimeError> {
        if self.fail_inspect {
            return Err(RuntimeError::Transport("read timed out".to_string()));
        }
        let state = self.state.lock().expect("lock not poisoned");
        let request = state.live.get(&handle.instance_id).ok_or_else(|| RuntimeError::Api {
            status: 404,
            message: format!("unknown processor {}", handle.instance_id),
        })?;
        Ok((self.inspect)(request))
    }

    async fn delete_instance(&self, handle: &SandboxHandle) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().expect("lock not poisoned");
        state.deleted += 1;
        if self.fail_delete {
            return Err(RuntimeError::Api {
                status: 409,
                message: format!("{} is not the most up-to-date revision", handle.revision.version),
            });
        }
        state.live.remove(&handle.instance_id);
        Ok(())
    }
}

/// LLM fake answering from a script; errors once the script runs out.
pub(crate) struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<usize>,
}

impl ScriptedLlm {
    pub(crate) fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            calls: Mutex::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        *self.calls.lock().expect("lock not poisoned")
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn generate(&self, _request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        *self.calls.lock().expect("lock not poisoned") += 1;
        let content = self
            .responses
            .lock()
            .expect("lock not poisoned")
            .pop_front()
            .ok_or_else(|| LlmError::RequestFailed("script exhausted".to_string()))?;
        Ok(GenerationResponse {
            id: "scripted".to_string(),
            model: "scripted-model".to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(content),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        })
    }
}
