//! NiFi REST API client.
//!
//! Implements [`FlowRuntime`] on top of the `/nifi-api` endpoints. This is the
//! only place that looks at NiFi's wording: creation refusals and validation
//! messages are classified here into [`RejectionKind`] and [`DiagnosticKind`].

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    AllowableValue, Diagnostic, DiagnosticKind, FlowRuntime, ProcessorInspection,
    ProcessorTypeEntry, PropertyDescriptor, RevisionToken, SandboxHandle, SandboxRequest,
};
use crate::error::{RejectionKind, RuntimeError};

/// Timeout for catalog and delete requests.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Timeout for processor creation, which instantiates the component.
const CREATE_TIMEOUT_SECS: u64 = 15;

/// Horizontal spacing between sandbox processors on the canvas.
const SANDBOX_LAYOUT_SPACING: usize = 500;

/// Prefix given to every sandbox processor name.
const SANDBOX_NAME_PREFIX: &str = "VALIDATION-";

/// Client for a NiFi instance.
pub struct NifiClient {
    base_url: String,
    auth_token: Option<String>,
    http_client: Client,
}

impl std::fmt::Debug for NifiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NifiClient")
            .field("base_url", &self.base_url)
            .field("has_auth_token", &self.auth_token.is_some())
            .finish_non_exhaustive()
    }
}

impl NifiClient {
    /// Create a client for the NiFi instance at `base_url`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Instance root, e.g. `https://localhost:8443`
    /// * `auth_token` - Optional bearer token
    /// * `verify_tls` - Set to `false` to accept self-signed certificates
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::MissingBaseUrl` for an empty URL and
    /// `RuntimeError::Transport` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        verify_tls: bool,
    ) -> Result<Self, RuntimeError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(RuntimeError::MissingBaseUrl);
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(|e| RuntimeError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            auth_token: auth_token.filter(|t| !t.is_empty()),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Deletes an instance whose creation response could not be read, using
    /// the revision sent at creation.
    async fn discard_unreadable(&self, instance_id: String, client_id: String) {
        let handle = SandboxHandle {
            instance_id,
            revision: RevisionToken {
                version: 0,
                client_id: Some(client_id),
            },
            payload: Value::Null,
        };
        match self.delete_instance(&handle).await {
            Ok(()) => debug!(instance_id = %handle.instance_id, "Deleted unreadable sandbox processor"),
            Err(e) => warn!(
                instance_id = %handle.instance_id,
                error = %e,
                "Failed to delete unreadable sandbox processor"
            ),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/nifi-api{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }
}

#[async_trait]
impl FlowRuntime for NifiClient {
    async fn list_types(&self) -> Result<Vec<ProcessorTypeEntry>, RuntimeError> {
        let request = self.http_client.get(self.url("/flow/processor-types"));
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| RuntimeError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RuntimeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RuntimeError::UnexpectedResponse(e.to_string()))?;
        parse_processor_types(&body)
    }

    async fn create_sandbox_processor(
        &self,
        container_id: &str,
        request: &SandboxRequest,
    ) -> Result<SandboxHandle, RuntimeError> {
        let url = self.url(&format!("/process-groups/{}/processors", container_id));
        let client_id = Uuid::new_v4().to_string();
        let payload = creation_payload(request, &client_id);

        let http_request = self
            .http_client
            .post(&url)
            .timeout(Duration::from_secs(CREATE_TIMEOUT_SECS))
            .header("Content-Type", "application/json")
            .json(&payload);
        let response = self
            .authorize(http_request)
            .send()
            .await
            .map_err(|e| RuntimeError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 201 {
            let body = response.text().await.unwrap_or_default();
            return Err(RuntimeError::Rejected {
                status,
                kind: classify_rejection(status, &body),
                message: body,
            });
        }

        let location_id = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(instance_id_from_location);

        let parsed = match response.json::<Value>().await {
            Ok(entity) => parse_created_entity(entity, &client_id),
            Err(e) => Err(RuntimeError::UnexpectedResponse(e.to_string())),
        };
        match parsed {
            Ok(handle) => {
                debug!(instance_id = %handle.instance_id, version = handle.revision.version, "Created sandbox processor");
                Ok(handle)
            }
            Err(err) => {
                if let Some(instance_id) = location_id {
                    self.discard_unreadable(instance_id, client_id).await;
                }
                Err(err)
            }
        }
    }

    async fn inspect(&self, handle: &SandboxHandle) -> Result<ProcessorInspection, RuntimeError> {
        parse_inspection(&handle.payload)
    }

    async fn delete_instance(&self, handle: &SandboxHandle) -> Result<(), RuntimeError> {
        let mut url = format!(
            "{}?version={}",
            self.url(&format!("/processors/{}", handle.instance_id)),
            handle.revision.version
        );
        if let Some(client_id) = &handle.revision.client_id {
            url.push_str("&clientId=");
            url.push_str(client_id);
        }

        let response = self
            .authorize(self.http_client.delete(&url))
            .send()
            .await
            .map_err(|e| RuntimeError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RuntimeError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

/// Builds the processor-creation entity posted to the sandbox container.
fn creation_payload(request: &SandboxRequest, client_id: &str) -> Value {
    json!({
        "revision": { "version": 0, "clientId": client_id },
        "component": {
            "type": request.processor_type,
            "name": format!("{}{}", SANDBOX_NAME_PREFIX, request.name),
            "position": { "x": request.index * SANDBOX_LAYOUT_SPACING, "y": 0 },
            "config": {
                "properties": request.properties,
                "schedulingStrategy": request.scheduling.strategy,
                "schedulingPeriod": request.scheduling.period,
                "concurrentlySchedulableTaskCount": request.scheduling.concurrent_tasks,
            }
        }
    })
}

/// Maps a creation refusal onto a [`RejectionKind`].
pub(crate) fn classify_rejection(status: u16, body: &str) -> RejectionKind {
    if status == 400 && body.to_lowercase().contains("scheduling period") {
        RejectionKind::InvalidScheduling
    } else {
        RejectionKind::Other
    }
}

/// Maps a validation message onto a [`DiagnosticKind`].
///
/// NiFi prefixes routing messages with the quoted subject, e.g.
/// `'Relationship success' is invalid because ...`.
pub(crate) fn classify_diagnostic(message: &str) -> DiagnosticKind {
    if message.starts_with("'Relationship") {
        DiagnosticKind::Relationship
    } else if message.starts_with("'Upstream Connections") {
        DiagnosticKind::UpstreamConnection
    } else {
        DiagnosticKind::Property
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessorTypesResponse {
    processor_types: Vec<ProcessorTypeDto>,
}

#[derive(Debug, Deserialize)]
struct ProcessorTypeDto {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    description: Option<String>,
}

pub(crate) fn parse_processor_types(body: &Value) -> Result<Vec<ProcessorTypeEntry>, RuntimeError> {
    let parsed: ProcessorTypesResponse = serde_json::from_value(body.clone()).map_err(|e| {
        RuntimeError::UnexpectedResponse(format!("processor-types endpoint: {}", e))
    })?;
    Ok(parsed
        .processor_types
        .into_iter()
        .map(|t| ProcessorTypeEntry {
            identifier: t.type_name,
            description: t.description,
        })
        .collect())
}

/// Builds a handle from the creation response. A missing revision falls back
/// to the one sent with the request so the instance can still be deleted.
pub(crate) fn parse_created_entity(
    entity: Value,
    sent_client_id: &str,
) -> Result<SandboxHandle, RuntimeError> {
    let instance_id = entity
        .pointer("/component/id")
        .or_else(|| entity.get("id"))
        .and_then(Value::as_str)
        .ok_or_else(|| RuntimeError::UnexpectedResponse("created processor has no id".to_string()))?
        .to_string();
    let version = match entity.pointer("/revision/version").and_then(Value::as_u64) {
        Some(version) => version,
        None => {
            warn!(instance_id = %instance_id, "Created processor has no revision version; assuming 0");
            0
        }
    };
    let client_id = entity
        .pointer("/revision/clientId")
        .and_then(Value::as_str)
        .unwrap_or(sent_client_id)
        .to_string();

    Ok(SandboxHandle {
        instance_id,
        revision: RevisionToken {
            version,
            client_id: Some(client_id),
        },
        payload: entity,
    })
}

/// Last path segment of a `Location` header, e.g. `.../processors/{id}`.
pub(crate) fn instance_id_from_location(location: &str) -> Option<String> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
        .map(str::to_string)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComponentDto {
    #[serde(default)]
    config: Option<ConfigDto>,
    #[serde(default)]
    relationships: Vec<RelationshipDto>,
    #[serde(default)]
    validation_errors: Option<Vec<String>>,
    #[serde(default)]
    supports_dynamic_properties: bool,
}

#[derive(Debug, Deserialize)]
struct ConfigDto {
    #[serde(default)]
    descriptors: HashMap<String, DescriptorDto>,
}

#[derive(Debug, Deserialize)]
struct RelationshipDto {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptorDto {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    sensitive: bool,
    #[serde(default)]
    supports_el: bool,
    #[serde(default)]
    allowable_values: Option<Vec<AllowableValueEntityDto>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllowableValueEntityDto {
    allowable_value: AllowableValueDto,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllowableValueDto {
    value: String,
    #[serde(default)]
    display_name: Option<String>,
}

pub(crate) fn parse_inspection(entity: &Value) -> Result<ProcessorInspection, RuntimeError> {
    let component = entity.get("component").cloned().ok_or_else(|| {
        RuntimeError::UnexpectedResponse("processor entity has no component".to_string())
    })?;
    let component: ComponentDto = serde_json::from_value(component)
        .map_err(|e| RuntimeError::UnexpectedResponse(format!("processor component: {}", e)))?;

    let descriptors = component
        .config
        .map(|config| config.descriptors)
        .unwrap_or_default()
        .into_iter()
        .map(|(name, d)| {
            let descriptor = PropertyDescriptor {
                description: d.description,
                required: d.required,
                sensitive: d.sensitive,
                supports_expression_language: d.supports_el,
                allowable_values: d.allowable_values.map(|values| {
                    values
                        .into_iter()
                        .map(|v| AllowableValue {
                            value: v.allowable_value.value,
                            display_name: v.allowable_value.display_name,
                        })
                        .collect()
                }),
            };
            (name, descriptor)
        })
        .collect();

    let available_relationships: BTreeSet<String> = component
        .relationships
        .into_iter()
        .map(|r| r.name)
        .collect();

    let diagnostics = component
        .validation_errors
        .unwrap_or_default()
        .into_iter()
        .map(|message| Diagnostic {
            kind: classify_diagnostic(&message),
            message,
        })
        .collect();

    Ok(ProcessorInspection {
        descriptors,
        available_relationships,
        diagnostics,
        supports_dynamic_properties: component.supports_dynamic_properties,
    })
}
