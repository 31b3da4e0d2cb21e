//! LLM-backed repair oracle.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::prompts::{
    CONFIGURATION_SYSTEM_PROMPT, CONFIGURATION_USER_TEMPLATE, SCHEDULING_SYSTEM_PROMPT,
    SCHEDULING_USER_TEMPLATE, STRUCTURE_SYSTEM_PROMPT, STRUCTURE_USER_TEMPLATE,
};
use super::{ConfigurationFix, Repair};
use crate::error::LlmError;
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::plan::{ProcessorSpec, SchedulingConfig};
use crate::runtime::PropertyDescriptor;
use crate::utils::json_extraction::{extract_json_object, JsonExtractionError};
use crate::validation::ValidationError;

/// Why an oracle answer was discarded.
#[derive(Debug, Error)]
pub enum RepairRejection {
    #[error("oracle request failed: {0}")]
    Provider(#[from] LlmError),

    #[error("oracle returned an empty response")]
    EmptyResponse,

    #[error(transparent)]
    Extraction(#[from] JsonExtractionError),

    #[error("oracle response has the wrong shape: {0}")]
    WrongShape(String),

    #[error("oracle response contains nothing to apply")]
    NothingToApply,
}

/// Generation settings for oracle calls.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Model identifier. Empty uses the provider's default model.
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.0,
            max_tokens: 4096,
        }
    }
}

/// Asks an LLM for replacement values when validation fails.
///
/// Every method degrades to [`Repair::NoFixAvailable`] on transport errors,
/// unparseable answers or answers of the wrong shape.
#[derive(Clone)]
pub struct RepairOracle {
    llm: Arc<dyn LlmProvider>,
    config: OracleConfig,
}

impl RepairOracle {
    pub fn new(llm: Arc<dyn LlmProvider>, config: OracleConfig) -> Self {
        Self { llm, config }
    }

    pub fn with_defaults(llm: Arc<dyn LlmProvider>) -> Self {
        Self::new(llm, OracleConfig::default())
    }

    /// Proposes a new property map and/or auto-terminated list for a
    /// processor the runtime rejected.
    pub async fn repair_configuration(
        &self,
        processor: &ProcessorSpec,
        errors: &[String],
        descriptors: &HashMap<String, PropertyDescriptor>,
    ) -> Repair<ConfigurationFix> {
        let prompt = CONFIGURATION_USER_TEMPLATE
            .replace("{processor}", &pretty(processor))
            .replace("{errors}", &pretty(&error_context(errors, descriptors)));

        let result = self
            .ask(CONFIGURATION_SYSTEM_PROMPT, prompt)
            .await
            .and_then(|content| parse_configuration_fix(&content));

        match result {
            Ok(fix) => {
                info!(processor = %processor.name, "Oracle proposed a configuration fix");
                Repair::Fix(fix)
            }
            Err(e) => {
                warn!(processor = %processor.name, error = %e, "No configuration fix available");
                Repair::NoFixAvailable
            }
        }
    }

    /// Proposes a scheduling configuration after the runtime refused one.
    pub async fn repair_scheduling(
        &self,
        scheduling: &SchedulingConfig,
        error_message: &str,
    ) -> Repair<SchedulingConfig> {
        let prompt = SCHEDULING_USER_TEMPLATE
            .replace("{scheduling}", &pretty(scheduling))
            .replace("{error}", error_message);

        match self
            .ask(SCHEDULING_SYSTEM_PROMPT, prompt)
            .await
            .and_then(|content| parse_scheduling_fix(&content))
        {
            Ok(fixed) => Repair::Fix(fixed),
            Err(e) => {
                warn!(error = %e, "No scheduling fix available");
                Repair::NoFixAvailable
            }
        }
    }

    /// Proposes a corrected `plan_details` object for a plan that failed the
    /// static checks.
    pub async fn repair_structure(
        &self,
        plan_details: &Value,
        errors: &[ValidationError],
        available_types: &[String],
    ) -> Repair<Value> {
        let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
        let prompt = STRUCTURE_USER_TEMPLATE
            .replace("{plan_details}", &pretty(plan_details))
            .replace("{errors}", &pretty(&messages))
            .replace("{types}", &pretty(&available_types));

        match self
            .ask(STRUCTURE_SYSTEM_PROMPT, prompt)
            .await
            .and_then(|content| parse_structure_fix(&content))
        {
            Ok(details) => Repair::Fix(details),
            Err(e) => {
                warn!(error = %e, "No structure fix available");
                Repair::NoFixAvailable
            }
        }
    }

    async fn ask(&self, system: &str, user: String) -> Result<String, RepairRejection> {
        let request = GenerationRequest::new(
            self.config.model.clone(),
            vec![Message::system(system), Message::user(user)],
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens)
        .with_json_response();

        let response = self.llm.generate(request).await?;
        debug!(
            model = %response.model,
            total_tokens = response.usage.total_tokens,
            "Oracle responded"
        );
        response
            .first_content()
            .filter(|content| !content.trim().is_empty())
            .map(str::to_string)
            .ok_or(RepairRejection::EmptyResponse)
    }
}

fn pretty<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// Pairs each error with the runtime descriptor of the property it names.
fn error_context(errors: &[String], descriptors: &HashMap<String, PropertyDescriptor>) -> Vec<Value> {
    let property_name = Regex::new(r"'([^']+)' is invalid").ok();

    errors
        .iter()
        .map(|error| {
            let details = property_name
                .as_ref()
                .and_then(|re| re.captures(error))
                .and_then(|captures| captures.get(1))
                .and_then(|name| descriptors.get(name.as_str()))
                .and_then(|descriptor| serde_json::to_value(descriptor).ok())
                .unwrap_or_else(|| json!({}));
            json!({ "error_message": error, "property_details": details })
        })
        .collect()
}

fn string_list(value: &Value, field: &str) -> Result<Vec<String>, RepairRejection> {
    let Value::Array(items) = value else {
        return Err(RepairRejection::WrongShape(format!(
            "`{}` must be a list",
            field
        )));
    };
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                RepairRejection::WrongShape(format!("`{}` must contain only strings", field))
            })
        })
        .collect()
}

/// Parses a configuration answer. Keys that are absent or null are not
/// applied; an empty map or list is applied as given. An answer with neither
/// key is rejected.
pub(crate) fn parse_configuration_fix(content: &str) -> Result<ConfigurationFix, RepairRejection> {
    let object = extract_json_object(content)?;

    let properties = match object.get("properties") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => {
            let mut properties = IndexMap::with_capacity(map.len());
            for (key, value) in map {
                let Some(value) = value.as_str() else {
                    return Err(RepairRejection::WrongShape(format!(
                        "property `{}` must be a string",
                        key
                    )));
                };
                properties.insert(key.clone(), value.to_string());
            }
            Some(properties)
        }
        Some(_) => {
            return Err(RepairRejection::WrongShape(
                "`properties` must be an object".to_string(),
            ))
        }
    };

    let auto_terminated_relationships = match object.get("auto_terminated_relationships") {
        None | Some(Value::Null) => None,
        Some(value) => Some(string_list(value, "auto_terminated_relationships")?),
    };

    if properties.is_none() && auto_terminated_relationships.is_none() {
        return Err(RepairRejection::NothingToApply);
    }

    Ok(ConfigurationFix {
        properties,
        auto_terminated_relationships,
    })
}

/// Parses a scheduling answer, either wrapped in `{"scheduling": ...}` or bare.
pub(crate) fn parse_scheduling_fix(content: &str) -> Result<SchedulingConfig, RepairRejection> {
    let object = extract_json_object(content)?;
    let inner = match object.get("scheduling") {
        Some(Value::Object(inner)) => inner.clone(),
        Some(_) => {
            return Err(RepairRejection::WrongShape(
                "`scheduling` must be an object".to_string(),
            ))
        }
        None => object,
    };

    let scheduling: SchedulingConfig = serde_json::from_value(Value::Object(inner))
        .map_err(|e| RepairRejection::WrongShape(e.to_string()))?;

    if scheduling.strategy.is_none()
        && scheduling.period.is_none()
        && scheduling.concurrent_tasks.is_none()
    {
        return Err(RepairRejection::NothingToApply);
    }
    Ok(scheduling)
}

/// Parses a structure answer, either wrapped in `{"plan_details": ...}` or bare.
pub(crate) fn parse_structure_fix(content: &str) -> Result<Value, RepairRejection> {
    let object = extract_json_object(content)?;
    let details: Map<String, Value> = match object.get("plan_details") {
        Some(Value::Object(details)) => details.clone(),
        Some(_) => {
            return Err(RepairRejection::WrongShape(
                "`plan_details` must be an object".to_string(),
            ))
        }
        None => object,
    };

    if !details.contains_key("processors") {
        return Err(RepairRejection::WrongShape(
            "corrected plan_details has no `processors`".to_string(),
        ));
    }
    Ok(Value::Object(details))
}
