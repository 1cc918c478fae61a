//! The `InstrumentationConfig` custom resource and the runtime details it carries.
//!
//! Only the fields the env injection and migration read or write are modelled;
//! unknown fields of the stored object are ignored on read.

use kube::CustomResource;
use odigos_envoverwrite::ProgrammingLanguage;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "odigos.io",
    version = "v1alpha1",
    kind = "InstrumentationConfig",
    namespaced,
    status = "InstrumentationConfigStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentationConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentationConfigStatus {
    #[serde(default)]
    pub runtime_details_by_container: Vec<RuntimeDetailsByContainer>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ProcessingState {
    /// Runtime inspection read the container environment
    Succeeded,
    /// Inspection failed, the detected env must not be trusted
    Failed,
    /// The manifest is authoritative for the env, inspection was not needed
    Skipped,
}

/// What runtime inspection detected for one container.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeDetailsByContainer {
    pub container_name: String,
    #[schemars(with = "String")]
    pub language: ProgrammingLanguage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,
    /// Process environment as seen by inspection
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_vars: Vec<EnvVar>,
    /// Values of managed variables coming from the container image rather than
    /// the manifest
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_from_container_runtime: Vec<EnvVar>,
    /// Unset until inspection ran at least once; never unset afterwards
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_update_state: Option<ProcessingState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cri_error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_execution_mode: Option<bool>,
}

impl RuntimeDetailsByContainer {
    pub fn env_from_container_runtime(&self, name: &str) -> Option<&EnvVar> {
        self.env_from_container_runtime
            .iter()
            .find(|env| env.name == name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ObservabilitySignal {
    Traces,
    Metrics,
    Logs,
}
