//! Injection of agent environment variables into a container at pod admission.
//!
//! Odigos appends its agent fragment to the language's managed variables:
//! 1. Values declared in the manifest are patched in place.
//! 2. Values that come from the container image (as detected by runtime
//!    inspection) are copied into the manifest with the fragment appended.
//! 3. When neither exists, the bare managed values are set.
//!
//! Everything here works on the request-scoped container object; no I/O.

use std::sync::Arc;

use k8s_openapi::api::core::v1::{Container, EnvVar};
use odigos_envoverwrite::{
    ContainerOriginalEnv, OtelSdk, ProgrammingLanguage, Registry, contains_odigos_marker,
};

use crate::api::{ObservabilitySignal, ProcessingState, RuntimeDetailsByContainer};
use crate::config::InjectorConfig;
use crate::workload::PodWorkload;

pub const OTEL_TRACES_EXPORTER: &str = "OTEL_TRACES_EXPORTER";
pub const OTEL_METRICS_EXPORTER: &str = "OTEL_METRICS_EXPORTER";
pub const OTEL_LOGS_EXPORTER: &str = "OTEL_LOGS_EXPORTER";

const JAVA_OPTS: &str = "JAVA_OPTS";
const ORIGINAL_ENV_PREFIX: &str = "ORIGINAL_";

const OTEL_SIGNAL_EXPORTER_LANGUAGES: [ProgrammingLanguage; 2] =
    [ProgrammingLanguage::Java, ProgrammingLanguage::Php];

pub struct EnvInjector {
    registry: Arc<Registry>,
    config: InjectorConfig,
}

impl EnvInjector {
    pub fn new(registry: Arc<Registry>, config: InjectorConfig) -> Self {
        Self { registry, config }
    }

    /// Adds the agent environment for `sdk` to `container`.
    ///
    /// `receiver_signals` are the signals the node collector receives; when given,
    /// native Java and PHP agents get explicit `OTEL_*_EXPORTER` settings.
    ///
    /// Returns the pre-injection manifest value of every managed variable that was
    /// changed or added (`None` when it was not declared). The caller persists it
    /// with [`odigos_envoverwrite::OriginalWorkloadEnv::record_if_absent`].
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(workload = %pod_workload, container = %container.name), level = "Info"))]
    pub fn inject_odigos_agent_env_vars(
        &self,
        pod_workload: &PodWorkload,
        container: &mut Container,
        sdk: OtelSdk,
        runtime_details: &RuntimeDetailsByContainer,
        receiver_signals: Option<&[ObservabilitySignal]>,
    ) -> ContainerOriginalEnv {
        if OTEL_SIGNAL_EXPORTER_LANGUAGES.contains(&runtime_details.language)
            && sdk == OtelSdk::NATIVE_COMMUNITY
        {
            match receiver_signals {
                Some(signals) => set_otel_signals_exporter_env_vars(container, signals),
                None => log::warn!(
                    "node collector signals unknown for {pod_workload}, using OTEL exporter defaults"
                ),
            }
        }

        let env_names: Vec<&str> = self
            .registry
            .env_vars_for_language(runtime_details.language)
            .iter()
            .map(String::as_str)
            .filter(|name| !(self.config.avoid_injecting_java_opts && *name == JAVA_OPTS))
            .collect();
        if env_names.is_empty() {
            return ContainerOriginalEnv::new();
        }

        let before: Vec<(&str, Option<EnvVar>)> = env_names
            .iter()
            .map(|name| (*name, find_env(container, name).cloned()))
            .collect();

        let inject_allowed = should_inject(runtime_details, &container.name);
        let mut agent_env_appended = false;
        for name in &env_names {
            if self.handle_manifest_env_var(container, name, &sdk) {
                agent_env_appended = true;
                continue;
            }
            if inject_allowed
                && self.inject_env_var_from_runtime(container, name, &sdk, runtime_details)
            {
                agent_env_appended = true;
            }
        }

        // A single agent is enough: JAVA_OPTS and JAVA_TOOL_OPTIONS would both load it.
        if !agent_env_appended && inject_allowed {
            self.apply_odigos_env_defaults(container, &env_names, &sdk);
        }

        self.original_env_snapshot(&before, container)
    }

    /// Returns true when the manifest is authoritative for the variable, whether
    /// or not it had to be changed.
    fn handle_manifest_env_var(&self, container: &mut Container, name: &str, sdk: &OtelSdk) -> bool {
        let Some(manifest_env) = find_env(container, name) else {
            return false;
        };
        let has_value_from = manifest_env.value_from.is_some();
        let value = manifest_env.value.clone().unwrap_or_default();
        if !has_value_from && value.is_empty() {
            return false;
        }

        let Some(managed) = self.registry.value_for(name, sdk) else {
            return true;
        };

        if has_value_from {
            self.handle_value_from_env_var(container, name, managed);
            return true;
        }

        if contains_odigos_marker(&value) {
            log::info!(
                "env var {name} in container {} already includes odigos values, skipping injection",
                container.name
            );
            return true;
        }

        if let Some(updated) = self.registry.append_odigos_additions(name, &value, managed) {
            log::info!(
                "updated manifest env var {name} in container {}: {updated}",
                container.name
            );
            if let Some(env) = find_env_mut(container, name) {
                env.value = Some(updated);
            }
        }
        true
    }

    /// `NAME` taken from a ConfigMap or Secret becomes `ORIGINAL_NAME`, and `NAME`
    /// is redefined as `$(ORIGINAL_NAME)` plus the managed value.
    fn handle_value_from_env_var(&self, container: &mut Container, name: &str, managed: &str) {
        let original_name = format!("{ORIGINAL_ENV_PREFIX}{name}");
        let reference = format!("$({original_name})");
        let Some(combined) = self.registry.append_odigos_additions(name, &reference, managed) else {
            return;
        };

        if let Some(env) = find_env_mut(container, name) {
            env.name = original_name;
        }
        push_env(
            container,
            EnvVar {
                name: name.to_string(),
                value: Some(combined),
                value_from: None,
            },
        );
    }

    fn inject_env_var_from_runtime(
        &self,
        container: &mut Container,
        name: &str,
        sdk: &OtelSdk,
        runtime_details: &RuntimeDetailsByContainer,
    ) -> bool {
        let Some(managed) = self.registry.value_for(name, sdk) else {
            return false;
        };
        // an empty value is the same as no value, the defaults take care of it
        let Some(runtime_env) = runtime_details
            .env_from_container_runtime(name)
            .filter(|env| !env.value.is_empty())
        else {
            return false;
        };
        let Some(patched) = self
            .registry
            .append_odigos_additions(name, &runtime_env.value, managed)
        else {
            return false;
        };

        log::info!(
            "injecting {name} into container {} based on runtime details",
            container.name
        );
        set_or_push_env(container, name, patched);
        true
    }

    fn apply_odigos_env_defaults(&self, container: &mut Container, env_names: &[&str], sdk: &OtelSdk) {
        for name in env_names {
            let Some(managed) = self.registry.value_for(name, sdk) else {
                continue;
            };
            let declared = find_env(container, name).is_some_and(|env| {
                env.value_from.is_some() || !env.value.as_deref().unwrap_or_default().is_empty()
            });
            if !declared {
                set_or_push_env(container, name, managed.to_owned());
            }
        }
    }

    fn original_env_snapshot(
        &self,
        before: &[(&str, Option<EnvVar>)],
        container: &Container,
    ) -> ContainerOriginalEnv {
        let mut snapshot = ContainerOriginalEnv::new();
        for (name, previous) in before {
            if previous.as_ref() == find_env(container, name) {
                continue;
            }
            if previous.as_ref().is_some_and(|env| env.value_from.is_some()) {
                continue;
            }
            let original = previous
                .as_ref()
                .and_then(|env| env.value.as_deref())
                .map(|value| self.registry.strip_odigos_values(name, value))
                .filter(|value| !value.is_empty());
            snapshot.insert(name.to_string(), original);
        }
        snapshot
    }
}

/// Whether runtime inspection results can be trusted for this container.
pub fn should_inject(runtime_details: &RuntimeDetailsByContainer, container_name: &str) -> bool {
    match runtime_details.runtime_update_state {
        // neither runtime inspection nor the migration ran for this container yet
        None => {
            log::info!(
                "runtime update state is unset, skipping env injection for container {container_name}"
            );
            false
        }
        Some(ProcessingState::Failed) => {
            let cri_error = runtime_details.cri_error_message.as_deref().unwrap_or_default();
            log::info!(
                "runtime inspection failed, skipping env injection for container {container_name}: {cri_error}"
            );
            false
        }
        Some(ProcessingState::Succeeded | ProcessingState::Skipped) => true,
    }
}

fn set_otel_signals_exporter_env_vars(container: &mut Container, signals: &[ObservabilitySignal]) {
    let exporter = |signal: ObservabilitySignal| {
        if signals.contains(&signal) { "otlp" } else { "none" }
    };
    let vars = [
        (OTEL_LOGS_EXPORTER, exporter(ObservabilitySignal::Logs)),
        (OTEL_METRICS_EXPORTER, exporter(ObservabilitySignal::Metrics)),
        (OTEL_TRACES_EXPORTER, exporter(ObservabilitySignal::Traces)),
    ];
    for (name, value) in vars {
        if find_env(container, name).is_none() {
            push_env(
                container,
                EnvVar {
                    name: name.to_string(),
                    value: Some(value.to_string()),
                    value_from: None,
                },
            );
        }
    }
}

fn find_env<'a>(container: &'a Container, name: &str) -> Option<&'a EnvVar> {
    container.env.as_ref()?.iter().find(|env| env.name == name)
}

fn find_env_mut<'a>(container: &'a mut Container, name: &str) -> Option<&'a mut EnvVar> {
    container.env.as_mut()?.iter_mut().find(|env| env.name == name)
}

fn push_env(container: &mut Container, env: EnvVar) {
    container.env.get_or_insert_with(Vec::new).push(env);
}

/// Fills an existing empty entry in place so the name is never declared twice.
fn set_or_push_env(container: &mut Container, name: &str, value: String) {
    match find_env_mut(container, name) {
        Some(env) => env.value = Some(value),
        None => push_env(
            container,
            EnvVar {
                name: name.to_string(),
                value: Some(value),
                value_from: None,
            },
        ),
    }
}

#[cfg(test)]
mod tests;
