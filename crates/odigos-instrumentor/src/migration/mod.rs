//! One-shot repair of env state written by earlier Odigos versions.
//!
//! Older versions recorded the "original" manifest value after Odigos had already
//! appended its agent fragment. Such values are cleaned, moved to
//! `envFromContainerRuntime` where the injector picks them up, and every
//! container gets a `runtimeUpdateState` so the injector trusts its details.
//!
//! Each step is idempotent. A failed pass is repaired by the next start, there
//! is no requeue.

mod client;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Container;
use kube::ResourceExt;
use odigos_envoverwrite::{
    ContainerOriginalEnv, OriginalWorkloadEnv, Registry, contains_odigos_marker,
};

pub use self::client::{ClusterClient, KubeClusterClient};
use crate::api::{EnvVar, InstrumentationConfig, ProcessingState, RuntimeDetailsByContainer};
use crate::error::{Error, Result};
use crate::workload::{Workload, WorkloadKind, parse_runtime_object_name};

/// namespace -> workload name -> name of its `InstrumentationConfig`
type NamespaceIndex = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MigrationFailure {
    /// Listing a workload kind failed, the rest of that kind was skipped
    ListWorkloads {
        kind: WorkloadKind,
        namespace: String,
        error: String,
    },
    Workload {
        kind: WorkloadKind,
        namespace: String,
        name: String,
        error: String,
    },
}

impl fmt::Display for MigrationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationFailure::ListWorkloads {
                kind,
                namespace,
                error,
            } => write!(f, "listing {kind} in {namespace}: {error}"),
            MigrationFailure::Workload {
                kind,
                namespace,
                name,
                error,
            } => write!(f, "{kind} {namespace}/{name}: {error}"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub workloads_visited: usize,
    /// Workloads whose original env annotation was rewritten
    pub workloads_updated: usize,
    pub statuses_updated: usize,
    pub failures: Vec<MigrationFailure>,
}

impl MigrationReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn workload_failed(&mut self, kind: WorkloadKind, namespace: &str, name: &str, err: &Error) {
        log::error!("failed to migrate env of {kind} {namespace}/{name}: {err}");
        self.failures.push(MigrationFailure::Workload {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            error: err.to_string(),
        });
    }
}

pub struct MigrationRunnable<C> {
    client: C,
    registry: Arc<Registry>,
}

impl<C: ClusterClient + Sync> MigrationRunnable<C> {
    /// `registry` is used to strip stored values and should know every SDK variant
    /// the cluster may have used, i.e. [`Registry::builtin`].
    pub fn new(client: C, registry: Arc<Registry>) -> Self {
        Self { client, registry }
    }

    /// Every replica runs the migration; it only converges state.
    pub fn need_leader_election(&self) -> bool {
        false
    }

    /// Runs the migration once. Only a failure to list `InstrumentationConfig`s is
    /// an error, everything else is logged and collected in the report.
    ///
    /// Per workload the runtime details are written before the original env
    /// annotation; a failed write is recorded and the next workload is processed.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, level = "Info"))]
    pub async fn start(&self) -> Result<MigrationReport> {
        let configs = self.client.list_instrumentation_configs().await.map_err(|err| {
            log::error!("failed to list InstrumentationConfigs: {err}");
            err
        })?;
        let index = index_instrumentation_configs(configs);

        let mut report = MigrationReport::default();
        for kind in WorkloadKind::ALL {
            let Some(namespaces) = index.get(&kind) else {
                continue;
            };
            match kind {
                WorkloadKind::Deployment => {
                    self.migrate_kind::<Deployment>(namespaces, &mut report).await
                }
                WorkloadKind::StatefulSet => {
                    self.migrate_kind::<StatefulSet>(namespaces, &mut report).await
                }
                WorkloadKind::DaemonSet => {
                    self.migrate_kind::<DaemonSet>(namespaces, &mut report).await
                }
            }
        }

        log::info!(
            "env migration done: {} workloads visited, {} updated, {} statuses updated, {} failures",
            report.workloads_visited,
            report.workloads_updated,
            report.statuses_updated,
            report.failures.len()
        );
        Ok(report)
    }

    async fn migrate_kind<W: Workload>(
        &self,
        namespaces: &NamespaceIndex,
        report: &mut MigrationReport,
    ) {
        for (namespace, configs_by_workload) in namespaces {
            let workloads = match self.client.list_workloads::<W>(namespace).await {
                Ok(workloads) => workloads,
                Err(err) => {
                    log::error!("failed to list {} in namespace {namespace}: {err}", W::KIND);
                    report.failures.push(MigrationFailure::ListWorkloads {
                        kind: W::KIND,
                        namespace: namespace.clone(),
                        error: err.to_string(),
                    });
                    return;
                }
            };

            for mut workload in workloads {
                let name = workload.name_any();
                let Some(config_name) = configs_by_workload.get(&name) else {
                    continue;
                };
                report.workloads_visited += 1;

                if let Err(err) = self
                    .migrate_workload(&mut workload, namespace, config_name, report)
                    .await
                {
                    report.workload_failed(W::KIND, namespace, &name, &err);
                }
            }
        }
    }

    async fn migrate_workload<W: Workload>(
        &self,
        workload: &mut W,
        namespace: &str,
        config_name: &str,
        report: &mut MigrationReport,
    ) -> Result<()> {
        let mut original_env =
            OriginalWorkloadEnv::from_annotations(workload.meta().annotations.as_ref())?;
        let mut config = self
            .client
            .get_instrumentation_config(namespace, config_name)
            .await?;

        let template = workload.pod_template().ok_or_else(|| Error::MissingPodTemplate {
            kind: W::KIND,
            namespace: namespace.to_string(),
            name: workload.name_any(),
        })?;
        let containers = template
            .spec
            .as_ref()
            .map(|spec| spec.containers.as_slice())
            .unwrap_or_default();

        let previous_details = config
            .status
            .as_ref()
            .map(|status| status.runtime_details_by_container.clone())
            .unwrap_or_default();
        let mut details = previous_details.clone();

        let mut rewrite_annotation = false;
        for container in containers {
            for runtime_details in details
                .iter_mut()
                .filter(|rd| rd.container_name == container.name)
            {
                rewrite_annotation |= migrate_container(
                    &self.registry,
                    container,
                    original_env.container_mut(&container.name),
                    runtime_details,
                );
            }
        }

        let name = workload.name_any();
        let mut status_persisted = true;
        if details != previous_details {
            config
                .status
                .get_or_insert_with(Default::default)
                .runtime_details_by_container = details;
            match self.client.update_instrumentation_config_status(&config).await {
                Ok(()) => {
                    log::info!(
                        "updated runtime details of InstrumentationConfig {namespace}/{config_name}"
                    );
                    report.statuses_updated += 1;
                }
                Err(err) => {
                    status_persisted = false;
                    report.workload_failed(W::KIND, namespace, &name, &err);
                }
            }
        }

        // a cleaned annotation hides the marker from later passes, so it is only
        // written once the runtime details derived from it are stored
        if rewrite_annotation && status_persisted {
            let annotations = workload
                .meta_mut()
                .annotations
                .get_or_insert_with(BTreeMap::new);
            original_env.write_to_annotations(annotations)?;
            match self.client.update_workload(workload).await {
                Ok(()) => {
                    log::info!(
                        "rewrote original env annotation of {} {namespace}/{name}",
                        W::KIND
                    );
                    report.workloads_updated += 1;
                }
                Err(err) => report.workload_failed(W::KIND, namespace, &name, &err),
            }
        }

        Ok(())
    }
}

fn index_instrumentation_configs(
    configs: Vec<InstrumentationConfig>,
) -> BTreeMap<WorkloadKind, NamespaceIndex> {
    let mut index: BTreeMap<WorkloadKind, NamespaceIndex> = BTreeMap::new();
    for config in configs {
        let config_name = config.name_any();
        let (kind, workload_name) = match parse_runtime_object_name(&config_name) {
            Ok(parsed) => parsed,
            Err(err) => {
                log::error!("skipping InstrumentationConfig: {err}");
                continue;
            }
        };
        index
            .entry(kind)
            .or_default()
            .entry(config.namespace().unwrap_or_default())
            .or_default()
            .insert(workload_name, config_name);
    }
    index
}

fn has_env(env_vars: &[EnvVar], name: &str) -> bool {
    env_vars.iter().any(|env| env.name == name)
}

fn manifest_value<'a>(container: &'a Container, name: &str) -> Option<&'a str> {
    container
        .env
        .as_ref()?
        .iter()
        .find(|env| env.name == name)?
        .value
        .as_deref()
}

/// Migrates one container's runtime details and stored originals. Returns whether
/// the stored originals changed.
fn migrate_container(
    registry: &Registry,
    container: &Container,
    mut stored: Option<&mut ContainerOriginalEnv>,
    details: &mut RuntimeDetailsByContainer,
) -> bool {
    let mut stored_changed = false;
    let mut moved_to_runtime = false;

    // originals that were captured after injection
    for (name, value) in stored.iter_mut().flat_map(|env| env.iter_mut()) {
        let Some(stored_value) = value.as_deref().filter(|v| contains_odigos_marker(v)) else {
            continue;
        };
        let cleaned = registry.strip_odigos_values(name, stored_value);
        // an agent path the registry does not know is left for the webhook
        if cleaned == stored_value {
            continue;
        }
        *value = (!cleaned.is_empty()).then(|| cleaned.clone());
        stored_changed = true;

        if cleaned.is_empty() || has_env(&details.env_from_container_runtime, name) {
            continue;
        }
        details
            .env_from_container_runtime
            .push(EnvVar::new(name.as_str(), cleaned));
        moved_to_runtime = true;
    }
    if moved_to_runtime {
        details.runtime_update_state = Some(ProcessingState::Succeeded);
    }

    if details.runtime_update_state.is_some() {
        details
            .env_from_container_runtime
            .retain(|env| !contains_odigos_marker(&env.value));
        return stored_changed;
    }

    let Some(stored) = stored.as_deref().filter(|env| !env.is_empty()) else {
        details.runtime_update_state = Some(ProcessingState::Succeeded);
        return stored_changed;
    };

    for (name, value) in stored {
        if has_env(&details.env_from_container_runtime, name) {
            continue;
        }
        match value {
            // set by the image, Odigos only appended to it
            None => {
                let from_manifest = manifest_value(container, name)
                    .map(|v| registry.strip_odigos_values(name, v))
                    .filter(|v| !v.is_empty());
                if let Some(from_manifest) = from_manifest {
                    details
                        .env_from_container_runtime
                        .push(EnvVar::new(name.as_str(), from_manifest));
                }
                details.runtime_update_state = Some(ProcessingState::Succeeded);
            }
            // declared in the manifest, the webhook owns it
            Some(_) => details.runtime_update_state = Some(ProcessingState::Skipped),
        }
    }
    stored_changed
}
