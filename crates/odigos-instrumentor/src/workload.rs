//! Workload kinds Odigos instruments and how their names map onto
//! `InstrumentationConfig` names.

use std::fmt;

use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
}

impl WorkloadKind {
    pub const ALL: [WorkloadKind; 3] = [
        WorkloadKind::Deployment,
        WorkloadKind::StatefulSet,
        WorkloadKind::DaemonSet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::DaemonSet => "DaemonSet",
        }
    }

    fn lower(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "deployment",
            WorkloadKind::StatefulSet => "statefulset",
            WorkloadKind::DaemonSet => "daemonset",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The workload that owns the pod being admitted.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PodWorkload {
    pub name: String,
    pub namespace: String,
    pub kind: WorkloadKind,
}

impl fmt::Display for PodWorkload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Name of the `InstrumentationConfig` describing a workload, e.g.
/// `deployment-frontend`.
pub fn runtime_object_name(kind: WorkloadKind, workload_name: &str) -> String {
    format!("{}-{}", kind.lower(), workload_name).to_lowercase()
}

/// Inverse of [`runtime_object_name`].
pub fn parse_runtime_object_name(name: &str) -> Result<(WorkloadKind, String)> {
    let invalid = || Error::InvalidRuntimeObjectName(name.to_string());
    let (prefix, workload_name) = name.split_once('-').ok_or_else(invalid)?;
    if workload_name.is_empty() {
        return Err(invalid());
    }
    let kind = WorkloadKind::ALL
        .into_iter()
        .find(|kind| kind.lower() == prefix)
        .ok_or_else(invalid)?;
    Ok((kind, workload_name.to_string()))
}

/// A workload API object with a pod template.
pub trait Workload:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    const KIND: WorkloadKind;

    fn pod_template(&self) -> Option<&PodTemplateSpec>;

    fn pod_template_mut(&mut self) -> Option<&mut PodTemplateSpec>;
}

macro_rules! impl_workload {
    ($ty:ty, $kind:expr) => {
        impl Workload for $ty {
            const KIND: WorkloadKind = $kind;

            fn pod_template(&self) -> Option<&PodTemplateSpec> {
                self.spec.as_ref().map(|spec| &spec.template)
            }

            fn pod_template_mut(&mut self) -> Option<&mut PodTemplateSpec> {
                self.spec.as_mut().map(|spec| &mut spec.template)
            }
        }
    };
}

impl_workload!(Deployment, WorkloadKind::Deployment);
impl_workload!(StatefulSet, WorkloadKind::StatefulSet);
impl_workload!(DaemonSet, WorkloadKind::DaemonSet);
