//! Snapshot of container environment variables as they were before Odigos touched
//! them, persisted on the workload as a JSON annotation:
//!
//! ```text
//! odigos.io/manifest-env-original-val: {"app":{"JAVA_TOOL_OPTIONS":"-Xmx1g","JAVA_OPTS":null}}
//! ```
//!
//! A `null` value means the variable was not set in the manifest before Odigos.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

pub const ORIGINAL_ENV_ANNOTATION: &str = "odigos.io/manifest-env-original-val";

/// Env var name to its pre-Odigos manifest value.
pub type ContainerOriginalEnv = BTreeMap<String, Option<String>>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OriginalWorkloadEnv {
    containers: BTreeMap<String, ContainerOriginalEnv>,
}

impl OriginalWorkloadEnv {
    /// Reads the snapshot from workload annotations. A missing annotation is an
    /// empty snapshot.
    pub fn from_annotations(annotations: Option<&BTreeMap<String, String>>) -> Result<Self> {
        let Some(raw) = annotations.and_then(|a| a.get(ORIGINAL_ENV_ANNOTATION)) else {
            return Ok(Self::default());
        };
        let containers =
            serde_json::from_str(raw).map_err(|source| Error::MalformedAnnotation {
                annotation: ORIGINAL_ENV_ANNOTATION,
                source,
            })?;
        Ok(Self { containers })
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn container(&self, name: &str) -> Option<&ContainerOriginalEnv> {
        self.containers.get(name)
    }

    pub fn container_mut(&mut self, name: &str) -> Option<&mut ContainerOriginalEnv> {
        self.containers.get_mut(name)
    }

    /// Replaces the whole snapshot of a container.
    pub fn insert_container(&mut self, name: impl Into<String>, env: ContainerOriginalEnv) {
        self.containers.insert(name.into(), env);
    }

    /// Stores the snapshot only the first time a container is touched. Returns
    /// whether anything was written.
    pub fn record_if_absent(&mut self, name: impl Into<String>, env: ContainerOriginalEnv) -> bool {
        if env.is_empty() {
            return false;
        }
        let name = name.into();
        if self.containers.contains_key(&name) {
            log::debug!("original env of container {name} already recorded, keeping it");
            return false;
        }
        self.containers.insert(name, env);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ContainerOriginalEnv)> {
        self.containers.iter()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.containers)?)
    }

    pub fn write_to_annotations(&self, annotations: &mut BTreeMap<String, String>) -> Result<()> {
        annotations.insert(ORIGINAL_ENV_ANNOTATION.to_string(), self.to_json()?);
        Ok(())
    }

    /// Returns whether the annotation was present.
    pub fn remove_from_annotations(annotations: &mut BTreeMap<String, String>) -> bool {
        annotations.remove(ORIGINAL_ENV_ANNOTATION).is_some()
    }
}
