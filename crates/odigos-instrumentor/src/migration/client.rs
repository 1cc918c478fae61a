use kube::api::{Api, ListParams, PostParams};
use kube::{Client, ResourceExt};

use crate::api::InstrumentationConfig;
use crate::error::{Error, Result};
use crate::workload::Workload;

/// The cluster operations the migration needs.
#[trait_variant::make(Send)]
pub trait ClusterClient {
    /// All `InstrumentationConfig`s of the cluster, in every namespace.
    async fn list_instrumentation_configs(&self) -> Result<Vec<InstrumentationConfig>>;

    async fn get_instrumentation_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<InstrumentationConfig>;

    /// Writes `status` through the status subresource.
    async fn update_instrumentation_config_status(
        &self,
        config: &InstrumentationConfig,
    ) -> Result<()>;

    async fn list_workloads<W: Workload>(&self, namespace: &str) -> Result<Vec<W>>;

    async fn update_workload<W: Workload>(&self, workload: &W) -> Result<()>;
}

#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn namespace_of<K: kube::Resource>(resource: &K) -> Result<String> {
    resource
        .namespace()
        .ok_or_else(|| Error::Others(format!("{} has no namespace", resource.name_any())))
}

impl ClusterClient for KubeClusterClient {
    async fn list_instrumentation_configs(&self) -> Result<Vec<InstrumentationConfig>> {
        let api: Api<InstrumentationConfig> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_instrumentation_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<InstrumentationConfig> {
        self.namespaced::<InstrumentationConfig>(namespace)
            .get_opt(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("InstrumentationConfig {namespace}/{name}")))
    }

    async fn update_instrumentation_config_status(
        &self,
        config: &InstrumentationConfig,
    ) -> Result<()> {
        let namespace = namespace_of(config)?;
        let data = serde_json::to_vec(config)?;
        self.namespaced::<InstrumentationConfig>(&namespace)
            .replace_status(&config.name_any(), &PostParams::default(), data)
            .await?;
        Ok(())
    }

    async fn list_workloads<W: Workload>(&self, namespace: &str) -> Result<Vec<W>> {
        Ok(self
            .namespaced::<W>(namespace)
            .list(&ListParams::default())
            .await?
            .items)
    }

    async fn update_workload<W: Workload>(&self, workload: &W) -> Result<()> {
        let namespace = namespace_of(workload)?;
        self.namespaced::<W>(&namespace)
            .replace(&workload.name_any(), &PostParams::default(), workload)
            .await?;
        Ok(())
    }
}
