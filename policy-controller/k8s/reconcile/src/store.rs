use crate::ResourceId;
use selinux_policy_controller_k8s_api::{
    self as k8s, Api, ConfigMap, DeleteParams, ListParams, Node, Pod, PostParams, SelinuxPolicy,
};
use thiserror::Error;

/// Reads and writes the resources the reconcilers operate on.
///
/// Reads report a missing object as `None`. Writes report a missing object as
/// [`StoreError::NotFound`] and a name collision on create as
/// [`StoreError::AlreadyExists`] so that callers can decide whether the
/// condition is benign.
#[async_trait::async_trait]
pub trait Store: Send + Sync + 'static {
    async fn get_policy(&self, id: &ResourceId) -> Result<Option<SelinuxPolicy>, StoreError>;

    /// Replaces a policy's metadata and spec. The status is left untouched.
    async fn update_policy(&self, policy: &SelinuxPolicy) -> Result<SelinuxPolicy, StoreError>;

    /// Writes a policy's status. The metadata and spec are left untouched.
    async fn update_policy_status(
        &self,
        policy: &SelinuxPolicy,
    ) -> Result<SelinuxPolicy, StoreError>;

    async fn get_config_map(&self, id: &ResourceId) -> Result<Option<ConfigMap>, StoreError>;

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError>;

    /// Deletes a ConfigMap along with every pod it owns.
    async fn delete_config_map(&self, id: &ResourceId) -> Result<(), StoreError>;

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError>;

    async fn get_pod(&self, id: &ResourceId) -> Result<Option<Pod>, StoreError>;

    async fn create_pod(&self, pod: &Pod) -> Result<Pod, StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("resource not found")]
    NotFound,

    #[error("resource already exists")]
    AlreadyExists,

    #[error(transparent)]
    Kube(kube::Error),
}

/// A [`Store`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeStore {
    client: k8s::Client,
}

// === impl StoreError ===

impl From<kube::Error> for StoreError {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(ref rsp) if rsp.code == 404 => Self::NotFound,
            kube::Error::Api(ref rsp) if rsp.code == 409 && rsp.reason == "AlreadyExists" => {
                Self::AlreadyExists
            }
            error => Self::Kube(error),
        }
    }
}

/// Treats an `AlreadyExists` result as success.
pub fn ignore_already_exists<T>(res: Result<T, StoreError>) -> Result<Option<T>, StoreError> {
    match res {
        Ok(t) => Ok(Some(t)),
        Err(StoreError::AlreadyExists) => Ok(None),
        Err(error) => Err(error),
    }
}

/// Treats a `NotFound` result as success.
pub fn ignore_not_found(res: Result<(), StoreError>) -> Result<(), StoreError> {
    match res {
        Err(StoreError::NotFound) => Ok(()),
        res => res,
    }
}

// === impl KubeStore ===

impl KubeStore {
    pub fn new(client: k8s::Client) -> Self {
        Self { client }
    }

    fn policies(&self, ns: &str) -> Api<SelinuxPolicy> {
        Api::namespaced(self.client.clone(), ns)
    }

    fn config_maps(&self, ns: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), ns)
    }

    fn pods(&self, ns: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), ns)
    }
}

#[async_trait::async_trait]
impl Store for KubeStore {
    async fn get_policy(&self, id: &ResourceId) -> Result<Option<SelinuxPolicy>, StoreError> {
        Ok(self.policies(&id.namespace).get_opt(&id.name).await?)
    }

    async fn update_policy(&self, policy: &SelinuxPolicy) -> Result<SelinuxPolicy, StoreError> {
        let id = ResourceId::of(policy);
        let policy = self
            .policies(&id.namespace)
            .replace(&id.name, &PostParams::default(), policy)
            .await?;
        Ok(policy)
    }

    async fn update_policy_status(
        &self,
        policy: &SelinuxPolicy,
    ) -> Result<SelinuxPolicy, StoreError> {
        let id = ResourceId::of(policy);
        let patch = serde_json::json!({ "status": policy.status });
        let params = kube::api::PatchParams::default();
        let policy = self
            .policies(&id.namespace)
            .patch_status(&id.name, &params, &kube::api::Patch::Merge(patch))
            .await?;
        Ok(policy)
    }

    async fn get_config_map(&self, id: &ResourceId) -> Result<Option<ConfigMap>, StoreError> {
        Ok(self.config_maps(&id.namespace).get_opt(&id.name).await?)
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError> {
        let id = ResourceId::of(config_map);
        let cm = self
            .config_maps(&id.namespace)
            .create(&PostParams::default(), config_map)
            .await?;
        Ok(cm)
    }

    async fn delete_config_map(&self, id: &ResourceId) -> Result<(), StoreError> {
        // Installer pods carry an owner reference to the ConfigMap, so the
        // garbage collector removes them once the ConfigMap is gone.
        self.config_maps(&id.namespace)
            .delete(&id.name, &DeleteParams::background())
            .await?;
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError> {
        let nodes = Api::<Node>::all(self.client.clone())
            .list(&ListParams::default())
            .await?;
        Ok(nodes.items)
    }

    async fn get_pod(&self, id: &ResourceId) -> Result<Option<Pod>, StoreError> {
        Ok(self.pods(&id.namespace).get_opt(&id.name).await?)
    }

    async fn create_pod(&self, pod: &Pod) -> Result<Pod, StoreError> {
        let id = ResourceId::of(pod);
        let pod = self
            .pods(&id.namespace)
            .create(&PostParams::default(), pod)
            .await?;
        Ok(pod)
    }
}
