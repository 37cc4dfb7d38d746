use crate::{InstallerConfig, ResourceId, Store, StoreError};
use parking_lot::Mutex;
use selinux_policy_controller_k8s_api::{
    api::core::v1::{ContainerState, ContainerStateTerminated},
    ConfigMap, ContainerStatus, Node, ObjectMeta, Pod, PodStatus, ResourceExt, SelinuxPolicy,
    SelinuxPolicySpec, Time,
};
use std::{collections::BTreeMap, sync::Arc};


pub const OPERATOR_NS: &str = "selinux-operator";

pub fn installer_config() -> InstallerConfig {
    InstallerConfig {
        namespace: OPERATOR_NS.to_string(),
        image: "quay.io/jaosorior/udica".to_string(),
        service_account: "selinux-operator".to_string(),
    }
}

pub fn mk_policy(ns: &str, name: &str, apply: bool, policy: &str) -> SelinuxPolicy {
    SelinuxPolicy {
        metadata: ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: SelinuxPolicySpec {
            apply,
            policy: policy.to_string(),
        },
        status: None,
    }
}

/// Identifies a write made against a [`FakeStore`], in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Write {
    UpdatePolicy(ResourceId),
    UpdatePolicyStatus(ResourceId),
    CreateConfigMap(ResourceId),
    DeleteConfigMap(ResourceId),
    CreatePod(ResourceId),
}

/// An in-memory [`Store`] that behaves like the API server for the subset of
/// operations the reconcilers use.
#[derive(Clone, Default)]
pub struct FakeStore(Arc<Mutex<State>>);

impl Write {
    pub fn id(&self) -> &ResourceId {
        match self {
            Self::UpdatePolicy(id)
            | Self::UpdatePolicyStatus(id)
            | Self::CreateConfigMap(id)
            | Self::DeleteConfigMap(id)
            | Self::CreatePod(id) => id,
        }
    }
}

#[derive(Default)]
struct State {
    policies: BTreeMap<ResourceId, SelinuxPolicy>,
    config_maps: BTreeMap<ResourceId, ConfigMap>,
    pods: BTreeMap<ResourceId, Pod>,
    nodes: Vec<Node>,
    writes: Vec<Write>,
    next_uid: usize,

    // When set, creates behave as though another writer won the race.
    create_races: bool,
    fail_status_writes: bool,
}

// === impl FakeStore ===

impl FakeStore {
    pub fn with_nodes(names: &[&str]) -> Self {
        let store = Self::default();
        store.0.lock().nodes = names
            .iter()
            .map(|name| Node {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    ..Default::default()
                },
                ..Default::default()
            })
            .collect();
        store
    }

    /// Creates a policy as a user would.
    pub fn apply_policy(&self, mut policy: SelinuxPolicy) -> ResourceId {
        let id = ResourceId::of(&policy);
        let mut state = self.0.lock();
        policy.metadata.uid = Some(state.uid());
        state.policies.insert(id.clone(), policy);
        id
    }

    /// Edits a policy's spec as a user would.
    pub fn edit_policy(&self, id: &ResourceId, spec: SelinuxPolicySpec) {
        let mut state = self.0.lock();
        let policy = state.policies.get_mut(id).expect("policy must exist");
        policy.spec = spec;
    }

    /// Deletes a policy as a user would. The object remains until its
    /// finalizers are removed.
    pub fn delete_policy(&self, id: &ResourceId) {
        let mut state = self.0.lock();
        let Some(policy) = state.policies.get_mut(id) else {
            return;
        };
        if policy.metadata.finalizers.iter().flatten().next().is_none() {
            state.policies.remove(id);
            return;
        }
        policy
            .metadata
            .deletion_timestamp
            .get_or_insert_with(|| Time(chrono::Utc::now()));
    }

    pub fn policy(&self, id: &ResourceId) -> Option<SelinuxPolicy> {
        self.0.lock().policies.get(id).cloned()
    }

    pub fn config_maps(&self) -> Vec<ConfigMap> {
        self.0.lock().config_maps.values().cloned().collect()
    }

    pub fn insert_config_map(&self, mut cm: ConfigMap) -> ResourceId {
        let id = ResourceId::of(&cm);
        let mut state = self.0.lock();
        cm.metadata.uid = Some(state.uid());
        state.config_maps.insert(id.clone(), cm);
        id
    }

    pub fn pods(&self) -> Vec<Pod> {
        self.0.lock().pods.values().cloned().collect()
    }

    /// Records that the installer container of the pod scheduled on `node`
    /// for `policy` exited.
    pub fn terminate_installer(&self, policy: &ResourceId, node: &str, exit_code: i32) {
        let name = selinux_policy_controller_core::naming::task_name(
            &policy.name,
            &policy.namespace,
            node,
        );
        let mut state = self.0.lock();
        let pod = state
            .pods
            .get_mut(&ResourceId::new(OPERATOR_NS, name))
            .expect("installer pod must exist");
        pod.status = Some(PodStatus {
            container_statuses: Some(vec![ContainerStatus {
                name: crate::installer::INSTALLER_CONTAINER.to_string(),
                state: Some(ContainerState {
                    terminated: Some(ContainerStateTerminated {
                        exit_code,
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        });
    }

    pub fn writes(&self) -> Vec<Write> {
        self.0.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.0.lock().writes.clear();
    }

    pub fn set_create_races(&self, races: bool) {
        self.0.lock().create_races = races;
    }

    pub fn set_fail_status_writes(&self, fail: bool) {
        self.0.lock().fail_status_writes = fail;
    }
}

impl State {
    fn uid(&mut self) -> String {
        self.next_uid += 1;
        format!("uid-{}", self.next_uid)
    }
}

fn server_error() -> StoreError {
    StoreError::Kube(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: "etcdserver: request timed out".to_string(),
        reason: "InternalError".to_string(),
        code: 500,
    }))
}

#[async_trait::async_trait]
impl Store for FakeStore {
    async fn get_policy(&self, id: &ResourceId) -> Result<Option<SelinuxPolicy>, StoreError> {
        Ok(self.0.lock().policies.get(id).cloned())
    }

    async fn update_policy(&self, policy: &SelinuxPolicy) -> Result<SelinuxPolicy, StoreError> {
        let id = ResourceId::of(policy);
        let mut state = self.0.lock();
        state.writes.push(Write::UpdatePolicy(id.clone()));
        let stored = state.policies.get_mut(&id).ok_or(StoreError::NotFound)?;
        stored.metadata = policy.metadata.clone();
        stored.spec = policy.spec.clone();
        let updated = stored.clone();
        if updated.metadata.deletion_timestamp.is_some()
            && updated.finalizers().is_empty()
        {
            state.policies.remove(&id);
        }
        Ok(updated)
    }

    async fn update_policy_status(
        &self,
        policy: &SelinuxPolicy,
    ) -> Result<SelinuxPolicy, StoreError> {
        let id = ResourceId::of(policy);
        let mut state = self.0.lock();
        if state.fail_status_writes {
            return Err(server_error());
        }
        state.writes.push(Write::UpdatePolicyStatus(id.clone()));
        let stored = state.policies.get_mut(&id).ok_or(StoreError::NotFound)?;
        stored.status = policy.status.clone();
        Ok(stored.clone())
    }

    async fn get_config_map(&self, id: &ResourceId) -> Result<Option<ConfigMap>, StoreError> {
        Ok(self.0.lock().config_maps.get(id).cloned())
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap, StoreError> {
        let id = ResourceId::of(config_map);
        let mut state = self.0.lock();
        state.writes.push(Write::CreateConfigMap(id.clone()));
        if state.config_maps.contains_key(&id) {
            return Err(StoreError::AlreadyExists);
        }
        let mut cm = config_map.clone();
        cm.metadata.uid = Some(state.uid());
        state.config_maps.insert(id, cm.clone());
        if state.create_races {
            return Err(StoreError::AlreadyExists);
        }
        Ok(cm)
    }

    async fn delete_config_map(&self, id: &ResourceId) -> Result<(), StoreError> {
        let mut state = self.0.lock();
        state.writes.push(Write::DeleteConfigMap(id.clone()));
        let cm = state.config_maps.remove(id).ok_or(StoreError::NotFound)?;
        let uid = cm.uid();
        state.pods.retain(|_, pod| {
            !pod.owner_references()
                .iter()
                .any(|owner| Some(&owner.uid) == uid.as_ref())
        });
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError> {
        Ok(self.0.lock().nodes.clone())
    }

    async fn get_pod(&self, id: &ResourceId) -> Result<Option<Pod>, StoreError> {
        Ok(self.0.lock().pods.get(id).cloned())
    }

    async fn create_pod(&self, pod: &Pod) -> Result<Pod, StoreError> {
        let id = ResourceId::of(pod);
        let mut state = self.0.lock();
        state.writes.push(Write::CreatePod(id.clone()));
        if state.pods.contains_key(&id) {
            return Err(StoreError::AlreadyExists);
        }
        let mut pod = pod.clone();
        pod.metadata.uid = Some(state.uid());
        state.pods.insert(id, pod.clone());
        if state.create_races {
            return Err(StoreError::AlreadyExists);
        }
        Ok(pod)
    }
}
