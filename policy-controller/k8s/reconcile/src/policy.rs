use crate::{
    store::{ignore_already_exists, ignore_not_found},
    write_state, Action, Error, ResourceId, Store,
};
use selinux_policy_controller_core::{naming, ModuleWrapper, FINALIZER};
use selinux_policy_controller_k8s_api::{
    labels, ConfigMap, ObjectMeta, PolicyState, SelinuxPolicy,
};
use tracing::{debug, info, instrument};

/// Drives a policy from creation to deletion.
///
/// The reconciler owns the policy's finalizer, its `usage` status and its
/// module store. It writes only the `PENDING` state; the installation states
/// are written by [`crate::NodeFanout`].
pub struct PolicyReconciler<S> {
    store: S,
    wrapper: ModuleWrapper,
    namespace: String,
}

// === impl PolicyReconciler ===

impl<S: Store> PolicyReconciler<S> {
    /// Creates a reconciler that stores modules in `namespace`.
    pub fn new(store: S, wrapper: ModuleWrapper, namespace: impl Into<String>) -> Self {
        Self {
            store,
            wrapper,
            namespace: namespace.into(),
        }
    }

    #[instrument(skip_all, fields(policy = %id))]
    pub async fn reconcile(&self, id: &ResourceId) -> Result<Action, Error> {
        let Some(mut policy) = self.store.get_policy(id).await? else {
            debug!("SelinuxPolicy not found");
            return Ok(Action::await_change());
        };

        if policy.state().is_none() {
            policy = write_state(&self.store, &policy, PolicyState::Pending).await?;
        }

        if policy.is_deleting() {
            if policy.has_finalizer(FINALIZER) {
                self.delete_module_store(id).await?;
                self.remove_finalizer(&policy).await?;
            }
            return Ok(Action::await_change());
        }

        // Policies that are not applied are left for review.
        if !policy.spec.apply {
            if policy.state() != Some(PolicyState::Pending) {
                write_state(&self.store, &policy, PolicyState::Pending).await?;
            }
            return Ok(Action::await_change());
        }

        let usage = naming::usage(&id.name, &id.namespace);
        if policy.usage() != Some(usage.as_str()) {
            let mut copy = policy.clone();
            copy.status_mut().usage = usage;
            policy = self.store.update_policy_status(&copy).await?;
        }

        // The finalizer must be persisted before the module store exists so
        // that deletion always cleans it up.
        if !policy.has_finalizer(FINALIZER) {
            policy = self.add_finalizer(&policy).await?;
        }

        self.ensure_module_store(id, &policy).await?;
        Ok(Action::await_change())
    }

    /// Builds the module store for a policy.
    pub fn module_store(&self, id: &ResourceId, policy: &SelinuxPolicy) -> ConfigMap {
        let module = self
            .wrapper
            .wrap(&policy.spec.policy, &id.name, &id.namespace);
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(naming::store_name(&id.name, &id.namespace)),
                namespace: Some(self.namespace.clone()),
                labels: Some(labels::for_policy(&id.name, &id.namespace)),
                ..Default::default()
            },
            data: Some(
                [(naming::module_file_name(&id.name, &id.namespace), module)]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        }
    }

    fn store_id(&self, id: &ResourceId) -> ResourceId {
        ResourceId::new(
            self.namespace.clone(),
            naming::store_name(&id.name, &id.namespace),
        )
    }

    async fn ensure_module_store(
        &self,
        id: &ResourceId,
        policy: &SelinuxPolicy,
    ) -> Result<(), Error> {
        let store_id = self.store_id(id);
        if self.store.get_config_map(&store_id).await?.is_some() {
            debug!(store = %store_id, "Module store exists");
            return Ok(());
        }

        info!(store = %store_id, "Creating module store");
        let cm = self.module_store(id, policy);
        if ignore_already_exists(self.store.create_config_map(&cm).await)?.is_none() {
            debug!(store = %store_id, "Module store was created concurrently");
        }
        Ok(())
    }

    async fn delete_module_store(&self, id: &ResourceId) -> Result<(), Error> {
        let store_id = self.store_id(id);
        info!(store = %store_id, "Deleting module store");
        ignore_not_found(self.store.delete_config_map(&store_id).await)?;
        Ok(())
    }

    async fn add_finalizer(&self, policy: &SelinuxPolicy) -> Result<SelinuxPolicy, Error> {
        debug!("Adding finalizer");
        let mut copy = policy.clone();
        copy.metadata
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(FINALIZER.to_string());
        Ok(self.store.update_policy(&copy).await?)
    }

    async fn remove_finalizer(&self, policy: &SelinuxPolicy) -> Result<(), Error> {
        debug!("Removing finalizer");
        let mut copy = policy.clone();
        if let Some(finalizers) = copy.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != FINALIZER);
        }
        ignore_not_found(self.store.update_policy(&copy).await.map(|_| ()))?;
        Ok(())
    }
}
