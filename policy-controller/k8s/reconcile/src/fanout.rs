use crate::{
    installer, store::ignore_already_exists, write_state, Action, Error, InstallerConfig,
    ResourceId, Store,
};
use selinux_policy_controller_core::{aggregate, naming, Convergence, InstallerOutcome};
use selinux_policy_controller_k8s_api::{labels, PolicyState, ResourceExt, SelinuxPolicy};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Distributes a policy's module to every node and aggregates the results.
///
/// Reconciles are keyed by module store. Each node gets one installer pod,
/// named deterministically, that is created once and then only observed.
/// While any installer is still running the reconcile asks to be requeued
/// after the poll interval.
pub struct NodeFanout<S> {
    store: S,
    installer: InstallerConfig,
    poll_interval: Duration,
}

/// Returns the id of the module store that `policy` is installed from, so
/// that changes to the policy can be routed to the store's reconcile.
///
/// Flipping `apply` back on leaves an existing store untouched, so the store
/// alone never hears about it.
pub fn module_store_id(namespace: &str, policy: &SelinuxPolicy) -> Option<ResourceId> {
    let name = policy.metadata.name.as_deref()?;
    let ns = policy.metadata.namespace.as_deref()?;
    Some(ResourceId::new(namespace, naming::store_name(name, ns)))
}

// === impl NodeFanout ===

impl<S: Store> NodeFanout<S> {
    pub fn new(store: S, installer: InstallerConfig, poll_interval: Duration) -> Self {
        Self {
            store,
            installer,
            poll_interval,
        }
    }

    #[instrument(skip_all, fields(store = %id))]
    pub async fn reconcile(&self, id: &ResourceId) -> Result<Action, Error> {
        if id.namespace != self.installer.namespace {
            return Ok(Action::await_change());
        }

        let Some(module_store) = self.store.get_config_map(id).await? else {
            debug!("Module store not found");
            return Ok(Action::await_change());
        };
        let policy_ref = module_store
            .metadata
            .labels
            .as_ref()
            .and_then(labels::policy_ref);
        let Some((name, namespace)) = policy_ref else {
            debug!("ConfigMap is not a module store");
            return Ok(Action::await_change());
        };
        let policy_id = ResourceId::new(namespace, name);

        let Some(mut policy) = self.store.get_policy(&policy_id).await? else {
            debug!(policy = %policy_id, "SelinuxPolicy not found");
            return Ok(Action::await_change());
        };
        if !policy.spec.apply || policy.is_deleting() {
            debug!(policy = %policy_id, "SelinuxPolicy is not being installed");
            return Ok(Action::await_change());
        }

        if matches!(policy.state(), None | Some(PolicyState::Pending)) {
            policy = write_state(&self.store, &policy, PolicyState::InProgress).await?;
        }

        info!(policy = %policy_id, "Reconciling installers");
        let nodes = self.store.list_nodes().await?;
        let mut outcomes = Vec::with_capacity(nodes.len());
        for node in nodes.iter().map(|n| n.name_any()) {
            let pod = self
                .installer
                .pod(&policy_id, &node, &module_store)
                .ok_or_else(|| Error::UnpersistedStore(id.clone()))?;
            let pod_id = ResourceId::of(&pod);

            let observed = match self.store.get_pod(&pod_id).await? {
                Some(pod) => pod,
                None => {
                    info!(%node, pod = %pod_id, "Creating installer pod");
                    // A pod that was created concurrently has not reported
                    // anything yet, just like the one we'd have created.
                    ignore_already_exists(self.store.create_pod(&pod).await)?.unwrap_or(pod)
                }
            };

            let outcome = installer::outcome(&observed);
            match outcome {
                InstallerOutcome::Running => debug!(%node, pod = %pod_id, "Installer running"),
                InstallerOutcome::Succeeded => debug!(%node, pod = %pod_id, "Installer succeeded"),
                InstallerOutcome::Failed { exit_code } => {
                    warn!(%node, pod = %pod_id, exit_code, "Installer failed")
                }
            }
            outcomes.push(outcome);
        }

        match aggregate(outcomes) {
            Convergence::InProgress => {
                self.set_state(&policy, PolicyState::InProgress).await?;
                Ok(Action::requeue(self.poll_interval))
            }
            Convergence::Failed => {
                self.set_state(&policy, PolicyState::Error).await?;
                Ok(Action::await_change())
            }
            Convergence::Installed => {
                self.set_state(&policy, PolicyState::Installed).await?;
                Ok(Action::await_change())
            }
        }
    }

    async fn set_state(&self, policy: &SelinuxPolicy, state: PolicyState) -> Result<(), Error> {
        if policy.state() == Some(state) {
            return Ok(());
        }
        info!(%state, "Updating policy state");
        write_state(&self.store, policy, state).await?;
        Ok(())
    }
}
