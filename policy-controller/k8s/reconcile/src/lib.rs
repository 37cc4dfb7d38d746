#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Reconcilers that converge `SelinuxPolicy` resources onto the cluster.
//!
//! The [`PolicyReconciler`] owns a policy's finalizer and its module store (a
//! ConfigMap holding the wrapped module). The [`NodeFanout`] reconciler is
//! driven by module stores: it creates one installer pod per node and
//! collapses the installers' exit codes into the policy's state.

mod fanout;
pub mod installer;
mod metrics;
mod policy;
mod resource_id;
pub mod store;

#[cfg(test)]
mod tests;

pub use self::{
    fanout::{module_store_id, NodeFanout},
    installer::InstallerConfig,
    metrics::ReconcileMetrics,
    policy::PolicyReconciler,
    resource_id::ResourceId,
    store::{KubeStore, Store, StoreError},
};
pub use kube::runtime::controller::Action;

use selinux_policy_controller_k8s_api::{PolicyState, SelinuxPolicy};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("module store {0} has no uid")]
    UnpersistedStore(ResourceId),
}

/// Writes `state` to a copy of `policy`, returning the stored result.
///
/// The caller's value is never modified, so a failed write leaves it intact.
async fn write_state<S: Store>(
    store: &S,
    policy: &SelinuxPolicy,
    state: PolicyState,
) -> Result<SelinuxPolicy, StoreError> {
    let mut copy = policy.clone();
    copy.status_mut().state = Some(state);
    store.update_policy_status(&copy).await
}
