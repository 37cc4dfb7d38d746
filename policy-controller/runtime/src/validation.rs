use crate::{
    core::naming,
    k8s::{PodSpec, SecurityContext},
    reconcile::{ResourceId, Store},
};
use anyhow::Result;
use std::collections::BTreeSet;

/// The outcome of validating a pod.
#[derive(Debug)]
pub enum Verdict {
    Allowed,
    Denied(String),
    Errored(u16, anyhow::Error),
}

/// Looks up whether a policy exists.
#[async_trait::async_trait]
pub trait PolicyLookup: Send + Sync + 'static {
    async fn policy_exists(&self, id: &ResourceId) -> Result<bool>;
}

/// How an SELinux type relates to the pod's namespace.
#[derive(Debug, PartialEq, Eq)]
enum Usage<'t> {
    /// Not generated for a policy.
    Unmanaged,
    /// Generated for the named policy in the pod's namespace.
    Policy(&'t str),
    /// Generated for a module that is not a policy in the pod's namespace.
    Foreign(&'t str),
}

// === impl PolicyLookup ===

#[async_trait::async_trait]
impl<S: Store> PolicyLookup for S {
    async fn policy_exists(&self, id: &ResourceId) -> Result<bool> {
        Ok(self.get_policy(id).await?.is_some())
    }
}

/// Checks that every policy a pod's SELinux types refer to exists in the
/// pod's namespace.
pub async fn validate_pod(lookup: &dyn PolicyLookup, ns: &str, spec: &PodSpec) -> Verdict {
    for selinux_type in selinux_types(spec) {
        let name = match classify(selinux_type, ns) {
            Usage::Unmanaged => continue,
            Usage::Foreign(module) => {
                return Verdict::Denied(format!(
                    "SELinux type {selinux_type} refers to module {module}, which does not name a policy in namespace {ns}"
                ));
            }
            Usage::Policy(name) => name,
        };

        let id = ResourceId::new(ns, name);
        match lookup.policy_exists(&id).await {
            Ok(true) => {}
            Ok(false) => {
                return Verdict::Denied(format!(
                    "SelinuxPolicy {name} not found in namespace {ns}"
                ));
            }
            Err(error) => {
                return Verdict::Errored(500, error.context(format!("failed to look up {id}")))
            }
        }
    }

    Verdict::Allowed
}

fn classify<'t>(selinux_type: &'t str, ns: &str) -> Usage<'t> {
    let Some(module) = naming::parse_usage(selinux_type) else {
        return Usage::Unmanaged;
    };
    match naming::parse_module_name(module, ns) {
        Some(name) => Usage::Policy(name),
        None => Usage::Foreign(module),
    }
}

/// Returns the distinct, non-empty SELinux types set on a pod and on each of
/// its containers.
fn selinux_types(spec: &PodSpec) -> BTreeSet<&str> {
    let pod = spec
        .security_context
        .as_ref()
        .and_then(|sc| sc.se_linux_options.as_ref())
        .and_then(|opts| opts.type_.as_deref());

    let containers = spec
        .containers
        .iter()
        .chain(spec.init_containers.iter().flatten())
        .filter_map(|c| container_type(c.security_context.as_ref()?));

    pod.into_iter()
        .chain(containers)
        .filter(|t| !t.is_empty())
        .collect()
}

fn container_type(sc: &SecurityContext) -> Option<&str> {
    sc.se_linux_options.as_ref()?.type_.as_deref()
}
