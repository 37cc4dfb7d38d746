use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Describes an SELinux policy module and whether it should be installed on
/// the cluster's nodes.
#[derive(Clone, Debug, Default, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "selinux.openshift.io",
    version = "v1alpha1",
    kind = "SelinuxPolicy",
    derive = "PartialEq",
    plural = "selinuxpolicies",
    status = "SelinuxPolicyStatus",
    namespaced,
    printcolumn = r#"{"name":"Usage","type":"string","jsonPath":".status.usage"}"#,
    printcolumn = r#"{"name":"Apply","type":"boolean","jsonPath":".spec.apply"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SelinuxPolicySpec {
    /// When false, the policy is only stored for review and is never
    /// distributed to nodes.
    #[serde(default)]
    pub apply: bool,

    /// The CIL body of the policy, without the enclosing block.
    #[serde(default)]
    pub policy: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelinuxPolicyStatus {
    /// The SELinux type a pod references in its `seLinuxOptions` to run
    /// under this policy.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub usage: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PolicyState>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum PolicyState {
    /// The policy is waiting to be applied.
    #[serde(rename = "PENDING")]
    Pending,
    /// Installers are running on the cluster's nodes.
    #[serde(rename = "IN-PROGRESS")]
    InProgress,
    #[serde(rename = "INSTALLED")]
    Installed,
    /// At least one node failed to install the policy.
    #[serde(rename = "ERROR")]
    Error,
}

// === impl SelinuxPolicy ===

impl SelinuxPolicy {
    pub fn state(&self) -> Option<PolicyState> {
        self.status.as_ref().and_then(|s| s.state)
    }

    pub fn usage(&self) -> Option<&str> {
        self.status
            .as_ref()
            .map(|s| s.usage.as_str())
            .filter(|u| !u.is_empty())
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .iter()
            .flatten()
            .any(|f| f == finalizer)
    }

    /// Returns a mutable handle to the status, creating an empty one if the
    /// resource has never had a status written.
    pub fn status_mut(&mut self) -> &mut SelinuxPolicyStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

// === impl PolicyState ===

impl PolicyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN-PROGRESS",
            Self::Installed => "INSTALLED",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for PolicyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
