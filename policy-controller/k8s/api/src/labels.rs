//! Labels that tie module stores and installer pods back to their policy.

use std::collections::BTreeMap;

pub type Map = BTreeMap<String, String>;

/// The name of the policy an object was created for.
pub const POLICY_NAME: &str = "appName";

/// The namespace of the policy an object was created for.
pub const POLICY_NAMESPACE: &str = "appNamespace";

/// Builds the labels identifying objects owned by a policy.
pub fn for_policy(name: &str, namespace: &str) -> Map {
    [
        (POLICY_NAME.to_string(), name.to_string()),
        (POLICY_NAMESPACE.to_string(), namespace.to_string()),
    ]
    .into_iter()
    .collect()
}

/// Returns the `(name, namespace)` of the policy that an object's labels
/// refer to, if both labels are present.
pub fn policy_ref(labels: &Map) -> Option<(&str, &str)> {
    let name = labels.get(POLICY_NAME)?;
    let namespace = labels.get(POLICY_NAMESPACE)?;
    Some((name.as_str(), namespace.as_str()))
}
