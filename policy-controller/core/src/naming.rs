//! Deterministic names derived from a policy's identity.
//!
//! Every name here is a pure function of the policy name, its namespace and,
//! for installer pods, the node name. The same inputs always produce the same
//! outputs so that reconciles can look up objects they created earlier.

use sha1::{Digest, Sha1};

/// The suffix appended to a module name to form the SELinux type a pod uses.
pub const USAGE_SUFFIX: &str = ".process";

/// The file extension expected by the installer when loading modules.
pub const MODULE_FILE_EXTENSION: &str = ".cil";

/// The longest name the cluster accepts for an installer pod.
pub const MAX_TASK_NAME_LEN: usize = 62;

const STORE_NAME_PREFIX: &str = "policy-for";

/// Returns the name under which a policy's module is installed on a node.
///
/// Kubernetes names may not contain underscores, so `_` can never collide
/// with the `-` that separates words within a name or namespace.
pub fn module_name(name: &str, namespace: &str) -> String {
    format!("{name}_{namespace}")
}

/// Returns the SELinux type a pod must reference to run under the policy.
pub fn usage(name: &str, namespace: &str) -> String {
    format!("{}{USAGE_SUFFIX}", module_name(name, namespace))
}

/// Returns the key of the module entry in the module store.
pub fn module_file_name(name: &str, namespace: &str) -> String {
    format!("{}{MODULE_FILE_EXTENSION}", module_name(name, namespace))
}

/// Returns the name of the ConfigMap that stores the wrapped module.
pub fn store_name(name: &str, namespace: &str) -> String {
    format!("{STORE_NAME_PREFIX}-{name}-{namespace}")
}

/// Returns the name of the installer pod for a policy on a node.
///
/// The name is the hex-encoded SHA-1 digest of the policy identity and the
/// node name, so its length is fixed regardless of how long the inputs are.
pub fn task_name(name: &str, namespace: &str, node: &str) -> String {
    let node = node.replace('.', "");
    let digest = Sha1::digest(format!("{name}-{namespace}-{node}").as_bytes());
    hex::encode(digest)
}

/// Recovers the module name referenced by an SELinux type, if the type was
/// generated for a policy.
///
/// Types that do not end in [`USAGE_SUFFIX`], or that consist of the suffix
/// alone, are not generated types and yield `None`.
pub fn parse_usage(selinux_type: &str) -> Option<&str> {
    selinux_type
        .strip_suffix(USAGE_SUFFIX)
        .filter(|module| !module.is_empty())
}

/// Recovers the policy name from a module name, given the namespace the
/// module is expected to belong to.
///
/// Returns `None` when the module does not name a policy in `namespace`.
pub fn parse_module_name<'m>(module: &'m str, namespace: &str) -> Option<&'m str> {
    module
        .strip_suffix(namespace)
        .and_then(|prefix| prefix.strip_suffix('_'))
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_extends_module_name() {
        for (name, ns) in [("foo", "bar"), ("a", "b"), ("my-policy", "my-namespace")] {
            assert_eq!(
                usage(name, ns),
                format!("{}.process", module_name(name, ns))
            );
        }
        assert_eq!(usage("foo", "bar"), "foo_bar.process");
    }

    #[test]
    fn store_and_module_names() {
        assert_eq!(store_name("foo", "bar"), "policy-for-foo-bar");
        assert_eq!(module_file_name("foo", "bar"), "foo_bar.cil");
    }

    #[test]
    fn task_name_is_sha1_hex() {
        let expected = hex::encode(Sha1::digest(b"foo-bar-node1"));
        assert_eq!(task_name("foo", "bar", "node1"), expected);
        // Dots are stripped from node names before hashing.
        assert_eq!(task_name("foo", "bar", "node.1"), expected);
        assert_eq!(expected.len(), 40);
    }

    #[test]
    fn task_name_is_bounded() {
        let long_node = format!("{}.example.com", "n".repeat(240));
        let long_name = "p".repeat(253);
        for (name, ns, node) in [
            ("foo", "bar", "node-0"),
            (long_name.as_str(), "ns", long_node.as_str()),
            ("a", "b", "c."),
        ] {
            let task = task_name(name, ns, node);
            assert!(task.len() <= MAX_TASK_NAME_LEN, "{task} is too long");
            assert_eq!(task, task_name(name, ns, node));
            assert!(task
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
            assert!(!task.ends_with('-') && !task.ends_with('.'));
        }
    }

    #[test]
    fn task_name_distinguishes_policies_on_a_node() {
        assert_ne!(task_name("foo", "bar", "n"), task_name("foo", "baz", "n"));
        assert_ne!(task_name("foo", "bar", "n"), task_name("qux", "bar", "n"));
        assert_ne!(task_name("foo", "bar", "n0"), task_name("foo", "bar", "n1"));
    }

    #[test]
    fn parses_generated_types() {
        assert_eq!(parse_usage("foo_bar.process"), Some("foo_bar"));
        assert_eq!(parse_usage(".process"), None);
        assert_eq!(parse_usage("unrelated"), None);
        assert_eq!(parse_usage(""), None);
        assert_eq!(parse_usage("container_t"), None);
    }

    #[test]
    fn parses_module_names() {
        assert_eq!(parse_module_name("foo_bar", "bar"), Some("foo"));
        assert_eq!(
            parse_module_name("my-policy_my-ns", "my-ns"),
            Some("my-policy")
        );
        assert_eq!(parse_module_name("foo_bar", "baz"), None);
        assert_eq!(parse_module_name("_bar", "bar"), None);
        assert_eq!(parse_module_name("foobar", "bar"), None);
    }
}
