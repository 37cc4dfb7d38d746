use crate::ResourceId;
use selinux_policy_controller_core::{naming, InstallerOutcome};
use selinux_policy_controller_k8s_api::{
    api::core::v1::{
        ConfigMapVolumeSource, ExecAction, HostPathVolumeSource, Lifecycle, LifecycleHandler,
        Toleration, Volume, VolumeMount,
    },
    labels, ConfigMap, Container, ObjectMeta, Pod, PodSpec, Resource, SecurityContext,
};

/// The container that loads the module. Its exit code decides whether the
/// node installed the policy.
pub const INSTALLER_CONTAINER: &str = "policy-installer";

/// The container that stays alive so that its pre-stop hook can remove the
/// module when the pod is deleted.
pub const UNINSTALLER_CONTAINER: &str = "policy-uninstaller";

const POLICY_MOUNT_PATH: &str = "/tmp/policy";
const POLICY_VOLUME: &str = "policyvolume";

// SELinux configuration and runtime directories on the host.
const HOST_PATHS: [(&str, &str); 3] = [
    ("fsselinux", "/sys/fs/selinux"),
    ("etcselinux", "/etc/selinux"),
    ("varlibselinux", "/var/lib/selinux"),
];

const MASTER_TOLERATION_KEY: &str = "node-role.kubernetes.io/master";

/// Describes how installer pods are created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallerConfig {
    /// The namespace in which module stores and installer pods live.
    pub namespace: String,
    pub image: String,
    pub service_account: String,
}

// === impl InstallerConfig ===

impl InstallerConfig {
    /// Builds the installer pod for `policy` on `node`.
    ///
    /// Returns `None` if the module store has not been persisted yet, since the
    /// pod must be owned by it.
    pub fn pod(&self, policy: &ResourceId, node: &str, store: &ConfigMap) -> Option<Pod> {
        let owner = store.controller_owner_ref(&())?;
        let module = naming::module_name(&policy.name, &policy.namespace);
        let store_name = naming::store_name(&policy.name, &policy.namespace);

        let mut mounts = HOST_PATHS
            .iter()
            .map(|(name, path)| VolumeMount {
                name: name.to_string(),
                mount_path: path.to_string(),
                ..Default::default()
            })
            .collect::<Vec<_>>();
        mounts.push(VolumeMount {
            name: POLICY_VOLUME.to_string(),
            mount_path: POLICY_MOUNT_PATH.to_string(),
            ..Default::default()
        });

        let mut volumes = HOST_PATHS
            .iter()
            .map(|(name, path)| Volume {
                name: name.to_string(),
                host_path: Some(HostPathVolumeSource {
                    path: path.to_string(),
                    type_: Some("Directory".to_string()),
                }),
                ..Default::default()
            })
            .collect::<Vec<_>>();
        volumes.push(Volume {
            name: POLICY_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: store_name,
                ..Default::default()
            }),
            ..Default::default()
        });

        let installer = self.container(
            INSTALLER_CONTAINER,
            format!(
                "semodule -vi {POLICY_MOUNT_PATH}/*{} /usr/share/udica/templates/*cil;",
                naming::MODULE_FILE_EXTENSION
            ),
            &module,
            mounts.clone(),
        );
        let uninstaller = self.container(
            UNINSTALLER_CONTAINER,
            "while true; do sleep 30; done;".to_string(),
            &module,
            mounts,
        );

        Some(Pod {
            metadata: ObjectMeta {
                name: Some(naming::task_name(&policy.name, &policy.namespace, node)),
                namespace: Some(self.namespace.clone()),
                labels: Some(labels::for_policy(&policy.name, &policy.namespace)),
                owner_references: Some(vec![owner]),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![installer, uninstaller],
                service_account_name: Some(self.service_account.clone()),
                restart_policy: Some("Never".to_string()),
                node_name: Some(node.to_string()),
                volumes: Some(volumes),
                tolerations: Some(vec![Toleration {
                    key: Some(MASTER_TOLERATION_KEY.to_string()),
                    operator: Some("Exists".to_string()),
                    effect: Some("NoSchedule".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: None,
        })
    }

    fn container(
        &self,
        name: &str,
        script: String,
        module: &str,
        volume_mounts: Vec<VolumeMount>,
    ) -> Container {
        Container {
            name: name.to_string(),
            image: Some(self.image.clone()),
            command: Some(vec!["/bin/sh".to_string()]),
            args: Some(vec!["-c".to_string(), script]),
            lifecycle: Some(Lifecycle {
                pre_stop: Some(LifecycleHandler {
                    exec: Some(ExecAction {
                        command: Some(vec![
                            "/bin/sh".to_string(),
                            "-c".to_string(),
                            format!("semodule -vr '{module}'"),
                        ]),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            security_context: Some(SecurityContext {
                privileged: Some(true),
                ..Default::default()
            }),
            volume_mounts: Some(volume_mounts),
            ..Default::default()
        }
    }
}

/// Reads the installer container's outcome from a pod's status.
///
/// A pod that has not reported a terminated installer container, including a
/// pod that was just created, is still running.
pub fn outcome(pod: &Pod) -> InstallerOutcome {
    let exit_code = pod
        .status
        .iter()
        .flat_map(|status| status.container_statuses.iter().flatten())
        .find(|status| status.name == INSTALLER_CONTAINER)
        .and_then(|status| status.state.as_ref()?.terminated.as_ref())
        .map(|terminated| terminated.exit_code);
    InstallerOutcome::from_exit_code(exit_code)
}
