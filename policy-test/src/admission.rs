use crate::with_temp_ns;
use selinux_policy_controller_k8s_api as k8s;

/// Creates the policies returned by `policies`, then checks that the pod
/// returned by `pod` is admitted.
pub async fn accepts<P, F>(policies: P, pod: F)
where
    P: FnOnce(String) -> Vec<k8s::SelinuxPolicy> + Send + 'static,
    F: FnOnce(String) -> k8s::Pod + Send + 'static,
{
    with_temp_ns(|client, ns| async move {
        create_all(&client, &ns, policies(ns.clone())).await;
        let api = kube::Api::<k8s::Pod>::namespaced(client, &ns);
        let res = api.create(&kube::api::PostParams::default(), &pod(ns)).await;
        res.expect("pod must be admitted");
    })
    .await;
}

/// Creates the policies returned by `policies`, then checks that the pod
/// returned by `pod` is denied.
pub async fn rejects<P, F>(policies: P, pod: F)
where
    P: FnOnce(String) -> Vec<k8s::SelinuxPolicy> + Send + 'static,
    F: FnOnce(String) -> k8s::Pod + Send + 'static,
{
    with_temp_ns(|client, ns| async move {
        create_all(&client, &ns, policies(ns.clone())).await;
        let api = kube::Api::<k8s::Pod>::namespaced(client, &ns);
        let res = api.create(&kube::api::PostParams::default(), &pod(ns)).await;
        res.expect_err("pod must not be admitted");
    })
    .await;
}

async fn create_all(client: &kube::Client, ns: &str, policies: Vec<k8s::SelinuxPolicy>) {
    let api = kube::Api::<k8s::SelinuxPolicy>::namespaced(client.clone(), ns);
    for policy in policies {
        api.create(&kube::api::PostParams::default(), &policy)
            .await
            .expect("failed to create SelinuxPolicy");
    }
}

/// Builds a pod that runs under `selinux_type`.
pub fn pod(ns: &str, selinux_type: &str) -> k8s::Pod {
    k8s::Pod {
        metadata: k8s::ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some("app".to_string()),
            ..Default::default()
        },
        spec: Some(k8s::PodSpec {
            containers: vec![k8s::Container {
                name: "app".to_string(),
                image: Some("registry.access.redhat.com/ubi8/ubi-minimal".to_string()),
                command: Some(vec!["sleep".to_string(), "3600".to_string()]),
                ..Default::default()
            }],
            security_context: Some(k8s::PodSecurityContext {
                se_linux_options: Some(k8s::SELinuxOptions {
                    type_: Some(selinux_type.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: None,
    }
}

/// Builds a policy that is stored but never installed.
pub fn policy(ns: &str, name: &str) -> k8s::SelinuxPolicy {
    k8s::SelinuxPolicy {
        metadata: k8s::ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: k8s::SelinuxPolicySpec {
            apply: false,
            policy: "(blockinherit container)".to_string(),
        },
        status: None,
    }
}
