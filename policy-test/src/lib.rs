#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod admission;

use maplit::{btreemap, convert_args};
use selinux_policy_controller_k8s_api as k8s;
use tokio::time;
use tracing::Instrument;

/// The namespace the controller under test was installed into.
pub const CONTROLLER_NAMESPACE: &str = "selinux-operator";

/// Runs a test with a random namespace that is deleted on test completion
pub async fn with_temp_ns<F, Fut>(test: F)
where
    F: FnOnce(kube::Client, String) -> Fut,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let _tracing = init_tracing();

    let namespace = format!("selinux-policy-test-{}", random_suffix(6));

    tracing::debug!("initializing client");
    let client = kube::Client::try_default()
        .await
        .expect("failed to initialize k8s client");
    let api = kube::Api::<k8s::Namespace>::all(client.clone());

    tracing::debug!(%namespace, "creating");
    let ns = k8s::Namespace {
        metadata: k8s::ObjectMeta {
            name: Some(namespace.clone()),
            labels: Some(convert_args!(btreemap!(
                "selinux-policy-test" => std::thread::current().name().unwrap_or(""),
            ))),
            ..Default::default()
        },
        ..Default::default()
    };
    api.create(
        &kube::api::PostParams {
            dry_run: false,
            field_manager: Some("selinux-policy-test".to_string()),
        },
        &ns,
    )
    .await
    .expect("failed to create Namespace");

    tracing::trace!("spawning");
    let test = test(client.clone(), namespace.clone());
    let res = tokio::spawn(test.instrument(tracing::info_span!("test", %namespace))).await;
    if res.is_err() {
        // If the test failed, stop tracing so the log is not polluted with more information about
        // cleanup after the failure was printed.
        drop(_tracing);
    }

    tracing::debug!(%namespace, "deleting");
    api.delete(&namespace, &kube::api::DeleteParams::background())
        .await
        .expect("failed to delete Namespace");
    if let Err(err) = res {
        std::panic::resume_unwind(err.into_panic());
    }
}

/// Creates a policy in `ns`.
pub async fn create_policy(
    client: &kube::Client,
    ns: &str,
    name: &str,
    apply: bool,
    policy: &str,
) -> k8s::SelinuxPolicy {
    let policy = k8s::SelinuxPolicy {
        metadata: k8s::ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: k8s::SelinuxPolicySpec {
            apply,
            policy: policy.to_string(),
        },
        status: None,
    };
    kube::Api::namespaced(client.clone(), ns)
        .create(&kube::api::PostParams::default(), &policy)
        .await
        .expect("failed to create SelinuxPolicy")
}

/// Waits for a namespaced resource to satisfy `cond`, failing the test after
/// `timeout`.
pub async fn await_condition<T>(
    client: &kube::Client,
    ns: &str,
    name: &str,
    timeout: time::Duration,
    cond: impl kube::runtime::wait::Condition<T>,
) -> Option<T>
where
    T: kube::Resource<Scope = kube::core::NamespaceResourceScope>,
    T: serde::Serialize + serde::de::DeserializeOwned + Clone + std::fmt::Debug + Send + 'static,
    T::DynamicType: Default,
{
    let api = kube::Api::namespaced(client.clone(), ns);
    match time::timeout(timeout, kube::runtime::wait::await_condition(api, name, cond)).await {
        Ok(res) => res.expect("API call failed"),
        Err(_) => panic!("timed out waiting for {ns}/{name}"),
    }
}

/// Returns a condition that holds once a policy reaches `state`.
pub fn policy_state(
    state: k8s::PolicyState,
) -> impl Fn(Option<&k8s::SelinuxPolicy>) -> bool {
    move |policy| policy.and_then(|p| p.state()) == Some(state)
}

pub fn random_suffix(len: usize) -> String {
    use rand::Rng;

    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let rng = &mut rand::thread_rng();
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

fn init_tracing() -> tracing::subscriber::DefaultGuard {
    tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "selinux=trace,debug".parse().unwrap()),
            )
            .finish(),
    )
}
