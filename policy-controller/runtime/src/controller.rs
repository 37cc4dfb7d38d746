use crate::{
    k8s::{labels, Api, Client, ConfigMap, Pod, SelinuxPolicy},
    reconcile::{
        self, Action, Error, KubeStore, NodeFanout, PolicyReconciler, ReconcileMetrics,
        ResourceId,
    },
};
use futures::prelude::*;
use kube::runtime::{reflector::ObjectRef, watcher, Controller};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

struct Context<R> {
    reconciler: R,
    metrics: ReconcileMetrics,
    error_requeue: Duration,
}

/// Reconciles every `SelinuxPolicy` in the cluster.
pub(crate) async fn policies(
    client: Client,
    reconciler: PolicyReconciler<KubeStore>,
    metrics: ReconcileMetrics,
    error_requeue: Duration,
    drain: drain::Watch,
) {
    let ctx = Arc::new(Context {
        reconciler,
        metrics,
        error_requeue,
    });
    let (close_tx, close_rx) = tokio::sync::oneshot::channel();
    let controller = Controller::new(
        Api::<SelinuxPolicy>::all(client),
        watcher::Config::default(),
    )
    .graceful_shutdown_on(close_rx.map(|_| {}))
    .run(reconcile_policy, error_policy, ctx)
    .for_each(|res| async move {
        match res {
            Ok((obj, _)) => debug!(%obj, "Reconciled"),
            Err(error) => debug!(%error, "Controller error"),
        }
    });

    run_until_drained(controller, close_tx, drain).await
}

/// Reconciles the module stores in `namespace`, along with the installer pods
/// they own. Policy changes are routed to their module store.
pub(crate) async fn module_stores(
    client: Client,
    namespace: String,
    fanout: NodeFanout<KubeStore>,
    metrics: ReconcileMetrics,
    error_requeue: Duration,
    drain: drain::Watch,
) {
    let ctx = Arc::new(Context {
        reconciler: fanout,
        metrics,
        error_requeue,
    });
    let stores = watcher::Config::default().labels(labels::POLICY_NAME);
    let installers = watcher::Config::default().labels(labels::POLICY_NAME);
    let (close_tx, close_rx) = tokio::sync::oneshot::channel();
    let controller = Controller::new(
        Api::<ConfigMap>::namespaced(client.clone(), &namespace),
        stores,
    )
    .owns(Api::<Pod>::namespaced(client.clone(), &namespace), installers)
    .watches(
        Api::<SelinuxPolicy>::all(client),
        watcher::Config::default(),
        move |policy| {
            reconcile::module_store_id(&namespace, &policy)
                .map(|id| ObjectRef::<ConfigMap>::new(&id.name).within(&id.namespace))
        },
    )
    .graceful_shutdown_on(close_rx.map(|_| {}))
    .run(reconcile_module_store, error_policy, ctx)
    .for_each(|res| async move {
        match res {
            Ok((obj, _)) => debug!(%obj, "Reconciled"),
            Err(error) => debug!(%error, "Controller error"),
        }
    });

    run_until_drained(controller, close_tx, drain).await
}

async fn reconcile_policy(
    policy: Arc<SelinuxPolicy>,
    ctx: Arc<Context<PolicyReconciler<KubeStore>>>,
) -> Result<Action, Error> {
    let res = ctx.reconciler.reconcile(&ResourceId::of(&*policy)).await;
    ctx.metrics.record("policy", &res);
    res
}

async fn reconcile_module_store(
    store: Arc<ConfigMap>,
    ctx: Arc<Context<NodeFanout<KubeStore>>>,
) -> Result<Action, Error> {
    let res = ctx.reconciler.reconcile(&ResourceId::of(&*store)).await;
    ctx.metrics.record("fanout", &res);
    res
}

fn error_policy<K, R>(_: Arc<K>, error: &Error, ctx: Arc<Context<R>>) -> Action {
    warn!(%error, "Reconcile failed");
    Action::requeue(ctx.error_requeue)
}

async fn run_until_drained<F>(
    controller: F,
    close_tx: tokio::sync::oneshot::Sender<()>,
    drain: drain::Watch,
) where
    F: Future<Output = ()>,
{
    tokio::pin!(controller);
    tokio::select! {
        _ = (&mut controller) => {}
        handle = drain.signaled() => {
            info!("Shutting down controller");
            let _ = close_tx.send(());
            handle.release_after(controller).await;
        }
    }
}
