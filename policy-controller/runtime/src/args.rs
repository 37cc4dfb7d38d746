use crate::{
    admission::Admission,
    controller,
    core::ModuleWrapper,
    reconcile::{InstallerConfig, KubeStore, NodeFanout, PolicyReconciler, ReconcileMetrics},
    validation::PolicyLookup,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::{sync::Arc, time::Duration};
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "selinux-policy", about = "An SELinux policy controller")]
pub struct Args {
    #[clap(
        long,
        default_value = "selinux=info,warn",
        env = "SELINUX_POLICY_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Disables the admission controller server.
    #[clap(long)]
    admission_controller_disabled: bool,

    /// The namespace in which module stores and installer pods are created.
    #[clap(long, default_value = "selinux-operator", env = "OPERATOR_NAMESPACE")]
    controller_namespace: String,

    #[clap(long, default_value = "quay.io/jaosorior/udica")]
    installer_image: String,

    #[clap(long, default_value = "selinux-operator")]
    installer_service_account: String,

    /// How often installer pods are checked while any of them is running.
    #[clap(long, default_value = "5")]
    poll_interval_secs: u64,

    #[clap(long, default_value = "10")]
    error_requeue_secs: u64,

    /// Overrides the template that wraps a policy body into a module.
    ///
    /// The template must contain the `{name}`, `{namespace}` and `{policy}`
    /// placeholders.
    #[clap(long)]
    policy_wrapper_template: Option<String>,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            server,
            admission_controller_disabled,
            controller_namespace,
            installer_image,
            installer_service_account,
            poll_interval_secs,
            error_requeue_secs,
            policy_wrapper_template,
        } = self;

        let server = if admission_controller_disabled {
            None
        } else {
            Some(server)
        };

        let wrapper = match policy_wrapper_template {
            Some(template) => template
                .parse::<ModuleWrapper>()
                .context("invalid policy wrapper template")?,
            None => ModuleWrapper::default(),
        };
        if poll_interval_secs == 0 {
            bail!("--poll-interval-secs must be greater than zero");
        }
        let poll_interval = Duration::from_secs(poll_interval_secs);
        let error_requeue = Duration::from_secs(error_requeue_secs);

        let mut prom = <Registry>::default();
        let metrics = ReconcileMetrics::register(prom.sub_registry_with_prefix("selinux_policy"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_optional_server(server)
            .build()
            .await?;

        let client = runtime.client();
        let store = KubeStore::new(client.clone());
        info!(namespace = %controller_namespace, template = %wrapper, "Starting controllers");

        let policies = PolicyReconciler::new(store.clone(), wrapper, controller_namespace.clone());
        tokio::spawn(
            controller::policies(
                client.clone(),
                policies,
                metrics.clone(),
                error_requeue,
                runtime.shutdown_handle(),
            )
            .instrument(info_span!("selinuxpolicies")),
        );

        let installer = InstallerConfig {
            namespace: controller_namespace.clone(),
            image: installer_image,
            service_account: installer_service_account,
        };
        let fanout = NodeFanout::new(store.clone(), installer, poll_interval);
        tokio::spawn(
            controller::module_stores(
                client,
                controller_namespace,
                fanout,
                metrics,
                error_requeue,
                runtime.shutdown_handle(),
            )
            .instrument(info_span!("modulestores")),
        );

        let policies: Arc<dyn PolicyLookup> = Arc::new(store);
        let runtime = runtime.spawn_server(move || Admission::new(policies.clone()));

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
