use crate::{
    admission::Admission,
    core::PolicyStore,
    k8s::Namespace,
    metrics::{AdmissionMetrics, ReloadMetrics, ReloadResult},
    watch::ConfigWatcher,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::{path::PathBuf, sync::Arc};
use tokio::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
#[clap(
    name = "subdomain-policy",
    about = "Restricts the hostnames a namespace may expose to its own subdomain"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "subdomain_policy=info,warn",
        env = "SUBDOMAIN_POLICY_LOG"
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

    /// Path to the policy configuration file.
    ///
    /// The file is reloaded whenever it changes.
    #[clap(long, default_value = "/var/run/subdomain-policy/config.yaml")]
    config: PathBuf,

    /// How long the configuration file must be quiet before it is reloaded.
    #[clap(long, default_value = "200")]
    config_debounce_ms: u64,
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
            config,
            config_debounce_ms,
        } = self;

        let mut prom = <Registry>::default();
        let reload_metrics = ReloadMetrics::register(prom.sub_registry_with_prefix("config"));
        let admission_metrics =
            AdmissionMetrics::register(prom.sub_registry_with_prefix("admission"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_server(server)
            .build()
            .await?;

        // The initial configuration must be valid; later reloads fall back to
        // the last valid configuration.
        let store = PolicyStore::default();
        let raw = tokio::fs::read(&config)
            .await
            .with_context(|| format!("failed to read {}", config.display()))?;
        store
            .reload(&raw)
            .with_context(|| format!("invalid configuration in {}", config.display()))?;
        reload_metrics.reloaded(ReloadResult::Applied);
        info!(
            path = %config.display(),
            fingerprint = ?store.fingerprint(),
            "Loaded configuration"
        );

        ConfigWatcher::new(
            config,
            store.clone(),
            Duration::from_millis(config_debounce_ms),
            reload_metrics,
        )
        .spawn();

        let namespaces = kube::Api::<Namespace>::all(runtime.client());
        let admission = Admission::new(store, Arc::new(namespaces), admission_metrics);
        let runtime = runtime.spawn_server(admission);

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
