use crate::{
    consumer::{self, LogSynchronizer},
    index::{LogRecorder, Store, StoreConfig, StoreMetrics, Watches},
    k8s::{
        kong::{KongConsumer, KongCredential, KongIngress, KongPlugin},
        Endpoints, Ingress, IngressClass, Secret, Service,
    },
};
use anyhow::{bail, Result};
use clap::Parser;
use futures::prelude::*;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::{num::NonZeroUsize, sync::Arc};
use tokio::time::Duration;
use tracing::{error, info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "ingress-store", about = "Mirrors ingress resources for a proxy controller")]
pub struct Args {
    #[clap(
        long,
        default_value = "ingress_store=info,warn",
        env = "INGRESS_STORE_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Restricts all watches to a single namespace. All namespaces are watched by default.
    #[clap(long)]
    watch_namespace: Option<String>,

    /// The `Ingress` class handled by this controller.
    #[clap(long, default_value = "kong")]
    ingress_class: IngressClass,

    #[clap(long, default_value = "1024")]
    event_buffer_capacity: NonZeroUsize,

    /// Time to wait after dependent resources sync before watching `Ingress` resources.
    #[clap(long, default_value = "1000")]
    settle_delay_ms: u64,

    #[clap(long, default_value = "60")]
    sync_timeout_secs: u64,

    #[clap(long, default_value = "10")]
    missing_secrets_interval_secs: u64,

    #[clap(long, default_value = "60")]
    chain_check_interval_secs: u64,

    /// Disables periodic certificate chain validation.
    #[clap(long)]
    disable_chain_check: bool,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let config = self.store_config();
        let Self {
            log_level,
            log_format,
            client,
            admin,
            watch_namespace,
            ..
        } = self;

        let mut prom = <Registry>::default();
        let metrics = StoreMetrics::register(prom.sub_registry_with_prefix("ingress_store"));
        let sync = LogSynchronizer::register(prom.sub_registry_with_prefix("ingress_store"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let watches = match watch_namespace.as_deref() {
            None => Watches {
                ingresses: runtime
                    .watch_all::<Ingress>(watcher::Config::default())
                    .boxed(),
                services: runtime
                    .watch_all::<Service>(watcher::Config::default())
                    .boxed(),
                endpoints: runtime
                    .watch_all::<Endpoints>(watcher::Config::default())
                    .boxed(),
                secrets: runtime
                    .watch_all::<Secret>(watcher::Config::default())
                    .boxed(),
                kong_plugins: runtime
                    .watch_all::<KongPlugin>(watcher::Config::default())
                    .boxed(),
                kong_consumers: runtime
                    .watch_all::<KongConsumer>(watcher::Config::default())
                    .boxed(),
                kong_credentials: runtime
                    .watch_all::<KongCredential>(watcher::Config::default())
                    .boxed(),
                kong_ingresses: runtime
                    .watch_all::<KongIngress>(watcher::Config::default())
                    .boxed(),
            },
            Some(ns) => {
                info!(namespace = %ns, "Watching a single namespace");
                Watches {
                    ingresses: runtime
                        .watch_namespaced::<Ingress>(ns.to_string(), watcher::Config::default())
                        .boxed(),
                    services: runtime
                        .watch_namespaced::<Service>(ns.to_string(), watcher::Config::default())
                        .boxed(),
                    endpoints: runtime
                        .watch_namespaced::<Endpoints>(ns.to_string(), watcher::Config::default())
                        .boxed(),
                    secrets: runtime
                        .watch_namespaced::<Secret>(ns.to_string(), watcher::Config::default())
                        .boxed(),
                    kong_plugins: runtime
                        .watch_namespaced::<KongPlugin>(ns.to_string(), watcher::Config::default())
                        .boxed(),
                    kong_consumers: runtime
                        .watch_namespaced::<KongConsumer>(ns.to_string(), watcher::Config::default())
                        .boxed(),
                    kong_credentials: runtime
                        .watch_namespaced::<KongCredential>(ns.to_string(), watcher::Config::default())
                        .boxed(),
                    kong_ingresses: runtime
                        .watch_namespaced::<KongIngress>(ns.to_string(), watcher::Config::default())
                        .boxed(),
                }
            }
        };

        let (store, events) = Store::new(config, metrics, Arc::new(LogRecorder));

        // The consumer stops once the store has stopped and the buffer is drained.
        tokio::spawn(consumer::consume(events, sync).instrument(info_span!("consumer")));

        let shutdown = runtime.shutdown_handle();
        tokio::spawn(
            async move {
                if let Err(error) = store.run(watches, shutdown).await {
                    error!(%error, "Store failed");
                }
            }
            .instrument(info_span!("store")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }

    fn store_config(&self) -> StoreConfig {
        StoreConfig {
            ingress_class: self.ingress_class.clone(),
            event_buffer_capacity: self.event_buffer_capacity,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            sync_timeout: Duration::from_secs(self.sync_timeout_secs),
            missing_secrets_interval: Duration::from_secs(self.missing_secrets_interval_secs),
            chain_check_interval: if self.disable_chain_check {
                None
            } else {
                Some(Duration::from_secs(self.chain_check_interval_secs))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_store_defaults() {
        let args = Args::try_parse_from(["ingress-store"]).expect("defaults must parse");
        assert_eq!(args.watch_namespace, None);
        assert_eq!(args.store_config(), StoreConfig::default());
    }

    #[test]
    fn chain_check_can_be_disabled() {
        let args = Args::try_parse_from([
            "ingress-store",
            "--ingress-class=internal",
            "--watch-namespace=ns-0",
            "--event-buffer-capacity=8",
            "--disable-chain-check",
        ])
        .expect("args must parse");
        assert_eq!(args.watch_namespace.as_deref(), Some("ns-0"));

        let config = args.store_config();
        assert_eq!(config.ingress_class, IngressClass::new("internal"));
        assert_eq!(config.event_buffer_capacity.get(), 8);
        assert_eq!(config.chain_check_interval, None);
    }

    #[test]
    fn rejects_empty_event_buffer() {
        assert!(Args::try_parse_from(["ingress-store", "--event-buffer-capacity=0"]).is_err());
    }
}
