use crate::{
    collection::{Collection, SyncHandle},
    config::ConfigHandler,
    endpoints::EndpointsHandler,
    events::Publisher,
    ingress::{self, IngressHandler},
    metrics::StoreMetrics,
    reconcile,
    recorder::Recorder,
    secret::SecretHandler,
    secret_index::{SecretIndex, SharedSecretIndex},
    service::ServiceHandler,
    watch::{self, HandleNotification},
};
use ahash::AHashSet as HashSet;
use futures::{future, stream::BoxStream};
use ingress_store_core::{CertificateRecord, Event, Object, ResourceKey, StoreError, Storer};
use ingress_store_k8s_api::{
    kong::{KongConsumer, KongCredential, KongIngress, KongPlugin},
    Endpoints, Ingress, IngressClass, Resource, ResourceExt, Secret, Service,
};
use kube::runtime::watcher;
use parking_lot::Mutex;
use std::{num::NonZeroUsize, sync::Arc};
use tokio::{sync::watch as state, task::JoinHandle, time};
use tracing::{debug, info, info_span, warn, Instrument};

const DEFAULT_EVENT_BUFFER_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(n) => n,
    None => panic!("capacity must not be zero"),
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// The `Ingress` class handled by this instance.
    pub ingress_class: IngressClass,

    pub event_buffer_capacity: NonZeroUsize,

    /// Time to wait after dependencies sync before the `Ingress` watch starts.
    pub settle_delay: time::Duration,

    /// Bounds each wait for collections to complete their initial list.
    pub sync_timeout: time::Duration,

    pub missing_secrets_interval: time::Duration,

    /// Disabled when `None`.
    pub chain_check_interval: Option<time::Duration>,
}

/// Startup progress. States only move forward.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SyncState {
    Idle,
    WatchingDependencies,
    DependenciesSynced,
    WatchingPrimary,
    Synced,
}

/// Upstream watch streams for each mirrored kind.
pub struct Watches {
    pub ingresses: BoxStream<'static, watcher::Event<Ingress>>,
    pub services: BoxStream<'static, watcher::Event<Service>>,
    pub endpoints: BoxStream<'static, watcher::Event<Endpoints>>,
    pub secrets: BoxStream<'static, watcher::Event<Secret>>,
    pub kong_plugins: BoxStream<'static, watcher::Event<KongPlugin>>,
    pub kong_consumers: BoxStream<'static, watcher::Event<KongConsumer>>,
    pub kong_credentials: BoxStream<'static, watcher::Event<KongCredential>>,
    pub kong_ingresses: BoxStream<'static, watcher::Event<KongIngress>>,
}

/// Mirrors cluster state for an ingress controller and publishes changes to a single consumer.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    config: StoreConfig,
    ingresses: Collection<Ingress>,
    services: Collection<Service>,
    endpoints: Collection<Endpoints>,
    secrets: Collection<Secret>,
    kong_plugins: Collection<KongPlugin>,
    kong_consumers: Collection<KongConsumer>,
    kong_credentials: Collection<KongCredential>,
    kong_ingresses: Collection<KongIngress>,
    secret_index: SharedSecretIndex,
    recorder: Arc<dyn Recorder>,
    state: state::Sender<SyncState>,

    /// Taken when the store starts running so that the event receiver observes the end of the
    /// stream once every watch has stopped.
    publisher: Mutex<Option<Publisher>>,
}

enum Wait {
    Synced,
    Shutdown,
}

// === impl StoreConfig ===

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ingress_class: IngressClass::default(),
            event_buffer_capacity: DEFAULT_EVENT_BUFFER_CAPACITY,
            settle_delay: time::Duration::from_secs(1),
            sync_timeout: time::Duration::from_secs(60),
            missing_secrets_interval: time::Duration::from_secs(10),
            chain_check_interval: Some(time::Duration::from_secs(60)),
        }
    }
}

// === impl SyncState ===

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::WatchingDependencies => "WatchingDependencies",
            Self::DependenciesSynced => "DependenciesSynced",
            Self::WatchingPrimary => "WatchingPrimary",
            Self::Synced => "Synced",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl Store ===

impl Store {
    /// Creates an empty store along with the receiving end of its event buffer.
    pub fn new(
        config: StoreConfig,
        metrics: StoreMetrics,
        recorder: Arc<dyn Recorder>,
    ) -> (Self, mpsc_ring::Receiver<Event>) {
        let (tx, rx) = mpsc_ring::channel(config.event_buffer_capacity);
        let (state, _) = state::channel(SyncState::Idle);
        let inner = Inner {
            config,
            ingresses: Collection::new("Ingress"),
            services: Collection::new("Service"),
            endpoints: Collection::new("Endpoints"),
            secrets: Collection::new("Secret"),
            kong_plugins: Collection::new("KongPlugin"),
            kong_consumers: Collection::new("KongConsumer"),
            kong_credentials: Collection::new("KongCredential"),
            kong_ingresses: Collection::new("KongIngress"),
            secret_index: SecretIndex::shared(metrics.clone()),
            recorder,
            state,
            publisher: Mutex::new(Some(Publisher::new(tx, metrics))),
        };
        let store = Self {
            inner: Arc::new(inner),
        };
        (store, rx)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn state(&self) -> state::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    /// Watches all collections, in dependency order, and runs the reconciliation tasks.
    ///
    /// Returns once shutdown has been signaled and every task has stopped. A store may only be
    /// run once.
    pub async fn run(&self, watches: Watches, shutdown: drain::Watch) -> Result<(), StoreError> {
        let publisher = self
            .inner
            .publisher
            .lock()
            .take()
            .ok_or(StoreError::AlreadyRunning)?;

        let Watches {
            ingresses,
            services,
            endpoints,
            secrets,
            kong_plugins,
            kong_consumers,
            kong_credentials,
            kong_ingresses,
        } = watches;
        let inner = &self.inner;
        let mut tasks = Vec::new();

        self.set_state(SyncState::WatchingDependencies);
        tasks.push(spawn_watch(
            inner.services.clone(),
            ServiceHandler::new(publisher.clone()),
            services,
            shutdown.clone(),
            info_span!("services"),
        ));
        tasks.push(spawn_watch(
            inner.endpoints.clone(),
            EndpointsHandler::new(publisher.clone()),
            endpoints,
            shutdown.clone(),
            info_span!("endpoints"),
        ));
        tasks.push(spawn_watch(
            inner.secrets.clone(),
            SecretHandler::new(inner.secret_index.clone(), publisher.clone()),
            secrets,
            shutdown.clone(),
            info_span!("secrets"),
        ));
        tasks.push(spawn_watch(
            inner.kong_plugins.clone(),
            ConfigHandler::new(publisher.clone(), Object::KongPlugin),
            kong_plugins,
            shutdown.clone(),
            info_span!("kongplugins"),
        ));
        tasks.push(spawn_watch(
            inner.kong_consumers.clone(),
            ConfigHandler::new(publisher.clone(), Object::KongConsumer),
            kong_consumers,
            shutdown.clone(),
            info_span!("kongconsumers"),
        ));
        tasks.push(spawn_watch(
            inner.kong_credentials.clone(),
            ConfigHandler::new(publisher.clone(), Object::KongCredential),
            kong_credentials,
            shutdown.clone(),
            info_span!("kongcredentials"),
        ));
        tasks.push(spawn_watch(
            inner.kong_ingresses.clone(),
            ConfigHandler::new(publisher.clone(), Object::KongIngress),
            kong_ingresses,
            shutdown.clone(),
            info_span!("kongingresses"),
        ));

        let dependencies = vec![
            inner.services.sync_handle(),
            inner.endpoints.sync_handle(),
            inner.secrets.sync_handle(),
            inner.kong_plugins.sync_handle(),
            inner.kong_consumers.sync_handle(),
            inner.kong_credentials.sync_handle(),
            inner.kong_ingresses.sync_handle(),
        ];
        if let Wait::Shutdown = self.wait_synced(dependencies, &shutdown).await {
            return stop(tasks, publisher, shutdown).await;
        }
        self.set_state(SyncState::DependenciesSynced);

        debug!(delay = ?inner.config.settle_delay, "Waiting before watching Ingresses");
        tokio::select! {
            biased;
            _release = shutdown.clone().signaled() => {
                return stop(tasks, publisher, shutdown).await;
            }
            () = time::sleep(inner.config.settle_delay) => {}
        }

        self.set_state(SyncState::WatchingPrimary);
        tasks.push(spawn_watch(
            inner.ingresses.clone(),
            IngressHandler::new(
                inner.config.ingress_class.clone(),
                inner.secrets.clone(),
                inner.secret_index.clone(),
                publisher.clone(),
                inner.recorder.clone(),
            ),
            ingresses,
            shutdown.clone(),
            info_span!("ingresses"),
        ));
        if let Wait::Shutdown = self
            .wait_synced(vec![inner.ingresses.sync_handle()], &shutdown)
            .await
        {
            return stop(tasks, publisher, shutdown).await;
        }

        for ingress in self.list_ingresses() {
            self.read_secrets(&ingress);
        }
        self.set_state(SyncState::Synced);

        let store = self.clone();
        tasks.push(tokio::spawn(
            reconcile::every(
                inner.config.missing_secrets_interval,
                shutdown.clone(),
                move || {
                    store.repair_missing_secrets();
                },
            )
            .instrument(info_span!("missing_secrets")),
        ));

        match inner.config.chain_check_interval {
            Some(period) => {
                let store = self.clone();
                tasks.push(tokio::spawn(
                    reconcile::every(period, shutdown.clone(), move || {
                        store.validate_certificate_chains();
                    })
                    .instrument(info_span!("certificate_chains")),
                ));
            }
            None => debug!("Certificate chain validation is disabled"),
        }

        stop(tasks, publisher, shutdown).await
    }

    /// Decodes every secret referenced by an `Ingress` that is missing from the local certificate
    /// store. Returns the number of certificates decoded.
    pub fn repair_missing_secrets(&self) -> usize {
        reconcile::repair_missing_secrets(
            &self.inner.config.ingress_class,
            &self.inner.ingresses,
            &self.inner.secrets,
            &self.inner.secret_index,
        )
    }

    /// Re-validates every local certificate chain. Returns the number of certificates that fail.
    pub fn validate_certificate_chains(&self) -> usize {
        reconcile::validate_certificate_chains(&self.inner.secret_index)
    }

    fn set_state(&self, state: SyncState) {
        info!(%state, "Store state changed");
        self.inner.state.send_replace(state);
    }

    async fn wait_synced(&self, collections: Vec<SyncHandle>, shutdown: &drain::Watch) -> Wait {
        let synced = future::join_all(collections.iter().cloned().map(SyncHandle::synced));
        tokio::select! {
            biased;
            _release = shutdown.clone().signaled() => Wait::Shutdown,
            res = time::timeout(self.inner.config.sync_timeout, synced) => {
                if res.is_err() {
                    let unsynced = collections
                        .iter()
                        .filter(|c| !c.is_synced())
                        .map(SyncHandle::kind)
                        .collect::<Vec<_>>();
                    let error = StoreError::SyncTimeout(unsynced);
                    warn!(%error, "Proceeding without a complete initial list");
                }
                Wait::Synced
            }
        }
    }

    fn not_found<T>(kind: &'static str, key: &ResourceKey) -> Result<T, StoreError> {
        Err(StoreError::not_found(kind, key.clone()))
    }
}

fn spawn_watch<T, H>(
    collection: Collection<T>,
    handler: H,
    events: BoxStream<'static, watcher::Event<T>>,
    shutdown: drain::Watch,
    span: tracing::Span,
) -> JoinHandle<()>
where
    T: Resource + Send + Sync + 'static,
    H: HandleNotification<T> + Send + 'static,
{
    tokio::spawn(watch::run(collection, handler, events, shutdown).instrument(span))
}

/// Drops the store's publisher, waits for shutdown, and then waits for every task to complete.
async fn stop(
    tasks: Vec<JoinHandle<()>>,
    publisher: Publisher,
    shutdown: drain::Watch,
) -> Result<(), StoreError> {
    drop(publisher);
    let release = shutdown.signaled().await;
    let results = release.release_after(future::join_all(tasks)).await;
    for res in results {
        if let Err(error) = res {
            warn!(%error, "Task failed");
        }
    }
    info!("Store stopped");
    Ok(())
}

impl Storer for Store {
    fn get_secret(&self, key: &ResourceKey) -> Result<Arc<Secret>, StoreError> {
        match self.inner.secrets.get(key) {
            Some(secret) => Ok(secret),
            None => Self::not_found("Secret", key),
        }
    }

    fn get_service(&self, key: &ResourceKey) -> Result<Arc<Service>, StoreError> {
        match self.inner.services.get(key) {
            Some(svc) => Ok(svc),
            None => Self::not_found("Service", key),
        }
    }

    fn get_service_endpoints(&self, service: &Service) -> Result<Arc<Endpoints>, StoreError> {
        let key = ResourceKey::new(service.namespace().unwrap_or_default(), service.name_any());
        match self.inner.endpoints.get(&key) {
            Some(ep) => Ok(ep),
            None => Self::not_found("Endpoints", &key),
        }
    }

    fn get_ingress(&self, key: &ResourceKey) -> Result<Arc<Ingress>, StoreError> {
        match self.inner.ingresses.get(key) {
            Some(ing) if self.inner.config.ingress_class.is_valid(&ing) => Ok(ing),
            _ => Self::not_found("Ingress", key),
        }
    }

    fn list_ingresses(&self) -> Vec<Arc<Ingress>> {
        let class = &self.inner.config.ingress_class;
        self.inner.ingresses.list_filtered(|ing| class.is_valid(ing))
    }

    fn get_local_secret(&self, key: &ResourceKey) -> Result<Arc<CertificateRecord>, StoreError> {
        match self.inner.secret_index.lock().certificate_for(key) {
            Some(record) => Ok(record),
            None => Self::not_found("Certificate", key),
        }
    }

    fn list_local_secrets(&self) -> Vec<Arc<CertificateRecord>> {
        self.inner.secret_index.lock().certificates()
    }

    fn tracking_for(&self, secret: &ResourceKey) -> HashSet<ResourceKey> {
        self.inner.secret_index.lock().tracking_for(secret)
    }

    fn read_secrets(&self, ingress: &Ingress) {
        let Some(key) = ResourceKey::of(ingress) else {
            return;
        };
        let read = ingress::read_cached_secrets(
            &self.inner.config.ingress_class,
            &self.inner.ingresses,
            &self.inner.secret_index,
            &self.inner.secrets,
            &key,
        );
        if !read {
            debug!(ingress = %key, "Not reading secrets for an uncached Ingress or one of another class");
        }
    }

    fn get_kong_plugin(&self, namespace: &str, name: &str) -> Result<Arc<KongPlugin>, StoreError> {
        let key = ResourceKey::new(namespace, name);
        match self.inner.kong_plugins.get(&key) {
            Some(plugin) => Ok(plugin),
            None => Self::not_found("KongPlugin", &key),
        }
    }

    fn get_kong_consumer(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Arc<KongConsumer>, StoreError> {
        let key = ResourceKey::new(namespace, name);
        match self.inner.kong_consumers.get(&key) {
            Some(consumer) => Ok(consumer),
            None => Self::not_found("KongConsumer", &key),
        }
    }

    fn get_kong_credential(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Arc<KongCredential>, StoreError> {
        let key = ResourceKey::new(namespace, name);
        match self.inner.kong_credentials.get(&key) {
            Some(credential) => Ok(credential),
            None => Self::not_found("KongCredential", &key),
        }
    }

    fn get_kong_ingress(&self, namespace: &str, name: &str) -> Result<Arc<KongIngress>, StoreError> {
        let key = ResourceKey::new(namespace, name);
        match self.inner.kong_ingresses.get(&key) {
            Some(ki) => Ok(ki),
            None => Self::not_found("KongIngress", &key),
        }
    }

    fn list_kong_consumers(&self) -> Vec<Arc<KongConsumer>> {
        self.inner.kong_consumers.list()
    }

    fn list_kong_credentials(&self) -> Vec<Arc<KongCredential>> {
        self.inner.kong_credentials.list()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.inner.config)
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
impl Store {
    pub(crate) fn secrets(&self) -> &Collection<Secret> {
        &self.inner.secrets
    }

    pub(crate) fn ingresses(&self) -> &Collection<Ingress> {
        &self.inner.ingresses
    }

    pub(crate) fn secret_index(&self) -> &SharedSecretIndex {
        &self.inner.secret_index
    }
}
