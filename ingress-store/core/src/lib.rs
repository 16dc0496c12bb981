#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod certificate;
mod error;
mod event;
mod resource_key;

pub use self::{
    certificate::CertificateRecord,
    error::StoreError,
    event::{Event, EventType, Object},
    resource_key::{ParseKeyError, ResourceKey},
};
use ahash::AHashSet as HashSet;
use ingress_store_k8s_api::{
    kong::{KongConsumer, KongCredential, KongIngress, KongPlugin},
    Endpoints, Ingress, Secret, Service,
};
use std::sync::Arc;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Read access to the mirrored cluster state.
///
/// All lookups are answered from local caches. Lookups of absent keys return
/// [`StoreError::NotFound`].
pub trait Storer {
    fn get_secret(&self, key: &ResourceKey) -> Result<Arc<Secret>>;

    fn get_service(&self, key: &ResourceKey) -> Result<Arc<Service>>;

    /// Returns the endpoints that back the given service.
    fn get_service_endpoints(&self, service: &Service) -> Result<Arc<Endpoints>>;

    /// Returns an `Ingress` handled by this controller's class.
    fn get_ingress(&self, key: &ResourceKey) -> Result<Arc<Ingress>>;

    /// Lists the `Ingress` resources handled by this controller's class.
    fn list_ingresses(&self) -> Vec<Arc<Ingress>>;

    /// Returns the decoded certificate for a secret, if it decoded successfully.
    fn get_local_secret(&self, key: &ResourceKey) -> Result<Arc<CertificateRecord>>;

    fn list_local_secrets(&self) -> Vec<Arc<CertificateRecord>>;

    /// Lists the `Ingress` resources that reference a secret through their TLS configuration.
    fn tracking_for(&self, secret: &ResourceKey) -> HashSet<ResourceKey>;

    /// Recomputes the secret references of an `Ingress` and decodes any referenced secret that is
    /// not yet available locally.
    ///
    /// Only the cached copy of the `Ingress` with the same key is read, and only if it matches the
    /// store's class. Nothing is recorded for an `Ingress` that is not cached.
    fn read_secrets(&self, ingress: &Ingress);

    fn get_kong_plugin(&self, namespace: &str, name: &str) -> Result<Arc<KongPlugin>>;

    fn get_kong_consumer(&self, namespace: &str, name: &str) -> Result<Arc<KongConsumer>>;

    fn get_kong_credential(&self, namespace: &str, name: &str) -> Result<Arc<KongCredential>>;

    fn get_kong_ingress(&self, namespace: &str, name: &str) -> Result<Arc<KongIngress>>;

    fn list_kong_consumers(&self) -> Vec<Arc<KongConsumer>>;

    fn list_kong_credentials(&self) -> Vec<Arc<KongCredential>>;
}
