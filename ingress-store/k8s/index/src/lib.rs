//! Ingress store
//!
//! The store mirrors the cluster resources that an ingress controller needs to configure its
//! proxy, and republishes a filtered stream of changes to a single downstream consumer. It watches
//! the following resources:
//!
//! - `Service`, `Endpoints`, and `Secret` resources, and the controller-specific `KongPlugin`,
//!   `KongConsumer`, `KongCredential`, and `KongIngress` resources, are dependencies. They are
//!   watched first and must complete their initial list before any `Ingress` is processed.
//! - Each `Ingress` is filtered by its class. `Ingress` resources of another class are cached but
//!   never listed or published.
//! - Each `Ingress` references TLS secrets in its namespace. We maintain an index of which
//!   `Ingress` resources reference each secret, and decode the referenced secrets into a local
//!   certificate store.
//!
//! ```text
//! [ Ingress ] -> [ Secret usage index ] -> [ Local certificates ] <- [ Secret ]
//!      \                                                                /
//!       `--------------------> [ Event ring ] <------------------------'
//! ```
//!
//! Each resource kind is owned by a single watch task that updates its collection and then hands
//! a decoded notification to the kind's handler. Handlers apply the suppression rules for their
//! kind and publish events to a lossy ring channel: when the consumer falls behind, the oldest
//! events are dropped rather than slowing down the watches.
//!
//! The secret usage index and the certificate store are updated together under one lock, by the
//! `Ingress` and `Secret` watches and by two periodic tasks: one repairs certificates that are
//! referenced but missing, the other re-validates certificate chains.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod cert;
mod collection;
mod config;
mod endpoints;
mod events;
mod ingress;
pub mod metrics;
mod reconcile;
pub mod recorder;
mod secret;
mod secret_index;
mod service;
mod store;
mod watch;


pub use self::{
    cert::DecodeError,
    collection::{Collection, SyncHandle},
    ingress::secret_refs,
    metrics::StoreMetrics,
    recorder::{LogRecorder, Recorder},
    secret_index::{SecretIndex, SharedSecretIndex},
    store::{Store, StoreConfig, SyncState, Watches},
    watch::{HandleNotification, Notification},
};
pub use ingress_store_core::{
    CertificateRecord, Event, EventType, Object, ResourceKey, StoreError, Storer,
};
