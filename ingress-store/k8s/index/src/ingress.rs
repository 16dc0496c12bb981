use crate::{
    collection::Collection,
    events::Publisher,
    recorder::Recorder,
    secret_index::{SecretIndex, SharedSecretIndex},
    watch::{HandleNotification, Notification},
};
use ahash::AHashSet as HashSet;
use chrono::Utc;
use ingress_store_core::{Event, EventType, Object, ResourceKey};
use ingress_store_k8s_api::{Ingress, IngressClass, ResourceExt, Secret};
use std::sync::Arc;
use tracing::{debug, info};

pub(crate) struct IngressHandler {
    class: IngressClass,
    secrets: Collection<Secret>,
    index: SharedSecretIndex,
    events: Publisher,
    recorder: Arc<dyn Recorder>,
}

/// Returns the keys of the TLS secrets referenced by an `Ingress`.
///
/// Secrets are always resolved in the `Ingress` resource's namespace.
pub fn secret_refs(ingress: &Ingress) -> HashSet<ResourceKey> {
    let Some(namespace) = ingress.namespace() else {
        return HashSet::default();
    };

    ingress
        .spec
        .iter()
        .flat_map(|spec| spec.tls.iter().flatten())
        .filter_map(|tls| tls.secret_name.as_deref())
        .filter(|name| !name.is_empty())
        .map(|name| ResourceKey::new(&namespace, name))
        .collect()
}

/// Recomputes the secrets referenced by an `Ingress` and decodes each referenced secret that does
/// not yet have a certificate.
pub(crate) fn read_secrets(
    index: &SharedSecretIndex,
    secrets: &Collection<Secret>,
    key: &ResourceKey,
    ingress: &Ingress,
) {
    sync_references(&mut index.lock(), secrets, key, ingress);
}

/// Reads secrets for the cached `Ingress` with the given key. Returns false, recording nothing, if
/// the `Ingress` is not cached or belongs to another class.
///
/// The cache is read while the index is locked, so a concurrent delete either observes the new
/// references and removes them or prevents them from being recorded.
pub(crate) fn read_cached_secrets(
    class: &IngressClass,
    ingresses: &Collection<Ingress>,
    index: &SharedSecretIndex,
    secrets: &Collection<Secret>,
    key: &ResourceKey,
) -> bool {
    let mut index = index.lock();
    match ingresses.get(key) {
        Some(ingress) if class.is_valid(&ingress) => {
            sync_references(&mut index, secrets, key, &ingress);
            true
        }
        _ => false,
    }
}

fn sync_references(
    index: &mut SecretIndex,
    secrets: &Collection<Secret>,
    key: &ResourceKey,
    ingress: &Ingress,
) {
    let refs = secret_refs(ingress);
    index.set_references(key, refs.clone());

    let now = Utc::now();
    for secret_key in refs {
        if !index.needs_sync(&secret_key) {
            continue;
        }
        match secrets.get(&secret_key) {
            // Failures are recorded in the index and retried by the repair task.
            Some(secret) => {
                let _ = index.sync(&secret_key, &secret, now);
            }
            None => debug!(ingress = %key, secret = %secret_key, "Referenced secret not found"),
        }
    }
}

// === impl IngressHandler ===

impl IngressHandler {
    pub(crate) fn new(
        class: IngressClass,
        secrets: Collection<Secret>,
        index: SharedSecretIndex,
        events: Publisher,
        recorder: Arc<dyn Recorder>,
    ) -> Self {
        Self {
            class,
            secrets,
            index,
            events,
            recorder,
        }
    }

    fn created(&self, key: &ResourceKey, ingress: Arc<Ingress>) {
        self.recorder
            .record(key, EventType::Create, &format!("Ingress {key}"));
        read_secrets(&self.index, &self.secrets, key, &ingress);
        self.events.publish(Event::create(Object::Ingress(ingress)));
    }

    fn deleted(&self, key: &ResourceKey, ingress: Arc<Ingress>) {
        self.recorder
            .record(key, EventType::Delete, &format!("Ingress {key}"));
        self.index.lock().remove_references(key);
        self.events.publish(Event::delete(Object::Ingress(ingress)));
    }
}

impl HandleNotification<Ingress> for IngressHandler {
    fn handle(&mut self, notification: Notification<Ingress>) {
        match notification {
            Notification::Add(key, ingress) => {
                if !self.class.is_valid(&ingress) {
                    info!(ingress = %key, class = %self.class, "Ignoring Ingress of another class");
                    return;
                }
                self.created(&key, ingress);
            }

            Notification::Update { key, old, cur } => {
                match (self.class.is_valid(&old), self.class.is_valid(&cur)) {
                    (false, true) => {
                        info!(ingress = %key, class = %self.class, "Ingress now matches class");
                        self.created(&key, cur);
                    }
                    (true, false) => {
                        info!(ingress = %key, class = %self.class, "Ingress no longer matches class");
                        self.deleted(&key, cur);
                    }
                    (true, true) if old != cur => {
                        self.recorder
                            .record(&key, EventType::Update, &format!("Ingress {key}"));
                        read_secrets(&self.index, &self.secrets, &key, &cur);
                        self.events.publish(Event::update(
                            Object::Ingress(cur),
                            Object::Ingress(old),
                        ));
                    }
                    (true, true) => debug!(ingress = %key, "Ingress unchanged"),
                    (false, false) => debug!(ingress = %key, "Ignoring update of Ingress of another class"),
                }
            }

            Notification::Delete(key, ingress) => {
                if !self.class.is_valid(&ingress) {
                    info!(ingress = %key, class = %self.class, "Ignoring delete of Ingress of another class");
                    return;
                }
                self.deleted(&key, ingress);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingress_store_k8s_api::{IngressSpec, IngressTLS, ObjectMeta};

    fn mk_ingress(ns: &str, name: &str, secrets: &[&str]) -> Ingress {
        Ingress {
            metadata: ObjectMeta {
                namespace: Some(ns.to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(IngressSpec {
                tls: Some(
                    secrets
                        .iter()
                        .map(|s| IngressTLS {
                            hosts: Some(vec!["example.com".to_string()]),
                            secret_name: Some(s.to_string()),
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            status: None,
        }
    }

    #[test]
    fn secret_refs_resolve_in_ingress_namespace() {
        let ing = mk_ingress("ns", "route1", &["cert1", "cert2", "cert1", ""]);
        let refs = secret_refs(&ing);
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&ResourceKey::new("ns", "cert1")));
        assert!(refs.contains(&ResourceKey::new("ns", "cert2")));
    }

    #[test]
    fn secret_refs_of_ingress_without_tls() {
        let mut ing = mk_ingress("ns", "route1", &[]);
        assert!(secret_refs(&ing).is_empty());
        ing.spec = None;
        assert!(secret_refs(&ing).is_empty());
    }
}
