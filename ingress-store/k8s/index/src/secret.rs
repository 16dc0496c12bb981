use crate::{
    events::Publisher,
    secret_index::SharedSecretIndex,
    watch::{HandleNotification, Notification},
};
use chrono::Utc;
use ingress_store_core::{Event, Object, ResourceKey};
use ingress_store_k8s_api::Secret;
use tracing::{debug, info};

/// Keeps the local certificate store in step with the secrets referenced by `Ingress` resources.
///
/// A newly added secret that is already referenced is decoded without publishing an event. The
/// consumer learns of the certificate through the next event for an `Ingress` that references it
/// or through its own periodic full resync. Updates to referenced secrets and all deletions are
/// published.
pub(crate) struct SecretHandler {
    index: SharedSecretIndex,
    events: Publisher,
}

impl SecretHandler {
    pub(crate) fn new(index: SharedSecretIndex, events: Publisher) -> Self {
        Self { index, events }
    }

    /// Decodes the secret if an `Ingress` references it. Returns true if a certificate was decoded.
    fn sync_tracked(&self, key: &ResourceKey, secret: &Secret) -> bool {
        let mut index = self.index.lock();
        if !index.is_tracked(key) {
            return false;
        }
        index.sync(key, secret, Utc::now()).is_ok()
    }
}

impl HandleNotification<Secret> for SecretHandler {
    fn handle(&mut self, notification: Notification<Secret>) {
        match notification {
            Notification::Add(key, secret) => {
                if self.sync_tracked(&key, &secret) {
                    debug!(secret = %key, "Decoded referenced secret");
                }
            }

            Notification::Update { key, old, cur } => {
                if old == cur {
                    return;
                }
                if self.sync_tracked(&key, &cur) {
                    info!(secret = %key, "Referenced secret changed");
                    self.events.publish(Event::update(
                        Object::Secret(cur.clone()),
                        Object::Secret(old),
                    ));
                    self.events.publish(Event::configuration(Object::Secret(cur)));
                }
            }

            Notification::Delete(key, secret) => {
                self.index.lock().remove_certificate(&key);
                self.events.publish(Event::delete(Object::Secret(secret)));
            }
        }
    }
}
