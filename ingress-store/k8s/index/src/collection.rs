use ahash::AHashMap as HashMap;
use ingress_store_core::ResourceKey;
use parking_lot::RwLock;
use std::{fmt, sync::Arc};
use tokio::sync::watch;

/// A local, continuously updated copy of one upstream resource collection.
///
/// Clones share the same cache. Only the collection's watch task mutates it; any number of
/// readers may query it concurrently.
pub struct Collection<T> {
    kind: &'static str,
    objects: Arc<RwLock<HashMap<ResourceKey, Arc<T>>>>,
    synced: Arc<watch::Sender<bool>>,
}

/// Observes whether a collection has completed its initial list.
#[derive(Clone, Debug)]
pub struct SyncHandle {
    kind: &'static str,
    rx: watch::Receiver<bool>,
}

// === impl Collection ===

impl<T> Collection<T> {
    pub fn new(kind: &'static str) -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            kind,
            objects: Default::default(),
            synced: Arc::new(synced),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn get(&self, key: &ResourceKey) -> Option<Arc<T>> {
        self.objects.read().get(key).cloned()
    }

    pub fn list(&self) -> Vec<Arc<T>> {
        self.objects.read().values().cloned().collect()
    }

    pub fn list_filtered(&self, mut f: impl FnMut(&T) -> bool) -> Vec<Arc<T>> {
        self.objects
            .read()
            .values()
            .filter(|o| f(o))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    pub fn sync_handle(&self) -> SyncHandle {
        SyncHandle {
            kind: self.kind,
            rx: self.synced.subscribe(),
        }
    }

    /// Stores the latest snapshot for a key, returning the snapshot it replaced.
    pub(crate) fn insert(&self, key: ResourceKey, obj: Arc<T>) -> Option<Arc<T>> {
        self.objects.write().insert(key, obj)
    }

    pub(crate) fn remove(&self, key: &ResourceKey) -> Option<Arc<T>> {
        self.objects.write().remove(key)
    }

    pub(crate) fn keys(&self) -> Vec<ResourceKey> {
        self.objects.read().keys().cloned().collect()
    }

    pub(crate) fn mark_synced(&self) {
        self.synced.send_if_modified(|synced| !std::mem::replace(synced, true));
    }
}

// NB Clone cannot be derived because `T` doesn't have to implement Clone.
impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            objects: self.objects.clone(),
            synced: self.synced.clone(),
        }
    }
}

impl<T> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("kind", &self.kind)
            .field("len", &self.len())
            .field("synced", &self.has_synced())
            .finish()
    }
}

// === impl SyncHandle ===

impl SyncHandle {
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn is_synced(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits until the collection has completed its initial list.
    pub async fn synced(mut self) {
        // The sender is owned by the collection; if it is dropped, there is nothing to wait for.
        let _ = self.rx.wait_for(|synced| *synced).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_returns_previous() {
        let c = Collection::<&'static str>::new("Test");
        let key = ResourceKey::new("ns-0", "a");
        assert_eq!(c.insert(key.clone(), Arc::new("v1")), None);
        assert_eq!(c.insert(key.clone(), Arc::new("v2")), Some(Arc::new("v1")));
        assert_eq!(c.get(&key), Some(Arc::new("v2")));
        assert_eq!(c.remove(&key), Some(Arc::new("v2")));
        assert!(c.is_empty());
    }

    #[tokio::test]
    async fn sync_handle_observes_initial_list() {
        let c = Collection::<()>::new("Test");
        let handle = c.sync_handle();
        assert!(!handle.is_synced());

        let wait = tokio::spawn(handle.clone().synced());
        c.mark_synced();
        tokio::time::timeout(std::time::Duration::from_secs(1), wait)
            .await
            .expect("sync must be observed")
            .unwrap();
        assert!(handle.is_synced());
        assert!(c.has_synced());
    }
}
