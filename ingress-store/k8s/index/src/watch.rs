use crate::collection::Collection;
use ahash::AHashSet as HashSet;
use futures::prelude::*;
use ingress_store_core::{ResourceKey, StoreError};
use ingress_store_k8s_api::{Resource, ResourceExt};
use kube::runtime::watcher;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A change to a mirrored object, decoded from the upstream watch protocol.
///
/// The collection has already been updated when a handler observes a notification.
#[derive(Debug, PartialEq)]
pub enum Notification<T> {
    Add(ResourceKey, Arc<T>),
    Update {
        key: ResourceKey,
        old: Arc<T>,
        cur: Arc<T>,
    },
    Delete(ResourceKey, Arc<T>),
}

/// Reacts to changes in a single collection.
pub trait HandleNotification<T> {
    fn handle(&mut self, notification: Notification<T>);
}

/// A deletion whose final object state was not observed, e.g. because the watch was
/// disconnected when it happened.
#[derive(Debug)]
struct Tombstone<T> {
    key: ResourceKey,
    last_known: Option<Arc<T>>,
}

/// Applies raw watch events to a collection and produces notifications.
///
/// A relist (`Init` .. `InitDone`) replays every object that currently exists. Objects that were
/// cached but not replayed were deleted while the watch was down.
struct Decoder<T> {
    collection: Collection<T>,
    relisted: Option<HashSet<ResourceKey>>,
}

/// Drives a collection from an upstream watch until shutdown is signaled.
///
/// If the watch stream ends before shutdown, the collection stops changing and the task idles
/// until shutdown.
pub(crate) async fn run<T, H>(
    collection: Collection<T>,
    mut handler: H,
    events: impl Stream<Item = watcher::Event<T>>,
    shutdown: drain::Watch,
) where
    T: Resource,
    H: HandleNotification<T>,
{
    tokio::pin!(events);
    let shutdown = shutdown.signaled();
    tokio::pin!(shutdown);

    let mut decoder = Decoder::new(collection);
    loop {
        tokio::select! {
            biased;

            _release = &mut shutdown => {
                debug!("Shutdown signaled");
                return;
            }

            event = events.next() => match event {
                Some(event) => decoder.process(event, &mut handler),
                None => {
                    info!(kind = %decoder.collection.kind(), "Watch stream ended");
                    let _release = shutdown.await;
                    return;
                }
            },
        }
    }
}

// === impl Tombstone ===

impl<T> Tombstone<T> {
    fn recover(self) -> Result<(ResourceKey, Arc<T>), StoreError> {
        match self.last_known {
            Some(obj) => Ok((self.key, obj)),
            None => Err(StoreError::TombstoneRecovery(self.key)),
        }
    }
}

// === impl Decoder ===

impl<T: Resource> Decoder<T> {
    fn new(collection: Collection<T>) -> Self {
        Self {
            collection,
            relisted: None,
        }
    }

    fn process(&mut self, event: watcher::Event<T>, handler: &mut impl HandleNotification<T>) {
        match event {
            watcher::Event::Init => {
                debug!(kind = %self.collection.kind(), "Relisting");
                self.relisted = Some(HashSet::default());
            }

            watcher::Event::InitApply(obj) => {
                if let Some(key) = self.key_of(&obj) {
                    self.relisted
                        .get_or_insert_with(HashSet::default)
                        .insert(key.clone());
                    self.apply(key, obj, handler);
                }
            }

            watcher::Event::InitDone => {
                let relisted = self.relisted.take().unwrap_or_default();
                for key in self.collection.keys() {
                    if relisted.contains(&key) {
                        continue;
                    }
                    let last_known = self.collection.remove(&key);
                    self.deleted(Tombstone { key, last_known }, handler);
                }

                if !self.collection.has_synced() {
                    info!(kind = %self.collection.kind(), objects = self.collection.len(), "Synced");
                }
                self.collection.mark_synced();
            }

            watcher::Event::Apply(obj) => {
                if let Some(key) = self.key_of(&obj) {
                    self.apply(key, obj, handler);
                }
            }

            watcher::Event::Delete(obj) => {
                if let Some(key) = self.key_of(&obj) {
                    self.collection.remove(&key);
                    handler.handle(Notification::Delete(key, Arc::new(obj)));
                }
            }
        }
    }

    fn apply(&self, key: ResourceKey, obj: T, handler: &mut impl HandleNotification<T>) {
        let cur = Arc::new(obj);
        let notification = match self.collection.insert(key.clone(), cur.clone()) {
            None => Notification::Add(key, cur),
            Some(old) => Notification::Update { key, old, cur },
        };
        handler.handle(notification);
    }

    fn deleted(&self, tombstone: Tombstone<T>, handler: &mut impl HandleNotification<T>) {
        match tombstone.recover() {
            Ok((key, obj)) => handler.handle(Notification::Delete(key, obj)),
            Err(error) => warn!(kind = %self.collection.kind(), %error, "Dropping deletion"),
        }
    }

    fn key_of(&self, obj: &T) -> Option<ResourceKey> {
        let key = ResourceKey::of(obj);
        if key.is_none() {
            warn!(
                kind = %self.collection.kind(),
                name = ?obj.meta().name,
                namespace = ?obj.namespace(),
                "Ignoring object without a namespace and name"
            );
        }
        key
    }
}
