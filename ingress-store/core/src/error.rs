use crate::ResourceKey;

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The key is absent from the collection, or its certificate failed to decode.
    #[error("{kind} {key} was not found")]
    NotFound { kind: &'static str, key: ResourceKey },

    #[error("resource {0} was not found in the tombstone cache")]
    TombstoneRecovery(ResourceKey),

    #[error("timed out waiting for {0:?} to sync")]
    SyncTimeout(Vec<&'static str>),

    #[error("the store is already running")]
    AlreadyRunning,
}

impl StoreError {
    pub fn not_found(kind: &'static str, key: ResourceKey) -> Self {
        Self::NotFound { kind, key }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
