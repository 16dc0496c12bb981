//! Human-readable records of how the store reacted to `Ingress` changes.

use ingress_store_core::{EventType, ResourceKey};

/// Observes `Ingress` lifecycle changes accepted by the store.
///
/// Implementations must not block: records are emitted from watch tasks.
pub trait Recorder: Send + Sync {
    fn record(&self, ingress: &ResourceKey, reason: EventType, note: &str);
}

/// Records through `tracing`.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogRecorder;

impl Recorder for LogRecorder {
    fn record(&self, ingress: &ResourceKey, reason: EventType, note: &str) {
        tracing::info!(%ingress, %reason, "{note}");
    }
}
