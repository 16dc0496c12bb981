use crate::core::{Event, EventType};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use tracing::{debug, info};

/// Applies store changes to the proxy.
///
/// A `Configuration` event means that the whole configuration must be derived again from the
/// store; other events describe a single object. Events may be lost when the consumer falls
/// behind, so implementations should periodically derive the full configuration as well.
pub trait Synchronizer: Send + 'static {
    fn synchronize(&mut self, event: Event);
}

/// Logs and counts every event.
#[derive(Clone, Debug, Default)]
pub struct LogSynchronizer {
    consumed: Family<ConsumedLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ConsumedLabels {
    event_type: String,
    kind: String,
}

/// Hands each buffered event to the synchronizer until every producer is gone.
pub async fn consume(mut events: mpsc_ring::Receiver<Event>, mut sync: impl Synchronizer) {
    while let Some(event) = events.recv().await {
        sync.synchronize(event);
    }
    debug!("Event buffer closed");
}

// === impl LogSynchronizer ===

impl LogSynchronizer {
    pub fn register(prom: &mut Registry) -> Self {
        let consumed = Family::default();
        prom.register(
            "events_consumed",
            "Count of change events handed to the synchronizer",
            consumed.clone(),
        );
        Self { consumed }
    }
}

impl Synchronizer for LogSynchronizer {
    fn synchronize(&mut self, event: Event) {
        let kind = event.obj.kind();
        self.consumed
            .get_or_create(&ConsumedLabels {
                event_type: event.event_type.as_str().to_string(),
                kind: kind.to_string(),
            })
            .inc();

        match event.event_type {
            EventType::Configuration => info!(%kind, "Configuration changed"),
            event_type => debug!(%event_type, %kind, "Object changed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::Object,
        k8s::{ObjectMeta, Service},
    };
    use std::{num::NonZeroUsize, sync::Arc};

    #[derive(Default)]
    struct Collect(Arc<parking_lot::Mutex<Vec<Event>>>);

    impl Synchronizer for Collect {
        fn synchronize(&mut self, event: Event) {
            self.0.lock().push(event);
        }
    }

    #[tokio::test]
    async fn consumes_until_producers_are_gone() {
        let (tx, rx) = mpsc_ring::channel(NonZeroUsize::new(4).unwrap());
        let svc = Arc::new(Service {
            metadata: ObjectMeta {
                namespace: Some("ns".to_string()),
                name: Some("svc".to_string()),
                ..Default::default()
            },
            ..Default::default()
        });
        tx.send(Event::configuration(Object::Service(svc.clone())))
            .unwrap();
        tx.send(Event::delete(Object::Service(svc))).unwrap();
        drop(tx);

        let collect = Collect::default();
        let seen = collect.0.clone();
        tokio::time::timeout(std::time::Duration::from_secs(1), consume(rx, collect))
            .await
            .expect("consumer must stop once the buffer closes");

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].event_type, EventType::Configuration);
        assert_eq!(seen[1].event_type, EventType::Delete);
    }

    #[test]
    fn log_synchronizer_counts_events() {
        let mut prom = Registry::default();
        let mut sync = LogSynchronizer::register(&mut prom);
        let svc = Arc::new(Service::default());
        sync.synchronize(Event::configuration(Object::Service(svc.clone())));
        sync.synchronize(Event::configuration(Object::Service(svc)));

        let count = sync
            .consumed
            .get_or_create(&ConsumedLabels {
                event_type: "CONFIGURATION".to_string(),
                kind: "Service".to_string(),
            })
            .get();
        assert_eq!(count, 2);
    }
}
