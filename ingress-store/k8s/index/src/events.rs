use crate::metrics::StoreMetrics;
use ingress_store_core::Event;
use tracing::{debug, warn};

/// Publishes change events into the bounded event buffer.
///
/// Publishing never blocks: when the buffer is full, the oldest buffered event is evicted.
#[derive(Clone, Debug)]
pub(crate) struct Publisher {
    tx: mpsc_ring::Sender<Event>,
    metrics: StoreMetrics,
}

impl Publisher {
    pub(crate) fn new(tx: mpsc_ring::Sender<Event>, metrics: StoreMetrics) -> Self {
        Self { tx, metrics }
    }

    pub(crate) fn publish(&self, event: Event) {
        let event_type = event.event_type;
        let kind = event.obj.kind();
        match self.tx.send(event) {
            Ok(None) => {
                debug!(%event_type, %kind, "Published");
                self.metrics.published(event_type);
            }
            Ok(Some(evicted)) => {
                self.metrics.published(event_type);
                self.metrics.dropped();
                warn!(
                    %event_type,
                    %kind,
                    evicted.event_type = %evicted.event_type,
                    evicted.kind = %evicted.obj.kind(),
                    capacity = self.tx.capacity(),
                    "Event buffer full; dropped the oldest event"
                );
            }
            Err(_) => debug!(%event_type, %kind, "Event consumer is gone"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingress_store_core::{EventType, Object};
    use ingress_store_k8s_api::{ObjectMeta, Service};
    use std::{num::NonZeroUsize, sync::Arc};

    fn mk_event(name: &str) -> Event {
        Event::configuration(Object::Service(Arc::new(Service {
            metadata: ObjectMeta {
                namespace: Some("ns".to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        })))
    }

    #[test]
    fn full_buffer_keeps_newest_events() {
        let metrics = StoreMetrics::default();
        let (tx, mut rx) = mpsc_ring::channel(NonZeroUsize::new(2).unwrap());
        let publisher = Publisher::new(tx, metrics.clone());

        for name in ["svc-0", "svc-1", "svc-2"] {
            publisher.publish(mk_event(name));
        }
        assert_eq!(metrics.dropped_count(), 1);

        assert_eq!(rx.try_recv(), Ok(mk_event("svc-1")));
        assert_eq!(rx.try_recv(), Ok(mk_event("svc-2")));
        assert_eq!(rx.try_recv(), Err(mpsc_ring::TryRecvError::Empty));

        drop(publisher);
        assert_eq!(rx.try_recv(), Err(mpsc_ring::TryRecvError::Closed));
        assert_eq!(mk_event("svc-0").event_type, EventType::Configuration);
    }
}
