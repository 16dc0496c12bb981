use ingress_store_core::EventType;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct StoreMetrics {
    events_published: Family<EventLabels, Counter>,
    events_dropped: Counter,
    decode_failures: Counter,
    local_certificates: Gauge,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct EventLabels {
    event_type: String,
}

impl StoreMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let events_published = Family::default();
        prom.register(
            "events_published",
            "Count of change events published to the event buffer",
            events_published.clone(),
        );

        let events_dropped = Counter::default();
        prom.register(
            "events_dropped",
            "Count of change events evicted from a full event buffer",
            events_dropped.clone(),
        );

        let decode_failures = Counter::default();
        prom.register(
            "certificate_decode_failures",
            "Count of TLS secrets that could not be decoded",
            decode_failures.clone(),
        );

        let local_certificates = Gauge::default();
        prom.register(
            "local_certificates",
            "Gauge of the number of decoded certificates in the local store",
            local_certificates.clone(),
        );

        Self {
            events_published,
            events_dropped,
            decode_failures,
            local_certificates,
        }
    }

    pub(crate) fn published(&self, event_type: EventType) {
        self.events_published
            .get_or_create(&EventLabels {
                event_type: event_type.as_str().to_string(),
            })
            .inc();
    }

    pub(crate) fn dropped(&self) {
        self.events_dropped.inc();
    }

    pub(crate) fn decode_failed(&self) {
        self.decode_failures.inc();
    }

    pub(crate) fn set_local_certificates(&self, count: usize) {
        self.local_certificates
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    #[cfg(test)]
    pub(crate) fn dropped_count(&self) -> u64 {
        self.events_dropped.get()
    }

    #[cfg(test)]
    pub(crate) fn local_certificates_count(&self) -> i64 {
        self.local_certificates.get()
    }
}
