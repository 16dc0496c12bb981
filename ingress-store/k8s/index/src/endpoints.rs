use crate::{
    events::Publisher,
    watch::{HandleNotification, Notification},
};
use ingress_store_core::{Event, Object};
use ingress_store_k8s_api::Endpoints;
use tracing::trace;

/// Publishes endpoint changes, ignoring updates that leave the member addresses unchanged.
pub(crate) struct EndpointsHandler {
    events: Publisher,
}

impl EndpointsHandler {
    pub(crate) fn new(events: Publisher) -> Self {
        Self { events }
    }
}

impl HandleNotification<Endpoints> for EndpointsHandler {
    fn handle(&mut self, notification: Notification<Endpoints>) {
        match notification {
            Notification::Add(_, ep) => self.events.publish(Event::create(Object::Endpoints(ep))),
            Notification::Update { key, old, cur } => {
                if old.subsets == cur.subsets {
                    trace!(endpoints = %key, "Subsets unchanged");
                    return;
                }
                self.events.publish(Event::update(
                    Object::Endpoints(cur),
                    Object::Endpoints(old),
                ));
            }
            Notification::Delete(_, ep) => self.events.publish(Event::delete(Object::Endpoints(ep))),
        }
    }
}
