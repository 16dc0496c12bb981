use crate::{
    events::Publisher,
    watch::{HandleNotification, Notification},
};
use ingress_store_core::{Event, Object};
use ingress_store_k8s_api::Service;

/// Service changes alter upstream definitions, so any update or deletion requires the whole
/// configuration to be derived again. New services take effect once an `Ingress` refers to them.
pub(crate) struct ServiceHandler {
    events: Publisher,
}

impl ServiceHandler {
    pub(crate) fn new(events: Publisher) -> Self {
        Self { events }
    }
}

impl HandleNotification<Service> for ServiceHandler {
    fn handle(&mut self, notification: Notification<Service>) {
        match notification {
            Notification::Add(..) => {}
            Notification::Update { cur: svc, .. } | Notification::Delete(_, svc) => {
                self.events
                    .publish(Event::configuration(Object::Service(svc)));
            }
        }
    }
}
