use crate::{
    events::Publisher,
    watch::{HandleNotification, Notification},
};
use ingress_store_core::{Event, Object};
use std::sync::Arc;

/// Signals a configuration change for every change to a controller-specific resource.
pub(crate) struct ConfigHandler<T> {
    events: Publisher,
    into_object: fn(Arc<T>) -> Object,
}

impl<T> ConfigHandler<T> {
    pub(crate) fn new(events: Publisher, into_object: fn(Arc<T>) -> Object) -> Self {
        Self {
            events,
            into_object,
        }
    }
}

impl<T> HandleNotification<T> for ConfigHandler<T> {
    fn handle(&mut self, notification: Notification<T>) {
        let obj = match notification {
            Notification::Add(_, obj) => obj,
            Notification::Update { cur, .. } => cur,
            Notification::Delete(_, obj) => obj,
        };
        self.events
            .publish(Event::configuration((self.into_object)(obj)));
    }
}
