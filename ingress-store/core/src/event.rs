use ingress_store_k8s_api::{
    kong::{KongConsumer, KongCredential, KongIngress, KongPlugin},
    Endpoints, Ingress, Secret, Service,
};
use std::{fmt, sync::Arc};

/// Describes how a consumer should react to an [`Event`].
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum EventType {
    /// An object became visible to this controller.
    Create,
    /// A visible object changed.
    Update,
    /// An object is no longer visible to this controller.
    Delete,
    /// Something changed that requires the whole configuration to be derived again. This is not
    /// an incremental delta.
    Configuration,
}

/// A mirrored object, tagged by kind.
#[derive(Clone, Debug, PartialEq)]
pub enum Object {
    Ingress(Arc<Ingress>),
    Service(Arc<Service>),
    Endpoints(Arc<Endpoints>),
    Secret(Arc<Secret>),
    KongPlugin(Arc<KongPlugin>),
    KongConsumer(Arc<KongConsumer>),
    KongCredential(Arc<KongCredential>),
    KongIngress(Arc<KongIngress>),
}

/// A change published to downstream consumers.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub event_type: EventType,
    pub obj: Object,
    /// The prior state of the object; only set for [`EventType::Update`].
    pub old: Option<Object>,
}

// === impl EventType ===

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Configuration => "CONFIGURATION",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl Object ===

impl Object {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ingress(_) => "Ingress",
            Self::Service(_) => "Service",
            Self::Endpoints(_) => "Endpoints",
            Self::Secret(_) => "Secret",
            Self::KongPlugin(_) => "KongPlugin",
            Self::KongConsumer(_) => "KongConsumer",
            Self::KongCredential(_) => "KongCredential",
            Self::KongIngress(_) => "KongIngress",
        }
    }
}

// === impl Event ===

impl Event {
    pub fn create(obj: Object) -> Self {
        Self {
            event_type: EventType::Create,
            obj,
            old: None,
        }
    }

    pub fn update(obj: Object, old: Object) -> Self {
        Self {
            event_type: EventType::Update,
            obj,
            old: Some(old),
        }
    }

    pub fn delete(obj: Object) -> Self {
        Self {
            event_type: EventType::Delete,
            obj,
            old: None,
        }
    }

    pub fn configuration(obj: Object) -> Self {
        Self {
            event_type: EventType::Configuration,
            obj,
            old: None,
        }
    }
}
