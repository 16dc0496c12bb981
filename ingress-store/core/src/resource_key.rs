use ingress_store_k8s_api::{Resource, ResourceExt};
use std::{fmt, str::FromStr};

/// Identifies a namespaced resource within its kind, formatted as `namespace/name`.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("invalid resource key {0:?}: expected namespace/name")]
pub struct ParseKeyError(String);

// === impl ResourceKey ===

impl ResourceKey {
    pub fn new(namespace: impl ToString, name: impl ToString) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Returns the key of a namespaced resource, or `None` if the resource is missing a
    /// namespace or name.
    pub fn of<T: Resource>(resource: &T) -> Option<Self> {
        let namespace = resource.namespace()?;
        let name = resource.meta().name.clone()?;
        Some(Self { namespace, name })
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ResourceKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(ns, name))
            }
            _ => Err(ParseKeyError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let key = "ns-0/cert-0".parse::<ResourceKey>().unwrap();
        assert_eq!(key, ResourceKey::new("ns-0", "cert-0"));
        assert_eq!(key.to_string(), "ns-0/cert-0");
    }

    #[test]
    fn rejects_malformed_keys() {
        for s in ["", "ns", "/name", "ns/", "a/b/c"] {
            assert!(s.parse::<ResourceKey>().is_err(), "{s:?} must not parse");
        }
    }
}
