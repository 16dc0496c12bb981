use crate::Ingress;

/// The annotation that selects the controller instance responsible for an `Ingress`.
pub const ANNOTATION: &str = "kubernetes.io/ingress.class";

/// The class handled when none is configured. `Ingress` resources that do not declare any class
/// are only picked up by instances running with this class.
pub const DEFAULT: &str = "kong";

/// Decides whether an `Ingress` belongs to this controller instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngressClass(String);

// === impl IngressClass ===

impl Default for IngressClass {
    fn default() -> Self {
        Self(DEFAULT.to_string())
    }
}

impl IngressClass {
    pub fn new(class: impl ToString) -> Self {
        Self(class.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_default(&self) -> bool {
        self.0 == DEFAULT
    }

    /// Returns true if the `Ingress` is handled by this class.
    ///
    /// The annotation takes precedence over `spec.ingressClassName`. A resource that declares
    /// neither is only valid for the default class.
    pub fn is_valid(&self, ingress: &Ingress) -> bool {
        let annotation = ingress
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(ANNOTATION))
            .filter(|v| !v.is_empty());
        if let Some(class) = annotation {
            return *class == self.0;
        }

        let class_name = ingress
            .spec
            .as_ref()
            .and_then(|spec| spec.ingress_class_name.as_ref())
            .filter(|v| !v.is_empty());
        match class_name {
            Some(class) => *class == self.0,
            None => self.is_default(),
        }
    }
}

impl std::fmt::Display for IngressClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for IngressClass {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}
