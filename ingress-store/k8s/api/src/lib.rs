#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod class;
pub mod kong;
pub mod tls;

pub use self::class::IngressClass;
pub use k8s_openapi::{
    api::{
        self,
        core::v1::{EndpointSubset, Endpoints, Secret, Service},
        networking::v1::{Ingress, IngressSpec, IngressTLS},
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
    ByteString,
};
pub use kube::{Resource, ResourceExt};
