#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use ingress_store_core as core;
pub use ingress_store_k8s_api as k8s;
pub use ingress_store_k8s_index as index;

mod args;
mod consumer;

pub use self::{
    args::Args,
    consumer::{consume, LogSynchronizer, Synchronizer},
};
