#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod extension;
pub mod gateway;
pub mod multicluster;
pub mod policy;
mod project;
pub mod refs;

pub use self::project::{Classify, Project};
pub use k8s_openapi::{
    api::{
        self,
        core::v1::{ConfigMap, Endpoints, Secret, Service, ServiceSpec},
        discovery::v1::EndpointSlice,
    },
    apimachinery::pkg::apis::meta::v1::Condition,
};
pub use kube::api::{ObjectMeta, ResourceExt};
