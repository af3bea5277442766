#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod hosts;
pub mod labels;
pub mod route;

pub use self::{
    hosts::ExposedHostnames,
    labels::{Labels, Selector, SelectorError},
    route::{Route, RouteSpec},
};
pub use k8s_openapi::api::{
    self,
    core::v1::Namespace,
    networking::v1::{Ingress, IngressSpec},
};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
pub use kube::core::{Resource, ResourceExt};
