#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use subdomain_policy_controller_core as core;
pub use subdomain_policy_controller_k8s_api as k8s;

mod admission;
mod args;
pub mod metrics;
pub mod watch;

pub use self::{
    admission::{Admission, LookupNamespace},
    args::Args,
    watch::ConfigWatcher,
};
