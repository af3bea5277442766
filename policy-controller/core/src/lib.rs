#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod config;
pub mod decision;
pub mod domain;
pub mod store;

pub use self::{
    config::{ConfigError, PolicyConfig},
    decision::{decide, Allowed, Decision, NamespaceMeta, Violation},
    domain::{find_match, matches_any, DomainSuffix, MatchDomains},
    store::{Fingerprint, PolicyStore},
};
