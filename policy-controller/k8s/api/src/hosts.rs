use crate::{api::networking::v1::IngressSpec, route::RouteSpec};

/// Extracts the externally-exposed hostnames of a resource spec.
///
/// A rule without a host yields an empty string so that every rule is
/// represented.
pub trait ExposedHostnames {
    fn hostnames(&self) -> Vec<String>;
}

impl ExposedHostnames for IngressSpec {
    fn hostnames(&self) -> Vec<String> {
        self.rules
            .iter()
            .flatten()
            .map(|rule| rule.host.clone().unwrap_or_default())
            .collect()
    }
}

impl ExposedHostnames for RouteSpec {
    fn hostnames(&self) -> Vec<String> {
        vec![self.host.clone().unwrap_or_default()]
    }
}
