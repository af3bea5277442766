use crate::{config::PolicyConfig, domain::DomainSuffix};
use std::fmt;
use subdomain_policy_controller_k8s_api::{self as k8s, Labels, ResourceExt, SelectorError};

/// The parts of a namespace that policy decisions depend on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NamespaceMeta {
    pub name: String,
    pub labels: Labels,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow(Allowed),
    Deny(Violation),
}

/// Why a request was allowed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Allowed {
    /// The namespace is not selected for enforcement.
    NotSelected,
    /// No managed domains are configured.
    NoDomains,
    /// None of the hostnames belong to a managed domain.
    Unmanaged,
    /// Every managed hostname is under the namespace's subdomain.
    Permitted,
}

/// A hostname that is outside of its namespace's subdomain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub hostname: String,
    pub subdomain: String,
    pub domain: DomainSuffix,
}

/// Decides whether `ns` may expose `hostnames`.
///
/// Each hostname that belongs to a managed domain must end with
/// `.<subdomain><domain>`. Evaluation stops at the first violation.
pub fn decide<H: AsRef<str>>(
    config: &PolicyConfig,
    ns: &NamespaceMeta,
    hostnames: &[H],
) -> Result<Decision, SelectorError> {
    let selector = match config.namespace_selector.as_ref() {
        Some(selector) => selector,
        None => return Ok(Decision::Allow(Allowed::NotSelected)),
    };
    selector.validate()?;
    if !selector.matches(&ns.labels) {
        return Ok(Decision::Allow(Allowed::NotSelected));
    }

    if config.match_domains.is_empty() {
        return Ok(Decision::Allow(Allowed::NoDomains));
    }

    if !config.match_domains.matches_any(hostnames) {
        return Ok(Decision::Allow(Allowed::Unmanaged));
    }

    let subdomain = config.required_subdomain(&ns.name, &ns.labels);
    for hostname in hostnames.iter().map(AsRef::as_ref) {
        let Some(domain) = config.match_domains.find(hostname) else {
            continue;
        };

        let required = format!(".{subdomain}{domain}");
        if !hostname.ends_with(&required) {
            return Ok(Decision::Deny(Violation {
                hostname: hostname.to_string(),
                subdomain: subdomain.to_string(),
                domain: domain.clone(),
            }));
        }
    }

    Ok(Decision::Allow(Allowed::Permitted))
}

// === impl NamespaceMeta ===

impl From<&k8s::Namespace> for NamespaceMeta {
    fn from(ns: &k8s::Namespace) -> Self {
        Self {
            name: ns.name_any(),
            labels: ns.metadata.labels.clone().into(),
        }
    }
}

// === impl Decision ===

impl Decision {
    #[inline]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }

    /// A human-readable explanation for a denial.
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Allow(_) => None,
            Self::Deny(violation) => Some(violation.to_string()),
        }
    }
}

// === impl Violation ===

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hostname {} must have subdomain {} for domain {}",
            self.hostname, self.subdomain, self.domain
        )
    }
}

impl std::error::Error for Violation {}
