use crate::domain::MatchDomains;
use serde::Deserialize;
use subdomain_policy_controller_k8s_api::{Labels, Selector};
use thiserror::Error;

/// An immutable view of the policy configuration at one point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Namespaces subject to enforcement. `None` selects no namespace.
    pub namespace_selector: Option<Selector>,

    /// A namespace label that overrides the namespace name as the required
    /// subdomain.
    pub subdomain_label: Option<String>,

    pub match_domains: MatchDomains,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse policy configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("matchDomains must not contain an empty domain")]
    EmptyDomain,

    #[error("policy configuration is empty")]
    Empty,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    namespace_selector: Option<Selector>,
    #[serde(default)]
    subdomain_label: Option<String>,
    #[serde(default)]
    match_domains: Vec<String>,
}

// === impl PolicyConfig ===

impl PolicyConfig {
    /// Parses a YAML (or JSON) configuration document.
    pub fn from_yaml(raw: &[u8]) -> Result<Self, ConfigError> {
        // A truncated file is more likely a partial write than an intent to
        // lift every restriction.
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(ConfigError::Empty);
        }
        let doc: Option<Document> = serde_yaml::from_slice(raw)?;
        let Document {
            namespace_selector,
            subdomain_label,
            match_domains,
        } = doc.unwrap_or_default();

        if match_domains.iter().any(String::is_empty) {
            return Err(ConfigError::EmptyDomain);
        }

        Ok(Self {
            namespace_selector,
            subdomain_label: subdomain_label.filter(|l| !l.is_empty()),
            match_domains: match_domains.iter().map(String::as_str).collect(),
        })
    }

    /// Returns the subdomain a namespace's hostnames must live under.
    pub fn required_subdomain<'n>(&self, name: &'n str, labels: &'n Labels) -> &'n str {
        self.subdomain_label
            .as_deref()
            .and_then(|key| labels.get(key))
            .unwrap_or(name)
    }
}
