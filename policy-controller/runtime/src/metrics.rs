use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::{
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

/// Counts configuration reload attempts by outcome.
#[derive(Clone, Debug, Default)]
pub struct ReloadMetrics {
    reloads: Family<ReloadLabels, Counter>,
    watch_errors: Counter,
}

/// Counts admission reviews by resource kind and outcome.
#[derive(Clone, Debug, Default)]
pub struct AdmissionMetrics {
    requests: Family<AdmissionLabels, Counter>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReloadResult {
    Applied,
    Unchanged,
    Failed,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AdmissionResult {
    Allow,
    Deny,
    Invalid,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct ReloadLabels {
    result: &'static str,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct AdmissionLabels {
    kind: String,
    result: &'static str,
}

// === impl ReloadMetrics ===

impl ReloadMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let metrics = Self::default();
        reg.register(
            "reloads",
            "Total number of configuration reload attempts",
            metrics.reloads.clone(),
        );
        reg.register(
            "watch_errors",
            "Total number of errors reported by the configuration file watch",
            metrics.watch_errors.clone(),
        );
        metrics
    }

    pub fn reloaded(&self, result: ReloadResult) {
        self.reloads
            .get_or_create(&ReloadLabels {
                result: result.as_str(),
            })
            .inc();
    }

    pub fn watch_error(&self) {
        self.watch_errors.inc();
    }

    pub fn reloads(&self, result: ReloadResult) -> u64 {
        self.reloads
            .get_or_create(&ReloadLabels {
                result: result.as_str(),
            })
            .get()
    }

    pub fn watch_errors(&self) -> u64 {
        self.watch_errors.get()
    }
}

impl ReloadResult {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Unchanged => "unchanged",
            Self::Failed => "failed",
        }
    }
}

// === impl AdmissionMetrics ===

impl AdmissionMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let metrics = Self::default();
        reg.register(
            "requests",
            "Total number of admission reviews handled",
            metrics.requests.clone(),
        );
        metrics
    }

    pub fn admitted(&self, kind: &str, result: AdmissionResult) {
        self.requests
            .get_or_create(&AdmissionLabels {
                kind: kind.to_string(),
                result: result.as_str(),
            })
            .inc();
    }

    pub fn requests(&self, kind: &str, result: AdmissionResult) -> u64 {
        self.requests
            .get_or_create(&AdmissionLabels {
                kind: kind.to_string(),
                result: result.as_str(),
            })
            .get()
    }
}

impl AdmissionResult {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Invalid => "invalid",
        }
    }
}
