use crate::config::{ConfigError, PolicyConfig};
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use std::{fmt, sync::Arc};
use tracing::debug;

/// Holds the active [`PolicyConfig`].
///
/// Readers get a shared snapshot without waiting on reloads: the read lock
/// is only ever held to clone an `Arc`, and writers only take the write lock
/// to swap one in. Reloads are serialized by a separate writer lock that
/// also guards the fingerprint of the last applied payload.
#[derive(Clone, Debug, Default)]
pub struct PolicyStore(Arc<Inner>);

/// A SHA-256 digest of a raw configuration payload.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

#[derive(Debug, Default)]
struct Inner {
    current: RwLock<Arc<PolicyConfig>>,
    applied: Mutex<Option<Fingerprint>>,
}

// === impl PolicyStore ===

impl PolicyStore {
    /// Returns the most recently applied configuration.
    #[inline]
    pub fn get(&self) -> Arc<PolicyConfig> {
        self.0.current.read().clone()
    }

    /// Returns the fingerprint of the most recently applied payload, if any.
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        *self.0.applied.lock()
    }

    /// Applies a raw configuration payload.
    ///
    /// Returns `Ok(false)` without parsing if the payload is identical to the
    /// last applied one. If the payload fails to parse, the active
    /// configuration is left in place and the error is returned.
    pub fn reload(&self, raw: &[u8]) -> Result<bool, ConfigError> {
        let fingerprint = Fingerprint::of(raw);

        let mut applied = self.0.applied.lock();
        if *applied == Some(fingerprint) {
            debug!(%fingerprint, "Configuration unchanged");
            return Ok(false);
        }

        let config = PolicyConfig::from_yaml(raw)?;
        *self.0.current.write() = Arc::new(config);
        *applied = Some(fingerprint);
        debug!(%fingerprint, "Configuration applied");
        Ok(true)
    }
}

// === impl Fingerprint ===

impl Fingerprint {
    pub fn of(raw: &[u8]) -> Self {
        Self(Sha256::digest(raw).into())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainSuffix;
    use std::thread;

    const CONFIG_A: &[u8] = b"namespaceSelector: {}\nmatchDomains: [example.com]\n";
    const CONFIG_B: &[u8] = b"namespaceSelector: {}\nmatchDomains: [example.org]\n";

    #[test]
    fn starts_empty() {
        let store = PolicyStore::default();
        assert_eq!(*store.get(), PolicyConfig::default());
        assert_eq!(store.fingerprint(), None);
    }

    #[test]
    fn reload_is_idempotent() {
        let store = PolicyStore::default();
        assert!(store.reload(CONFIG_A).expect("must apply"));
        let first = store.get();

        assert!(!store.reload(CONFIG_A).expect("must not fail"));
        let second = store.get();
        assert!(
            Arc::ptr_eq(&first, &second),
            "snapshot must not be replaced"
        );
        assert_eq!(store.fingerprint(), Some(Fingerprint::of(CONFIG_A)));
    }

    #[test]
    fn reload_applies_changes() {
        let store = PolicyStore::default();
        store.reload(CONFIG_A).unwrap();
        assert!(store.reload(CONFIG_B).unwrap());
        assert_eq!(
            store.get().match_domains.iter().collect::<Vec<_>>(),
            vec![&DomainSuffix::new("example.org")]
        );
        assert_eq!(store.fingerprint(), Some(Fingerprint::of(CONFIG_B)));

        // Returning to a previous payload is a change.
        assert!(store.reload(CONFIG_A).unwrap());
    }

    #[test]
    fn malformed_payload_keeps_previous_config() {
        let store = PolicyStore::default();
        store.reload(CONFIG_A).unwrap();
        let before = store.get();

        store
            .reload(b"matchDomains: {not: [a list")
            .expect_err("malformed payload must fail");
        assert!(Arc::ptr_eq(&before, &store.get()));
        assert_eq!(store.fingerprint(), Some(Fingerprint::of(CONFIG_A)));

        // A failed payload is retried rather than treated as applied.
        store
            .reload(b"matchDomains: {not: [a list")
            .expect_err("malformed payload must fail again");
    }

    #[test]
    fn truncated_payload_keeps_previous_config() {
        let store = PolicyStore::default();
        store.reload(CONFIG_A).unwrap();
        let before = store.get();

        assert!(matches!(store.reload(b""), Err(ConfigError::Empty)));
        assert!(matches!(store.reload(b"\n"), Err(ConfigError::Empty)));
        assert!(Arc::ptr_eq(&before, &store.get()));
        assert_eq!(store.fingerprint(), Some(Fingerprint::of(CONFIG_A)));
        assert_eq!(store.get().match_domains.len(), 1);
    }

    #[test]
    fn fingerprint_is_hex() {
        let fp = Fingerprint::of(b"");
        assert_eq!(
            fp.to_string(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn readers_observe_whole_snapshots() {
        const FULL: &[u8] = b"namespaceSelector:
  matchLabels:
    tenant: \"true\"
subdomainLabel: example.com/subdomain
matchDomains: [example.com, apps.example.net]
";
        const BARE: &[u8] = b"{}";

        let full = PolicyConfig::from_yaml(FULL).unwrap();
        let bare = PolicyConfig::from_yaml(BARE).unwrap();
        assert!(full.namespace_selector.is_some());
        assert!(full.subdomain_label.is_some());
        assert_eq!(full.match_domains.len(), 2);
        assert_eq!(bare, PolicyConfig::default());

        let store = PolicyStore::default();
        store.reload(FULL).unwrap();

        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    let raw = if i % 2 == 0 { BARE } else { FULL };
                    store.reload(raw).unwrap();
                }
            })
        };

        let readers = (0..4)
            .map(|_| {
                let store = store.clone();
                let (full, bare) = (full.clone(), bare.clone());
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        let config = store.get();
                        assert!(
                            *config == full || *config == bare,
                            "mixed snapshot: {config:?}"
                        );
                    }
                })
            })
            .collect::<Vec<_>>();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }
}
