//! Longest-suffix matching of hostnames against managed domains.

use std::fmt;

/// A managed domain, normalized to begin with a `.` so that it only matches
/// at a label boundary.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DomainSuffix(String);

/// Managed domains ordered most-specific first.
///
/// Domains are sorted by descending length. Domains of equal length keep the
/// order in which they were configured, so the first configured domain wins a
/// tie.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchDomains(Vec<DomainSuffix>);

/// Returns the longest of `domains` that `hostname` ends with, normalized to
/// begin with a `.`.
///
/// `domains` is not reordered; sorting happens on a private copy.
pub fn find_match<S: AsRef<str>>(hostname: &str, domains: &[S]) -> Option<DomainSuffix> {
    MatchDomains::from_iter(domains.iter().map(AsRef::as_ref))
        .find(hostname)
        .cloned()
}

/// Returns true if any of `hostnames` ends with one of `domains`.
pub fn matches_any<H, S>(hostnames: &[H], domains: &[S]) -> bool
where
    H: AsRef<str>,
    S: AsRef<str>,
{
    MatchDomains::from_iter(domains.iter().map(AsRef::as_ref)).matches_any(hostnames)
}

// === impl DomainSuffix ===

impl DomainSuffix {
    pub fn new(domain: &str) -> Self {
        if domain.starts_with('.') {
            Self(domain.to_string())
        } else {
            Self(format!(".{domain}"))
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_suffix_of(&self, hostname: &str) -> bool {
        hostname.ends_with(&self.0)
    }
}

impl fmt::Display for DomainSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for DomainSuffix {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

// === impl MatchDomains ===

impl MatchDomains {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DomainSuffix> {
        self.0.iter()
    }

    /// Finds the most specific domain that `hostname` belongs to.
    pub fn find(&self, hostname: &str) -> Option<&DomainSuffix> {
        self.0.iter().find(|d| d.is_suffix_of(hostname))
    }

    pub fn matches_any<H: AsRef<str>>(&self, hostnames: &[H]) -> bool {
        hostnames.iter().any(|h| self.find(h.as_ref()).is_some())
    }
}

impl<'a> FromIterator<&'a str> for MatchDomains {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        let mut domains = iter.into_iter().map(DomainSuffix::new).collect::<Vec<_>>();
        // `sort_by` is stable, which preserves configured order among ties.
        domains.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self(domains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn more_specific_domain_wins() {
        let domains = ["example.com", "staging.example.com"];
        assert_eq!(
            find_match("foo.staging.example.com", &domains),
            Some(DomainSuffix::new(".staging.example.com"))
        );
        assert_eq!(
            find_match("foo.prod.example.com", &domains),
            Some(DomainSuffix::new(".example.com"))
        );
    }

    #[test]
    fn input_order_is_preserved() {
        let domains = vec!["a.io".to_string(), "longer.a.io".to_string()];
        let _ = find_match("x.longer.a.io", &domains);
        assert_eq!(domains, vec!["a.io".to_string(), "longer.a.io".to_string()]);
    }

    #[test]
    fn matches_on_label_boundary() {
        let domains = ["example.com"];
        assert_eq!(find_match("fooexample.com", &domains), None);
        assert_eq!(find_match("example.com", &domains), None);
        assert_eq!(
            find_match("foo.example.com", &domains),
            Some(DomainSuffix::new("example.com"))
        );
    }

    #[test]
    fn leading_dot_is_kept() {
        let domains = [".corp.example.com"];
        assert_eq!(
            find_match("a.corp.example.com", &domains)
                .as_ref()
                .map(DomainSuffix::as_str),
            Some(".corp.example.com")
        );
    }

    #[test]
    fn no_match() {
        assert_eq!(find_match("foo.example.org", &["example.com"]), None);
        assert_eq!(find_match::<&str>("foo.example.org", &[]), None);
        assert_eq!(find_match("", &["example.com"]), None);
    }

    #[test]
    fn equal_length_ties_go_to_first_configured() {
        // Both suffixes have the same length and both match.
        let domains = MatchDomains::from_iter([".b.example.com", "b.example.com"]);
        assert_eq!(
            domains.find("a.b.example.com"),
            Some(&DomainSuffix::new(".b.example.com"))
        );

        let domains = MatchDomains::from_iter(["aa.io", "bb.io"]);
        assert_eq!(
            domains.iter().map(DomainSuffix::as_str).collect::<Vec<_>>(),
            vec![".aa.io", ".bb.io"]
        );
    }

    #[test]
    fn longest_qualifying_domain_is_returned() {
        let domains = ["io", "c.io", "b.c.io", "x.b.c.io", "q.io"];
        for (host, expected) in [
            ("a.b.c.io", Some(".b.c.io")),
            ("a.c.io", Some(".c.io")),
            ("a.io", Some(".io")),
            ("a.x.b.c.io", Some(".x.b.c.io")),
            ("a.com", None),
        ] {
            assert_eq!(
                find_match(host, &domains).as_ref().map(DomainSuffix::as_str),
                expected,
                "{host}"
            );
        }
    }

    #[test]
    fn matches_any_short_circuits() {
        let domains = ["example.com"];
        assert!(matches_any(&["foo.example.org", "a.example.com"], &domains));
        assert!(!matches_any(&["foo.example.org", ""], &domains));
        assert!(!matches_any::<&str, _>(&[], &domains));
    }
}
