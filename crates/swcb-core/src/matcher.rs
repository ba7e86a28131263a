//! Hostname ↔ domain entry matching
//!
//! Pure and total over string inputs. The hostname loses a leading `www.`
//! before comparison; the entry never does. Exact entries also match every
//! subdomain, so `example.com` and `*.example.com` select the same hosts.

use crate::domain::{base_domain, DomainEntry};

/// Strip a single leading `www.` label from a hostname.
#[inline]
pub fn strip_www(hostname: &str) -> &str {
    hostname.strip_prefix("www.").unwrap_or(hostname)
}

/// `host == base` or `host` ends with `.base`.
#[inline]
fn is_same_or_subdomain(host: &str, base: &str) -> bool {
    if host.len() == base.len() {
        return host == base;
    }
    host.len() > base.len()
        && host.ends_with(base)
        && host.as_bytes()[host.len() - base.len() - 1] == b'.'
}

/// Does `hostname` fall under `entry`?
pub fn matches(hostname: &str, entry: &str) -> bool {
    is_same_or_subdomain(strip_www(hostname), base_domain(entry))
}

/// Does `hostname` fall under any of `entries`?
pub fn matches_any<I, S>(hostname: &str, entries: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    find_match(hostname, entries).is_some()
}

/// First entry that matches `hostname`.
pub fn find_match<I, S>(hostname: &str, entries: I) -> Option<S>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .find(|entry| matches(hostname, entry.as_ref()))
}

impl DomainEntry {
    pub fn matches(&self, hostname: &str) -> bool {
        matches(hostname, self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_entry_matches_self_and_subdomains() {
        assert!(matches("example.com", "example.com"));
        assert!(matches("app.example.com", "example.com"));
        assert!(matches("a.b.example.com", "example.com"));
        assert!(!matches("notexample.com", "example.com"));
        assert!(!matches("example.com.evil.net", "example.com"));
        assert!(!matches("com", "example.com"));
    }

    #[test]
    fn test_wildcard_entry() {
        assert!(matches("example.com", "*.example.com"));
        assert!(matches("x.example.com", "*.example.com"));
        assert!(!matches("badexample.com", "*.example.com"));
    }

    #[test]
    fn test_hostname_www_is_stripped() {
        assert!(matches("www.example.com", "example.com"));
        assert!(matches("www.example.com", "*.example.com"));
        // Only one leading label is stripped.
        assert!(matches("www.www.example.com", "example.com"));
    }

    #[test]
    fn test_entry_www_is_never_stripped() {
        assert!(!matches("example.com", "www.example.com"));
        assert!(!matches("www.example.com", "*.www.example.com"));
        assert!(matches("www.www.example.com", "*.www.example.com"));
    }

    #[test]
    fn test_matches_any_and_find_match() {
        let entries = ["feishu.cn", "*.larksuite.com"];
        assert!(matches_any("docs.feishu.cn", entries));
        assert!(matches_any("www.larksuite.com", entries));
        assert!(!matches_any("example.org", entries));
        assert_eq!(find_match("open.larksuite.com", entries), Some("*.larksuite.com"));

        let empty: [&str; 0] = [];
        assert!(!matches_any("example.com", empty));
    }

    #[test]
    fn test_domain_entry_matches() {
        let entry = DomainEntry::parse("example.com").unwrap();
        assert!(entry.matches("app.example.com"));
        assert!(!entry.matches("example.org"));
    }
}
