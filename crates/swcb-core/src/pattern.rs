//! Domain entry → extension match patterns
//!
//! Content-script registration takes explicit `scheme://host/path` match
//! patterns and cannot do suffix matching, so an exact entry needs one
//! pattern for the bare domain and one for its subdomains.

use std::collections::BTreeSet;

use crate::domain::is_wildcard;

/// `*.example.com` → `[*://*.example.com/*]`;
/// `example.com` → `[*://example.com/*, *://*.example.com/*]`.
pub fn to_patterns(entry: &str) -> Vec<String> {
    if is_wildcard(entry) {
        vec![format!("*://{}/*", entry)]
    } else {
        vec![format!("*://{}/*", entry), format!("*://*.{}/*", entry)]
    }
}

/// Patterns for a whole blocklist, deduplicated in first-seen order.
pub fn compile_patterns<I, S>(entries: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = BTreeSet::new();
    let mut patterns = Vec::new();
    for entry in entries {
        for pattern in to_patterns(entry.as_ref()) {
            if seen.insert(pattern.clone()) {
                patterns.push(pattern);
            }
        }
    }
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_yields_one_pattern() {
        assert_eq!(to_patterns("*.example.com"), vec!["*://*.example.com/*"]);
    }

    #[test]
    fn test_exact_yields_two_patterns() {
        let patterns = to_patterns("example.com");
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0], "*://example.com/*");
        assert_eq!(patterns[1], "*://*.example.com/*");
    }

    #[test]
    fn test_compile_patterns_dedupes_overlap() {
        let patterns = compile_patterns(["example.com", "*.example.com", "feishu.cn"]);
        assert_eq!(
            patterns,
            vec![
                "*://example.com/*",
                "*://*.example.com/*",
                "*://feishu.cn/*",
                "*://*.feishu.cn/*",
            ]
        );
    }

    #[test]
    fn test_compile_empty() {
        let empty: [&str; 0] = [];
        assert!(compile_patterns(empty).is_empty());
    }
}
