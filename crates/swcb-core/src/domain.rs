//! Domain entries: normalization and validation at the configuration boundary.
//!
//! An entry is either an exact registrable domain (`example.com`) or a
//! wildcard-subdomain pattern (`*.example.com`). Entries are stored lowercase
//! with no scheme, path or port.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Marker that prefixes wildcard-subdomain entries.
pub const WILDCARD_PREFIX: &str = "*.";

/// Validation failure for a user-supplied domain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Empty domain")]
    Empty,
    #[error("Invalid domain: {0}")]
    Invalid(String),
}

/// A normalized, validated blocklist entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DomainEntry(String);

impl DomainEntry {
    /// Normalize then validate raw user input.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let normalized = normalize_domain(raw);
        if normalized.is_empty() {
            return Err(DomainError::Empty);
        }
        if !is_valid_domain(&normalized) {
            return Err(DomainError::Invalid(normalized));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        is_wildcard(&self.0)
    }

    /// The domain without the wildcard marker.
    pub fn base(&self) -> &str {
        base_domain(&self.0)
    }
}

impl TryFrom<String> for DomainEntry {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DomainEntry> for String {
    fn from(entry: DomainEntry) -> Self {
        entry.0
    }
}

impl AsRef<str> for DomainEntry {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[inline]
pub fn is_wildcard(entry: &str) -> bool {
    entry.starts_with(WILDCARD_PREFIX)
}

#[inline]
pub fn base_domain(entry: &str) -> &str {
    entry.strip_prefix(WILDCARD_PREFIX).unwrap_or(entry)
}

// =============================================================================
// Normalization
// =============================================================================

/// Reduce free-form input to a bare domain.
///
/// `EXAMPLE.com/path?x=1:8080` → `example.com`, `https://www.a.com:8443/` → `a.com`.
pub fn normalize_domain(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    let mut d = lowered.as_str();

    for scheme in ["https://", "http://"] {
        if let Some(rest) = d.strip_prefix(scheme) {
            d = rest;
            break;
        }
    }

    if let Some(slash) = d.find('/') {
        d = &d[..slash];
    }

    if let Some(colon) = d.rfind(':') {
        let port = &d[colon + 1..];
        if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
            d = &d[..colon];
        }
    }

    if !is_wildcard(d) {
        if let Some(rest) = d.strip_prefix("www.") {
            d = rest;
        }
    }

    d.to_string()
}

// =============================================================================
// Validation
// =============================================================================

/// Check a normalized entry: two or more LDH labels, optionally behind `*.`.
pub fn is_valid_domain(d: &str) -> bool {
    let host = base_domain(d);
    let mut labels = 0usize;
    for label in host.split('.') {
        if !is_valid_label(label) {
            return false;
        }
        labels += 1;
    }
    labels >= 2
}

fn is_valid_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    let (first, last) = match (bytes.first(), bytes.last()) {
        (Some(&f), Some(&l)) => (f, l),
        _ => return false,
    };
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    alnum(first) && alnum(last) && bytes.iter().all(|&b| alnum(b) || b == b'-')
}
