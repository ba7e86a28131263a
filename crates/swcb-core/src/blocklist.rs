//! The user's blocklist: a sorted, unique set of domain entries.

use crate::config::{self, ConfigStore, BLOCKLIST_KEY};
use crate::domain::{normalize_domain, DomainEntry, DomainError};
use crate::matcher;
use crate::platform::PlatformResult;

/// Result of adding a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added(DomainEntry),
    AlreadyPresent(DomainEntry),
}

/// Result of toggling the current site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added(DomainEntry),
    Removed(DomainEntry),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blocklist {
    entries: Vec<DomainEntry>,
}

impl Blocklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stored strings, dropping any that no longer validate.
    pub fn from_stored<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::new();
        for value in raw {
            let value = value.as_ref();
            match DomainEntry::parse(value) {
                Ok(entry) => list.insert(entry),
                Err(e) => log::warn!("Dropping stored blocklist entry '{}': {}", value, e),
            }
        }
        list
    }

    pub fn entries(&self) -> &[DomainEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.position(entry).is_ok()
    }

    fn position(&self, entry: &str) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| e.as_str().cmp(entry))
    }

    /// Insert keeping sort order. No-op if present.
    pub fn insert(&mut self, entry: DomainEntry) {
        if let Err(idx) = self.position(entry.as_str()) {
            self.entries.insert(idx, entry);
        }
    }

    /// Normalize, validate and insert user input.
    pub fn add(&mut self, raw: &str) -> Result<AddOutcome, DomainError> {
        let entry = DomainEntry::parse(raw)?;
        match self.position(entry.as_str()) {
            Ok(_) => Ok(AddOutcome::AlreadyPresent(entry)),
            Err(idx) => {
                self.entries.insert(idx, entry.clone());
                Ok(AddOutcome::Added(entry))
            }
        }
    }

    /// Remove an entry by its stored string.
    pub fn remove(&mut self, entry: &str) -> bool {
        match self.position(entry) {
            Ok(idx) => {
                self.entries.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    /// First entry that blocks `hostname`.
    pub fn find_match(&self, hostname: &str) -> Option<&DomainEntry> {
        matcher::find_match(hostname, &self.entries)
    }

    pub fn is_blocked(&self, hostname: &str) -> bool {
        self.find_match(hostname).is_some()
    }

    /// Block the host if it is not blocked, otherwise remove the entry that blocks it.
    pub fn toggle_host(&mut self, hostname: &str) -> Result<ToggleOutcome, DomainError> {
        if let Some(entry) = self.find_match(hostname).cloned() {
            self.remove(entry.as_str());
            return Ok(ToggleOutcome::Removed(entry));
        }
        match self.add(&normalize_domain(hostname))? {
            AddOutcome::Added(entry) | AddOutcome::AlreadyPresent(entry) => Ok(ToggleOutcome::Added(entry)),
        }
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.as_str().to_string()).collect()
    }
}

impl<'a> IntoIterator for &'a Blocklist {
    type Item = &'a DomainEntry;
    type IntoIter = std::slice::Iter<'a, DomainEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// =============================================================================
// Persistence
// =============================================================================

/// Loads and saves the blocklist through a [`ConfigStore`].
pub struct BlocklistStore<'s, S: ConfigStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: ConfigStore + ?Sized> BlocklistStore<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    pub async fn load(&self) -> PlatformResult<Blocklist> {
        let raw: Vec<String> = config::load_list(self.store, BLOCKLIST_KEY).await?;
        Ok(Blocklist::from_stored(raw))
    }

    pub async fn save(&self, list: &Blocklist) -> PlatformResult<()> {
        config::save(self.store, BLOCKLIST_KEY, &list.to_strings()).await
    }

    /// Load, add, save. Saves only when the list changed.
    pub async fn add(&self, raw: &str) -> Result<AddOutcome, BlocklistError> {
        let mut list = self.load().await?;
        let outcome = list.add(raw)?;
        if let AddOutcome::Added(_) = outcome {
            self.save(&list).await?;
        }
        Ok(outcome)
    }

    pub async fn remove(&self, entry: &str) -> PlatformResult<bool> {
        let mut list = self.load().await?;
        let removed = list.remove(entry);
        if removed {
            self.save(&list).await?;
        }
        Ok(removed)
    }

    pub async fn toggle_host(&self, hostname: &str) -> Result<ToggleOutcome, BlocklistError> {
        let mut list = self.load().await?;
        let outcome = list.toggle_host(hostname)?;
        self.save(&list).await?;
        Ok(outcome)
    }
}

/// Failure of a persisted blocklist mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlocklistError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Platform(#[from] crate::platform::PlatformError),
}
