//! Presets: named bundles of domain entries toggled as a unit.
//!
//! Built-in presets ship with the extension and cannot change. Custom
//! presets live in the store under generated `custom-<n>` ids and can be
//! created or deleted, but not renamed.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::blocklist::{Blocklist, BlocklistStore};
use crate::config::{self, ConfigStore, CUSTOM_PRESETS_KEY, ENABLED_PRESETS_KEY};
use crate::domain::{DomainEntry, DomainError};
use crate::platform::{PlatformError, PlatformResult};

const CUSTOM_ID_PREFIX: &str = "custom-";

/// A compiled-in preset.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinPreset {
    pub id: &'static str,
    pub name: &'static str,
    pub domains: &'static [&'static str],
}

pub const BUILTIN_PRESETS: &[BuiltinPreset] = &[
    BuiltinPreset {
        id: "feishu",
        name: "Feishu / Lark",
        domains: &["*.feishu.cn", "*.larksuite.com", "*.larkoffice.com"],
    },
    BuiltinPreset {
        id: "notion",
        name: "Notion",
        domains: &["notion.so", "notion.site"],
    },
    BuiltinPreset {
        id: "figma",
        name: "Figma",
        domains: &["figma.com"],
    },
];

pub fn builtin(id: &str) -> Option<&'static BuiltinPreset> {
    BUILTIN_PRESETS.iter().find(|p| p.id == id)
}

/// A user-created preset as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomPreset {
    pub name: String,
    pub domains: Vec<DomainEntry>,
}

/// Stored form read back leniently: domains are validated one at a time.
#[derive(Deserialize)]
struct StoredPreset {
    name: String,
    #[serde(default)]
    domains: Vec<Value>,
}

impl StoredPreset {
    fn into_preset(self, id: &str) -> CustomPreset {
        let mut domains = Vec::with_capacity(self.domains.len());
        for raw in self.domains {
            match raw.as_str().map(DomainEntry::parse) {
                Some(Ok(entry)) => domains.push(entry),
                Some(Err(e)) => log::warn!("Dropping entry {} from preset {}: {}", raw, id, e),
                None => log::warn!("Dropping non-string entry {} from preset {}", raw, id),
            }
        }
        CustomPreset {
            name: self.name,
            domains,
        }
    }
}

/// A preset as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct PresetView {
    pub id: String,
    pub name: String,
    pub domains: Vec<String>,
    pub builtin: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PresetError {
    #[error("Preset name is empty")]
    EmptyName,
    #[error("Preset has no domains")]
    NoDomains,
    #[error("Unknown preset: {0}")]
    Unknown(String),
    #[error("Built-in preset cannot be deleted: {0}")]
    Builtin(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Next unused custom id: one past the highest numeric suffix.
fn next_custom_id(existing: &BTreeMap<String, CustomPreset>) -> String {
    let next = existing
        .keys()
        .filter_map(|id| id.strip_prefix(CUSTOM_ID_PREFIX))
        .filter_map(|n| n.parse::<u64>().ok())
        .max()
        .map_or(1, |n| n + 1);
    format!("{}{}", CUSTOM_ID_PREFIX, next)
}

/// Preset persistence over a [`ConfigStore`].
pub struct PresetStore<'s, S: ConfigStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: ConfigStore + ?Sized> PresetStore<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    async fn custom(&self) -> PlatformResult<BTreeMap<String, CustomPreset>> {
        let stored: BTreeMap<String, StoredPreset> = config::load_map(self.store, CUSTOM_PRESETS_KEY).await?;
        Ok(stored
            .into_iter()
            .map(|(id, preset)| {
                let preset = preset.into_preset(&id);
                (id, preset)
            })
            .collect())
    }

    async fn enabled(&self) -> PlatformResult<BTreeSet<String>> {
        let ids: Vec<String> = config::load_list(self.store, ENABLED_PRESETS_KEY).await?;
        Ok(ids.into_iter().collect())
    }

    /// Built-ins first, then custom presets by id.
    pub async fn list(&self) -> PlatformResult<Vec<PresetView>> {
        let custom = self.custom().await?;
        let enabled = self.enabled().await?;

        let mut views: Vec<PresetView> = BUILTIN_PRESETS
            .iter()
            .map(|p| PresetView {
                id: p.id.to_string(),
                name: p.name.to_string(),
                domains: p.domains.iter().map(|d| d.to_string()).collect(),
                builtin: true,
                enabled: enabled.contains(p.id),
            })
            .collect();

        views.extend(custom.into_iter().map(|(id, preset)| PresetView {
            enabled: enabled.contains(&id),
            name: preset.name,
            domains: preset.domains.into_iter().map(String::from).collect(),
            builtin: false,
            id,
        }));

        Ok(views)
    }

    /// Create a custom preset and return its id.
    pub async fn create<I, T>(&self, name: &str, domains: I) -> Result<String, PresetError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let name = name.trim();
        if name.is_empty() {
            return Err(PresetError::EmptyName);
        }

        let mut entries = Blocklist::new();
        for raw in domains {
            entries.insert(DomainEntry::parse(raw.as_ref())?);
        }
        if entries.is_empty() {
            return Err(PresetError::NoDomains);
        }

        let mut custom = self.custom().await?;
        let id = next_custom_id(&custom);
        custom.insert(
            id.clone(),
            CustomPreset {
                name: name.to_string(),
                domains: entries.entries().to_vec(),
            },
        );
        config::save(self.store, CUSTOM_PRESETS_KEY, &custom).await?;
        log::info!("Created preset {} ({})", id, name);
        Ok(id)
    }

    /// Delete a custom preset; it is also disabled.
    pub async fn delete(&self, id: &str) -> Result<(), PresetError> {
        if builtin(id).is_some() {
            return Err(PresetError::Builtin(id.to_string()));
        }
        let mut custom = self.custom().await?;
        if custom.remove(id).is_none() {
            return Err(PresetError::Unknown(id.to_string()));
        }
        config::save(self.store, CUSTOM_PRESETS_KEY, &custom).await?;

        let mut enabled = self.enabled().await?;
        if enabled.remove(id) {
            config::save(self.store, ENABLED_PRESETS_KEY, &enabled).await?;
        }
        Ok(())
    }

    pub async fn set_enabled(&self, id: &str, on: bool) -> Result<(), PresetError> {
        if builtin(id).is_none() && !self.custom().await?.contains_key(id) {
            return Err(PresetError::Unknown(id.to_string()));
        }
        let mut enabled = self.enabled().await?;
        let changed = if on {
            enabled.insert(id.to_string())
        } else {
            enabled.remove(id)
        };
        if changed {
            config::save(self.store, ENABLED_PRESETS_KEY, &enabled).await?;
        }
        Ok(())
    }

    /// Entries contributed by every enabled preset.
    pub async fn enabled_entries(&self) -> PlatformResult<Blocklist> {
        let enabled = self.enabled().await?;
        let custom = self.custom().await?;

        let mut entries = Blocklist::new();
        for id in &enabled {
            if let Some(preset) = builtin(id) {
                for raw in preset.domains {
                    match DomainEntry::parse(raw) {
                        Ok(entry) => entries.insert(entry),
                        Err(e) => log::warn!("Built-in preset {} has bad entry: {}", id, e),
                    }
                }
            } else if let Some(preset) = custom.get(id) {
                for entry in &preset.domains {
                    entries.insert(entry.clone());
                }
            } else {
                log::debug!("Enabled preset {} no longer exists", id);
            }
        }
        Ok(entries)
    }
}

/// The blocklist plus every enabled preset's entries.
pub async fn effective_blocklist<S: ConfigStore + ?Sized>(store: &S) -> PlatformResult<Blocklist> {
    let mut list = BlocklistStore::new(store).load().await?;
    for entry in PresetStore::new(store).enabled_entries().await?.entries() {
        list.insert(entry.clone());
    }
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStore;

    #[test]
    fn test_builtin_presets_are_valid() {
        for preset in BUILTIN_PRESETS {
            assert!(!preset.domains.is_empty(), "{} is empty", preset.id);
            for raw in preset.domains {
                let entry = DomainEntry::parse(raw).unwrap();
                assert_eq!(entry.as_str(), *raw, "{} is not normalized", raw);
            }
        }
    }

    #[test]
    fn test_next_custom_id() {
        let mut existing = BTreeMap::new();
        assert_eq!(next_custom_id(&existing), "custom-1");
        let preset = CustomPreset { name: "x".into(), domains: vec![] };
        existing.insert("custom-1".to_string(), preset.clone());
        existing.insert("custom-7".to_string(), preset);
        assert_eq!(next_custom_id(&existing), "custom-8");
    }

    #[tokio::test]
    async fn test_create_list_delete() {
        let store = MemoryStore::new();
        let presets = PresetStore::new(&store);

        let id = presets.create(" Work ", ["intranet.corp.com", "*.wiki.corp.com"]).await.unwrap();
        assert_eq!(id, "custom-1");
        presets.set_enabled(&id, true).await.unwrap();

        let views = presets.list().await.unwrap();
        let view = views.iter().find(|v| v.id == id).unwrap();
        assert_eq!(view.name, "Work");
        assert!(view.enabled);
        assert!(!view.builtin);
        assert_eq!(view.domains, vec!["*.wiki.corp.com", "intranet.corp.com"]);

        presets.delete(&id).await.unwrap();
        assert!(presets.list().await.unwrap().iter().all(|v| v.id != id));
        assert_eq!(store.snapshot(ENABLED_PRESETS_KEY), Some(serde_json::json!([])));
    }

    #[tokio::test]
    async fn test_create_validates() {
        let store = MemoryStore::new();
        let presets = PresetStore::new(&store);
        assert_eq!(presets.create("  ", ["a.com"]).await, Err(PresetError::EmptyName));
        assert_eq!(presets.create("x", Vec::<String>::new()).await, Err(PresetError::NoDomains));
        assert!(matches!(presets.create("x", ["bad"]).await, Err(PresetError::Domain(_))));
    }

    #[tokio::test]
    async fn test_builtins_cannot_be_deleted() {
        let store = MemoryStore::new();
        let presets = PresetStore::new(&store);
        assert_eq!(presets.delete("notion").await, Err(PresetError::Builtin("notion".into())));
        assert_eq!(presets.delete("custom-9").await, Err(PresetError::Unknown("custom-9".into())));
        assert_eq!(presets.set_enabled("nope", true).await, Err(PresetError::Unknown("nope".into())));
    }

    #[tokio::test]
    async fn test_create_keeps_presets_around_bad_values() {
        let store = MemoryStore::new();
        store
            .set(
                CUSTOM_PRESETS_KEY,
                serde_json::json!({
                    "custom-1": {"name": "Work", "domains": ["work.com", "intranet.work.com"]},
                    "custom-2": {"name": "Old", "domains": ["legacy_host", 7]},
                    "custom-3": "garbage",
                }),
            )
            .await
            .unwrap();
        store
            .set(ENABLED_PRESETS_KEY, serde_json::json!(["custom-1", 5]))
            .await
            .unwrap();
        let presets = PresetStore::new(&store);

        let id = presets.create("New", ["new.com"]).await.unwrap();
        assert_eq!(id, "custom-3");

        let stored = store.snapshot(CUSTOM_PRESETS_KEY).unwrap();
        assert_eq!(
            stored["custom-1"],
            serde_json::json!({"name": "Work", "domains": ["work.com", "intranet.work.com"]})
        );
        assert_eq!(stored["custom-2"], serde_json::json!({"name": "Old", "domains": []}));
        assert_eq!(stored["custom-3"], serde_json::json!({"name": "New", "domains": ["new.com"]}));

        let list = effective_blocklist(&store).await.unwrap();
        assert_eq!(list.to_strings(), vec!["intranet.work.com", "work.com"]);
    }

    #[tokio::test]
    async fn test_effective_blocklist_unions_enabled_presets() {
        let store = MemoryStore::new();
        BlocklistStore::new(&store).add("example.com").await.unwrap();
        let presets = PresetStore::new(&store);
        presets.set_enabled("notion", true).await.unwrap();

        let list = effective_blocklist(&store).await.unwrap();
        assert_eq!(list.to_strings(), vec!["example.com", "notion.site", "notion.so"]);

        presets.set_enabled("notion", false).await.unwrap();
        let list = effective_blocklist(&store).await.unwrap();
        assert_eq!(list.to_strings(), vec!["example.com"]);
    }
}
