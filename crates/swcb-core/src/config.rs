//! Configuration: the persisted key-value store and runtime settings.
//!
//! The store is an injected dependency. In the extension it is
//! `chrome.storage.sync`; tests and the CLI use [`MemoryStore`].

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::platform::{PlatformError, PlatformResult, Subscription};

// =============================================================================
// Storage Keys
// =============================================================================

/// Sorted array of domain entry strings.
pub const BLOCKLIST_KEY: &str = "blacklist";
/// Object keyed by preset id: `{ name, domains }`.
pub const CUSTOM_PRESETS_KEY: &str = "customPresets";
/// Array of preset ids (built-in or custom).
pub const ENABLED_PRESETS_KEY: &str = "enabledPresets";

/// Keys whose change affects the set of blocked domains.
pub const BLOCKING_KEYS: [&str; 3] = [BLOCKLIST_KEY, CUSTOM_PRESETS_KEY, ENABLED_PRESETS_KEY];

// =============================================================================
// Store
// =============================================================================

/// Keys changed by one store write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    pub keys: Vec<String>,
}

impl ConfigChange {
    pub fn touches(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    pub fn touches_any(&self, keys: &[&str]) -> bool {
        keys.iter().any(|key| self.touches(key))
    }
}

/// Persistent configuration mapping with change notification.
#[async_trait(?Send)]
pub trait ConfigStore {
    async fn get(&self, key: &str) -> PlatformResult<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> PlatformResult<()>;

    fn subscribe(&self, listener: Box<dyn Fn(&ConfigChange)>) -> Subscription;
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Read `key` as an array, decoding each element on its own.
///
/// Elements that fail to decode are dropped with a warning and the rest
/// are kept. A missing key or a non-array value reads as empty.
pub async fn load_list<S, T>(store: &S, key: &str) -> PlatformResult<Vec<T>>
where
    S: ConfigStore + ?Sized,
    T: DeserializeOwned,
{
    let items = match store.get(key).await? {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            log::warn!("Ignoring '{}' in store: expected an array, found {}", key, json_kind(&other));
            return Ok(Vec::new());
        }
    };

    let mut decoded = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value(item) {
            Ok(value) => decoded.push(value),
            Err(e) => log::warn!("Dropping '{}'[{}] from store: {}", key, index, e),
        }
    }
    Ok(decoded)
}

/// Read `key` as an object, decoding each member on its own.
///
/// Same recovery rules as [`load_list`].
pub async fn load_map<S, T>(store: &S, key: &str) -> PlatformResult<BTreeMap<String, T>>
where
    S: ConfigStore + ?Sized,
    T: DeserializeOwned,
{
    let members = match store.get(key).await? {
        None | Some(Value::Null) => return Ok(BTreeMap::new()),
        Some(Value::Object(members)) => members,
        Some(other) => {
            log::warn!("Ignoring '{}' in store: expected an object, found {}", key, json_kind(&other));
            return Ok(BTreeMap::new());
        }
    };

    let mut decoded = BTreeMap::new();
    for (name, member) in members {
        match serde_json::from_value(member) {
            Ok(value) => {
                decoded.insert(name, value);
            }
            Err(e) => log::warn!("Dropping '{}.{}' from store: {}", key, name, e),
        }
    }
    Ok(decoded)
}

/// Encode and write `value` under `key`.
pub async fn save<S, T>(store: &S, key: &str, value: &T) -> PlatformResult<()>
where
    S: ConfigStore + ?Sized,
    T: Serialize + ?Sized,
{
    let encoded = serde_json::to_value(value)
        .map_err(|e| PlatformError::new("storage.set", format!("encode '{}': {}", key, e)))?;
    store.set(key, encoded).await
}

// =============================================================================
// In-memory Store
// =============================================================================

type Listener = Rc<dyn Fn(&ConfigChange)>;

#[derive(Default)]
struct MemoryInner {
    values: BTreeMap<String, Value>,
    listeners: BTreeMap<u64, Listener>,
    next_listener: u64,
}

/// Single-threaded in-memory [`ConfigStore`]. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `key` without going through the async API.
    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.inner.borrow().values.get(key).cloned()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }
}

#[async_trait(?Send)]
impl ConfigStore for MemoryStore {
    async fn get(&self, key: &str) -> PlatformResult<Option<Value>> {
        Ok(self.snapshot(key))
    }

    async fn set(&self, key: &str, value: Value) -> PlatformResult<()> {
        let listeners: Vec<Listener> = {
            let mut inner = self.inner.borrow_mut();
            inner.values.insert(key.to_string(), value);
            inner.listeners.values().cloned().collect()
        };
        let change = ConfigChange {
            keys: vec![key.to_string()],
        };
        for listener in listeners {
            listener(&change);
        }
        Ok(())
    }

    fn subscribe(&self, listener: Box<dyn Fn(&ConfigChange)>) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_listener;
            inner.next_listener += 1;
            inner.listeners.insert(id, Rc::from(listener));
            id
        };
        let weak: Weak<RefCell<MemoryInner>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().listeners.remove(&id);
            }
        })
    }
}

// =============================================================================
// Runtime Settings
// =============================================================================

/// Tunables, overridable from the extension's `init` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// How long to wait for a temporary context to finish loading.
    pub load_timeout_ms: u64,
    /// Scheme used for fallback tabs and synthesized origins.
    pub secure_scheme: String,
    /// Id of the registered content script.
    pub script_id: String,
    /// Extension-relative path of the blocking shim.
    pub shim_file: String,
    /// Extension-relative path of the isolated-world probe bundle.
    pub probe_file: String,
    pub badge_color: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            load_timeout_ms: 10_000,
            secure_scheme: "https".to_string(),
            script_id: "sw-cache-blocker-inject".to_string(),
            shim_file: "inject.js".to_string(),
            probe_file: "probe.js".to_string(),
            badge_color: "#e74c3c".to_string(),
        }
    }
}

impl Settings {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.load_timeout(), Duration::from_secs(10));
        assert_eq!(settings.secure_scheme, "https");
        assert_eq!(settings.script_id, "sw-cache-blocker-inject");
    }

    #[test]
    fn test_settings_partial_override() {
        let settings: Settings = serde_json::from_str(r#"{"loadTimeoutMs": 2500}"#).unwrap();
        assert_eq!(settings.load_timeout_ms, 2500);
        assert_eq!(settings.shim_file, "inject.js");
    }

    #[test]
    fn test_change_touches() {
        let change = ConfigChange { keys: vec!["blacklist".into()] };
        assert!(change.touches(BLOCKLIST_KEY));
        assert!(change.touches_any(&BLOCKING_KEYS));
        assert!(!change.touches("theme"));
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip_and_notify() {
        let store = MemoryStore::new();
        let seen = Rc::new(Cell::new(0));
        let sub = {
            let seen = seen.clone();
            store.subscribe(Box::new(move |change| {
                assert!(change.touches(BLOCKLIST_KEY));
                seen.set(seen.get() + 1);
            }))
        };

        save(&store, BLOCKLIST_KEY, &["example.com"]).await.unwrap();
        let list: Vec<String> = load_list(&store, BLOCKLIST_KEY).await.unwrap();
        assert_eq!(list, vec!["example.com"]);
        assert_eq!(seen.get(), 1);

        drop(sub);
        assert_eq!(store.listener_count(), 0);
        save(&store, BLOCKLIST_KEY, &Vec::<String>::new()).await.unwrap();
        assert_eq!(seen.get(), 1);
    }

    #[tokio::test]
    async fn test_load_list_keeps_good_elements() {
        let store = MemoryStore::new();
        store
            .set(BLOCKLIST_KEY, serde_json::json!(["a.com", 42, null, "b.com", {"x": 1}]))
            .await
            .unwrap();
        let list: Vec<String> = load_list(&store, BLOCKLIST_KEY).await.unwrap();
        assert_eq!(list, vec!["a.com", "b.com"]);

        store.set(BLOCKLIST_KEY, serde_json::json!({"not": "a list"})).await.unwrap();
        let list: Vec<String> = load_list(&store, BLOCKLIST_KEY).await.unwrap();
        assert!(list.is_empty());

        let missing: Vec<String> = load_list(&store, "absent").await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_load_map_keeps_good_members() {
        let store = MemoryStore::new();
        store
            .set("counts", serde_json::json!({"a": 1, "b": "two", "c": 3}))
            .await
            .unwrap();
        let counts: BTreeMap<String, u32> = load_map(&store, "counts").await.unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts.get("a"), Some(&1));
        assert_eq!(counts.get("c"), Some(&3));

        store.set("counts", serde_json::json!([1, 2])).await.unwrap();
        let counts: BTreeMap<String, u32> = load_map(&store, "counts").await.unwrap();
        assert!(counts.is_empty());
    }
}
