//! `chrome.storage.sync` as a [`ConfigStore`].

use async_trait::async_trait;
use js_sys::{Function, Object, Promise, Reflect};
use serde_json::{Map, Value};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use swcb_core::config::{ConfigChange, ConfigStore};
use swcb_core::platform::{PlatformError, PlatformResult, Subscription};

use crate::chrome::{call, describe, from_js, to_js};

const SYNC_AREA: &str = "sync";

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "sync"], js_name = get)]
    fn sync_get(keys: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "sync"], js_name = set)]
    fn sync_set(items: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "onChanged"], js_name = addListener)]
    fn on_changed_add(callback: &Function);

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "onChanged"], js_name = removeListener)]
    fn on_changed_remove(callback: &Function);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SyncStore;

#[async_trait(?Send)]
impl ConfigStore for SyncStore {
    async fn get(&self, key: &str) -> PlatformResult<Option<Value>> {
        let items = call("storage.get", sync_get(&JsValue::from_str(key))).await?;
        let value = Reflect::get(&items, &JsValue::from_str(key))
            .map_err(|e| PlatformError::new("storage.get", describe(&e)))?;
        Ok(from_js(&value))
    }

    async fn set(&self, key: &str, value: Value) -> PlatformResult<()> {
        let mut items = Map::new();
        items.insert(key.to_string(), value);
        let items = to_js(&Value::Object(items)).map_err(|e| PlatformError::new("storage.set", describe(&e)))?;
        call("storage.set", sync_set(&items)).await.map(drop)
    }

    fn subscribe(&self, listener: Box<dyn Fn(&ConfigChange)>) -> Subscription {
        let callback = Closure::<dyn FnMut(JsValue, JsValue)>::new(move |changes: JsValue, area: JsValue| {
            if area.as_string().as_deref() != Some(SYNC_AREA) {
                return;
            }
            let keys = match changes.dyn_ref::<Object>() {
                Some(changes) => Object::keys(changes)
                    .iter()
                    .filter_map(|key| key.as_string())
                    .collect(),
                None => return,
            };
            listener(&ConfigChange { keys });
        });
        let function: Function = callback.as_ref().unchecked_ref::<Function>().clone();
        on_changed_add(&function);
        Subscription::new(move || {
            on_changed_remove(&function);
            drop(callback);
        })
    }
}
