//! `chrome.*` extension API bindings and the host capability implementations.

use std::time::Duration;

use async_trait::async_trait;
use js_sys::{Array, Function, Promise, Reflect};
use serde_json::{json, Value};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use swcb_core::platform::{
    BadgeIndicator, BrowsingDataRemover, ContextEnumerator, ContextLifecycle, InjectionRegistry,
    PlatformError, PlatformResult, ScriptExecutor, Subscription, Timer,
};
use swcb_core::types::{
    Badge, BrowsingContext, ContextId, DataCategories, ExecutionWorld, FrameProbeResult, InjectionRule,
    RemovalScope,
};

// =============================================================================
// Bindings
// =============================================================================

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = query)]
    fn tabs_query(query_info: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = create)]
    fn tabs_create(properties: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = reload)]
    fn tabs_reload(tab_id: i32) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = remove)]
    fn tabs_remove(tab_id: i32) -> Result<Promise, JsValue>;

    #[wasm_bindgen(js_namespace = ["chrome", "tabs", "onUpdated"], js_name = addListener)]
    fn tabs_on_updated_add(callback: &Function);

    #[wasm_bindgen(js_namespace = ["chrome", "tabs", "onUpdated"], js_name = removeListener)]
    fn tabs_on_updated_remove(callback: &Function);

    #[wasm_bindgen(catch, js_namespace = ["chrome", "scripting"], js_name = executeScript)]
    fn scripting_execute(injection: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "scripting"], js_name = registerContentScripts)]
    fn scripting_register(scripts: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "scripting"], js_name = unregisterContentScripts)]
    fn scripting_unregister(filter: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "browsingData"], js_name = remove)]
    fn browsing_data_remove(options: &JsValue, data_to_remove: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "action"], js_name = setBadgeText)]
    fn action_set_badge_text(details: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "action"], js_name = setBadgeBackgroundColor)]
    fn action_set_badge_color(details: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(js_namespace = ["chrome", "runtime", "onInstalled"], js_name = addListener)]
    pub(crate) fn runtime_on_installed_add(callback: &Function);

    #[wasm_bindgen(js_namespace = ["chrome", "runtime", "onStartup"], js_name = addListener)]
    pub(crate) fn runtime_on_startup_add(callback: &Function);

    #[wasm_bindgen(js_namespace = ["chrome", "runtime", "onMessage"], js_name = addListener)]
    pub(crate) fn runtime_on_message_add(callback: &Function);

    // Background service workers have no `window`; use the global.
    #[wasm_bindgen(js_name = setTimeout)]
    fn set_timeout(handler: &Function, timeout_ms: i32) -> JsValue;
}

// =============================================================================
// Conversions
// =============================================================================

/// Human-readable text of a thrown JS value.
pub(crate) fn describe(err: &JsValue) -> String {
    if let Some(e) = err.dyn_ref::<js_sys::Error>() {
        return String::from(e.message());
    }
    err.as_string().unwrap_or_else(|| format!("{:?}", err))
}

pub(crate) fn to_js(value: &Value) -> Result<JsValue, JsValue> {
    js_sys::JSON::parse(&value.to_string())
}

pub(crate) fn from_js(value: &JsValue) -> Option<Value> {
    if value.is_undefined() {
        return None;
    }
    let text = js_sys::JSON::stringify(value).ok()?.as_string()?;
    serde_json::from_str(&text).ok()
}

/// Await a `chrome.*` promise, mapping both the synchronous throw and the
/// rejection to a [`PlatformError`].
pub(crate) async fn call(operation: &'static str, promise: Result<Promise, JsValue>) -> PlatformResult<JsValue> {
    let promise = promise.map_err(|e| PlatformError::new(operation, describe(&e)))?;
    JsFuture::from(promise)
        .await
        .map_err(|e| PlatformError::new(operation, describe(&e)))
}

fn arg(operation: &'static str, value: Value) -> PlatformResult<JsValue> {
    to_js(&value).map_err(|e| PlatformError::new(operation, describe(&e)))
}

fn get(target: &JsValue, key: &str) -> JsValue {
    Reflect::get(target, &JsValue::from_str(key)).unwrap_or(JsValue::UNDEFINED)
}

fn tab_from_js(tab: &JsValue) -> Option<BrowsingContext> {
    let id = get(tab, "id").as_f64()?;
    Some(BrowsingContext {
        id: ContextId(id as i32),
        url: get(tab, "url").as_string(),
    })
}

fn removal_data(categories: DataCategories) -> Value {
    json!({
        "cacheStorage": categories.contains(DataCategories::CACHE_STORAGE),
        "serviceWorkers": categories.contains(DataCategories::SERVICE_WORKERS),
    })
}

fn removal_options(scope: &RemovalScope) -> Value {
    match scope {
        RemovalScope::Origins(origins) => json!({ "origins": origins }),
        RemovalScope::Global => json!({}),
    }
}

fn content_script(rule: &InjectionRule) -> Value {
    json!([{
        "id": rule.id,
        "matches": rule.matches,
        "js": rule.js,
        "runAt": rule.run_at.as_str(),
        "allFrames": rule.all_frames,
        "world": rule.world.as_str(),
    }])
}

// =============================================================================
// Host
// =============================================================================

/// The extension's background context.
pub struct ChromeBrowser {
    probe_file: String,
}

impl ChromeBrowser {
    pub fn new(probe_file: impl Into<String>) -> Self {
        Self { probe_file: probe_file.into() }
    }

    async fn query(&self, info: Value) -> PlatformResult<Vec<BrowsingContext>> {
        let info = arg("tabs.query", info)?;
        let tabs = call("tabs.query", tabs_query(&info)).await?;
        Ok(Array::from(&tabs).iter().filter_map(|tab| tab_from_js(&tab)).collect())
    }
}

#[async_trait(?Send)]
impl ContextEnumerator for ChromeBrowser {
    async fn list_contexts(&self) -> PlatformResult<Vec<BrowsingContext>> {
        self.query(json!({})).await
    }

    async fn active_context(&self) -> PlatformResult<Option<BrowsingContext>> {
        let tabs = self.query(json!({ "active": true, "lastFocusedWindow": true })).await?;
        Ok(tabs.into_iter().next())
    }
}

#[async_trait(?Send)]
impl ContextLifecycle for ChromeBrowser {
    async fn create_background(&self, url: &str) -> PlatformResult<ContextId> {
        let props = arg("tabs.create", json!({ "url": url, "active": false }))?;
        let tab = call("tabs.create", tabs_create(&props)).await?;
        tab_from_js(&tab)
            .map(|ctx| ctx.id)
            .ok_or_else(|| PlatformError::new("tabs.create", "tab has no id"))
    }

    async fn reload(&self, id: ContextId) -> PlatformResult<()> {
        call("tabs.reload", tabs_reload(id.0)).await.map(drop)
    }

    async fn close(&self, id: ContextId) -> PlatformResult<()> {
        call("tabs.remove", tabs_remove(id.0)).await.map(drop)
    }

    fn on_load_complete(&self, id: ContextId, mut listener: Box<dyn FnMut()>) -> Subscription {
        let callback = Closure::<dyn FnMut(JsValue, JsValue)>::new(move |tab_id: JsValue, change: JsValue| {
            if tab_id.as_f64() != Some(f64::from(id.0)) {
                return;
            }
            if get(&change, "status").as_string().as_deref() == Some("complete") {
                listener();
            }
        });
        let function: Function = callback.as_ref().unchecked_ref::<Function>().clone();
        tabs_on_updated_add(&function);
        Subscription::new(move || {
            tabs_on_updated_remove(&function);
            drop(callback);
        })
    }
}

#[async_trait(?Send)]
impl ScriptExecutor for ChromeBrowser {
    async fn run_probe(&self, id: ContextId) -> PlatformResult<Vec<Option<FrameProbeResult>>> {
        // The probe needs the real registration API, so it runs isolated from page overrides.
        let injection = arg(
            "scripting.executeScript",
            json!({
                "target": { "tabId": id.0, "allFrames": true },
                "files": [self.probe_file],
                "world": ExecutionWorld::Isolated.as_str(),
            }),
        )?;
        let results = call("scripting.executeScript", scripting_execute(&injection)).await?;
        Ok(Array::from(&results)
            .iter()
            .map(|entry| {
                let result = from_js(&get(&entry, "result")).filter(|v| !v.is_null())?;
                match serde_json::from_value::<FrameProbeResult>(result) {
                    Ok(frame) => Some(frame),
                    Err(e) => {
                        log::debug!("Unreadable probe result in tab {}: {}", id, e);
                        None
                    }
                }
            })
            .collect())
    }
}

#[async_trait(?Send)]
impl InjectionRegistry for ChromeBrowser {
    async fn register(&self, rule: &InjectionRule) -> PlatformResult<()> {
        let scripts = arg("scripting.registerContentScripts", content_script(rule))?;
        call("scripting.registerContentScripts", scripting_register(&scripts))
            .await
            .map(drop)
    }

    async fn unregister(&self, id: &str) -> PlatformResult<()> {
        let filter = arg("scripting.unregisterContentScripts", json!({ "ids": [id] }))?;
        call("scripting.unregisterContentScripts", scripting_unregister(&filter))
            .await
            .map(drop)
    }
}

#[async_trait(?Send)]
impl BrowsingDataRemover for ChromeBrowser {
    async fn remove(&self, scope: &RemovalScope, categories: DataCategories) -> PlatformResult<()> {
        let options = arg("browsingData.remove", removal_options(scope))?;
        let data = arg("browsingData.remove", removal_data(categories))?;
        call("browsingData.remove", browsing_data_remove(&options, &data))
            .await
            .map(drop)
    }
}

#[async_trait(?Send)]
impl BadgeIndicator for ChromeBrowser {
    async fn set_badge(&self, badge: &Badge) -> PlatformResult<()> {
        let text = arg("action.setBadgeText", json!({ "text": badge.text }))?;
        call("action.setBadgeText", action_set_badge_text(&text)).await?;
        let color = arg("action.setBadgeBackgroundColor", json!({ "color": badge.color }))?;
        call("action.setBadgeBackgroundColor", action_set_badge_color(&color))
            .await
            .map(drop)
    }
}

#[async_trait(?Send)]
impl Timer for ChromeBrowser {
    async fn sleep(&self, duration: Duration) {
        let ms = i32::try_from(duration.as_millis()).unwrap_or(i32::MAX);
        let promise = Promise::new(&mut |resolve, _reject| {
            set_timeout(&resolve, ms);
        });
        let _ = JsFuture::from(promise).await;
    }
}
