//! WebAssembly bindings for SW & Cache Blocker
//!
//! Three entry surfaces share this module:
//!
//! - the background service worker calls [`init`] once, which wires the
//!   registration controller, lifecycle hooks and the message listener
//! - the popup calls the blocklist/preset helpers directly
//! - the injected `probe.js` loader calls [`probe_frame`] inside each frame
//!
//! # Probe loader
//!
//! `Settings::probe_file` (default `probe.js`) is packaged with the
//! extension, not built here. `chrome.scripting.executeScript` runs it in
//! every frame of the target tab, in the isolated world. Its completion
//! value must be a promise that:
//!
//! - loads this module's wasm bindings from the extension origin
//! - resolves to the object returned by [`probe_frame`]
//!   (`{ origin, count, scopes, error? }`), or `null` if loading failed
//!
//! Frames whose result is missing or does not decode count as unprobed.

mod chrome;
mod frame;
mod logger;
mod storage;

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::Function;
use log::LevelFilter;
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;

use swcb_core::blocklist::{AddOutcome, BlocklistStore, ToggleOutcome};
use swcb_core::controller::{ControllerState, RegistrationController};
use swcb_core::messages::{dispatch, parse_request};
use swcb_core::preset::PresetStore;
use swcb_core::{domain, matcher, pattern, probe, shim, Settings, Subscription};

use crate::chrome::{describe, from_js, to_js, ChromeBrowser};
use crate::frame::PageFrame;
use crate::storage::SyncStore;

type Controller = RegistrationController<ChromeBrowser, SyncStore>;

struct Background {
    browser: Rc<ChromeBrowser>,
    settings: Settings,
    controller: Rc<Controller>,
    _watch: Subscription,
}

thread_local! {
    static BACKGROUND: RefCell<Option<Rc<Background>>> = RefCell::new(None);
}

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn serialize<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    let value = serde_json::to_value(value).map_err(js_err)?;
    to_js(&value)
}

fn strings_from_js(value: &JsValue) -> Result<Vec<String>, JsValue> {
    let value = from_js(value).ok_or_else(|| JsValue::from_str("Expected an array of strings"))?;
    serde_json::from_value(value).map_err(|e| JsValue::from_str(&format!("Expected an array of strings: {}", e)))
}

fn parse_settings(value: &JsValue) -> Result<Settings, JsValue> {
    match from_js(value) {
        None | Some(serde_json::Value::Null) => Ok(Settings::default()),
        Some(v) => serde_json::from_value(v).map_err(|e| JsValue::from_str(&format!("Invalid settings: {}", e))),
    }
}

fn spawn_update(controller: Rc<Controller>, reason: &'static str) {
    spawn_local(async move {
        log::debug!("Updating blocking script ({})", reason);
        if let Err(e) = controller.update().await {
            log::error!("Blocking script update failed: {}", e);
        }
    });
}

/// Leak a JS callback for the lifetime of the worker.
fn add_forever<F: ?Sized + wasm_bindgen::closure::WasmClosure>(closure: Closure<F>, add: fn(&Function)) {
    add(closure.as_ref().unchecked_ref());
    closure.forget();
}

// =============================================================================
// Background
// =============================================================================

/// Start the background engine. `settings` may override any subset of the defaults.
#[wasm_bindgen]
pub fn init(settings: JsValue) -> Result<(), JsValue> {
    logger::install(LevelFilter::Info);

    if BACKGROUND.with(|b| b.borrow().is_some()) {
        return Err(JsValue::from_str("Already initialized. Reload the extension to reinitialize."));
    }
    let settings = parse_settings(&settings)?;

    let browser = Rc::new(ChromeBrowser::new(settings.probe_file.clone()));
    let controller = Rc::new(RegistrationController::new(
        browser.clone(),
        Rc::new(SyncStore),
        settings.clone(),
    ));
    let watch = controller.watch(spawn_local);
    let background = Rc::new(Background {
        browser,
        settings,
        controller: controller.clone(),
        _watch: watch,
    });

    let on_installed = {
        let controller = controller.clone();
        Closure::<dyn FnMut()>::new(move || spawn_update(controller.clone(), "install"))
    };
    add_forever(on_installed, chrome::runtime_on_installed_add);

    let on_startup = {
        let controller = controller.clone();
        Closure::<dyn FnMut()>::new(move || spawn_update(controller.clone(), "startup"))
    };
    add_forever(on_startup, chrome::runtime_on_startup_add);

    let on_message = {
        let background = background.clone();
        Closure::<dyn FnMut(JsValue, JsValue, Function) -> JsValue>::new(
            move |message: JsValue, _sender: JsValue, send_response: Function| {
                let request = match from_js(&message).as_ref().and_then(parse_request) {
                    Some(request) => request,
                    None => return JsValue::FALSE,
                };
                let background = background.clone();
                spawn_local(async move {
                    let response = dispatch(&*background.browser, &background.settings, request).await;
                    match serialize(&response) {
                        Ok(js) => {
                            if let Err(e) = send_response.call1(&JsValue::NULL, &js) {
                                log::warn!("Popup went away before the response: {}", describe(&e));
                            }
                        }
                        Err(e) => log::error!("Failed to encode response: {}", describe(&e)),
                    }
                });
                // Keep the channel open for the async response.
                JsValue::TRUE
            },
        )
    };
    add_forever(on_message, chrome::runtime_on_message_add);

    BACKGROUND.with(|b| *b.borrow_mut() = Some(background));
    spawn_update(controller, "load");
    log::info!("Background initialized");
    Ok(())
}

#[wasm_bindgen]
pub fn is_initialized() -> bool {
    BACKGROUND.with(|b| b.borrow().is_some())
}

fn background() -> Result<Rc<Background>, JsValue> {
    BACKGROUND
        .with(|b| b.borrow().clone())
        .ok_or_else(|| JsValue::from_str("Not initialized. Call init() first."))
}

/// Handle one popup message and return its response, `undefined` for foreign messages.
#[wasm_bindgen]
pub async fn handle_message(message: JsValue) -> Result<JsValue, JsValue> {
    let background = background()?;
    let request = match from_js(&message).as_ref().and_then(parse_request) {
        Some(request) => request,
        None => return Ok(JsValue::UNDEFINED),
    };
    let response = dispatch(&*background.browser, &background.settings, request).await;
    serialize(&response)
}

/// Re-register the blocking script now. Resolves to whether a rule is active.
#[wasm_bindgen]
pub async fn refresh_injection() -> Result<bool, JsValue> {
    let background = background()?;
    let state = background.controller.update().await.map_err(js_err)?;
    Ok(matches!(state, ControllerState::Active(_)))
}

// =============================================================================
// Frame Probe
// =============================================================================

/// Unregister every service worker visible from the calling frame.
///
/// Called by the probe loader; see the module docs for its contract.
#[wasm_bindgen]
pub async fn probe_frame() -> Result<JsValue, JsValue> {
    logger::install(LevelFilter::Info);
    let frame = PageFrame::current().ok_or_else(|| JsValue::from_str("No window in this context"))?;
    let result = probe::probe_frame(&frame).await;
    log::info!(
        "Probe {}: unregistered {} {:?}{}",
        result.origin,
        result.count,
        result.scopes,
        result.error.as_deref().map(|e| format!(" error: {}", e)).unwrap_or_default()
    );
    serialize(&result)
}

// =============================================================================
// Popup: Blocklist and Presets
// =============================================================================

#[wasm_bindgen]
pub async fn get_blocklist() -> Result<JsValue, JsValue> {
    let list = BlocklistStore::new(&SyncStore).load().await.map_err(js_err)?;
    serialize(&list.to_strings())
}

/// Add a user-typed domain. Resolves to `{ entry, added }`.
#[wasm_bindgen]
pub async fn add_domain(input: String) -> Result<JsValue, JsValue> {
    let outcome = BlocklistStore::new(&SyncStore).add(&input).await.map_err(js_err)?;
    let (entry, added) = match outcome {
        AddOutcome::Added(entry) => (entry, true),
        AddOutcome::AlreadyPresent(entry) => (entry, false),
    };
    let result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&result, &"entry".into(), &JsValue::from_str(entry.as_str()));
    let _ = js_sys::Reflect::set(&result, &"added".into(), &JsValue::from(added));
    Ok(result.into())
}

#[wasm_bindgen]
pub async fn remove_domain(entry: String) -> Result<bool, JsValue> {
    BlocklistStore::new(&SyncStore).remove(&entry).await.map_err(js_err)
}

/// Block or unblock the current site. Resolves to `{ entry, blocked }`.
#[wasm_bindgen]
pub async fn toggle_site(hostname: String) -> Result<JsValue, JsValue> {
    let outcome = BlocklistStore::new(&SyncStore)
        .toggle_host(&hostname)
        .await
        .map_err(js_err)?;
    let (entry, blocked) = match outcome {
        ToggleOutcome::Added(entry) => (entry, true),
        ToggleOutcome::Removed(entry) => (entry, false),
    };
    let result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&result, &"entry".into(), &JsValue::from_str(entry.as_str()));
    let _ = js_sys::Reflect::set(&result, &"blocked".into(), &JsValue::from(blocked));
    Ok(result.into())
}

#[wasm_bindgen]
pub async fn list_presets() -> Result<JsValue, JsValue> {
    let presets = PresetStore::new(&SyncStore).list().await.map_err(js_err)?;
    serialize(&presets)
}

/// Create a custom preset. Resolves to its id.
#[wasm_bindgen]
pub async fn create_preset(name: String, domains: JsValue) -> Result<String, JsValue> {
    let domains = strings_from_js(&domains)?;
    PresetStore::new(&SyncStore)
        .create(&name, domains)
        .await
        .map_err(js_err)
}

#[wasm_bindgen]
pub async fn delete_preset(id: String) -> Result<(), JsValue> {
    PresetStore::new(&SyncStore).delete(&id).await.map_err(js_err)
}

#[wasm_bindgen]
pub async fn set_preset_enabled(id: String, enabled: bool) -> Result<(), JsValue> {
    PresetStore::new(&SyncStore)
        .set_enabled(&id, enabled)
        .await
        .map_err(js_err)
}

// =============================================================================
// Pure Helpers
// =============================================================================

#[wasm_bindgen]
pub fn normalize_domain(input: &str) -> String {
    domain::normalize_domain(input)
}

#[wasm_bindgen]
pub fn is_valid_domain(d: &str) -> bool {
    domain::is_valid_domain(d)
}

/// First entry in `entries` that blocks `hostname`.
#[wasm_bindgen]
pub fn matching_entry(hostname: &str, entries: JsValue) -> Result<Option<String>, JsValue> {
    let entries = strings_from_js(&entries)?;
    Ok(matcher::find_match(hostname, entries))
}

#[wasm_bindgen]
pub fn match_patterns(entries: JsValue) -> Result<JsValue, JsValue> {
    let entries = strings_from_js(&entries)?;
    serialize(&pattern::compile_patterns(&entries))
}

#[wasm_bindgen]
pub fn shim_source() -> String {
    shim::render_shim(&shim::ShimOptions::default())
}

