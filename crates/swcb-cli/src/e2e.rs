use std::path::PathBuf;
use std::time::Duration;

use serde_json::{json, Value};
use thirtyfour::extensions::cdp::ChromeDevTools;
use thirtyfour::prelude::*;
use thirtyfour::ChromeCapabilities;

use swcb_core::config::BLOCKLIST_KEY;
use swcb_core::shim::ShimOptions;
use swcb_core::url::extract_host;

pub struct E2eOptions {
    pub chromedriver_url: String,
    pub extension_path: String,
    pub target_url: String,
    pub popup_path: String,
    pub headless: bool,
}

pub fn run_e2e(opts: E2eOptions) -> Result<(), String> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    runtime.block_on(run_e2e_async(opts))
}

async fn run_e2e_async(opts: E2eOptions) -> Result<(), String> {
    let extension_path = canonicalize_path(&opts.extension_path)?;
    let host = extract_host(&opts.target_url)
        .ok_or_else(|| format!("Target URL has no host: {}", opts.target_url))?
        .to_string();

    let mut caps = ChromeCapabilities::new();
    let disable_arg = format!("--disable-extensions-except={}", extension_path.display());
    caps.add_arg(&disable_arg)
        .map_err(|e| format!("Failed to set chrome arg: {}", e))?;
    let load_arg = format!("--load-extension={}", extension_path.display());
    caps.add_arg(&load_arg)
        .map_err(|e| format!("Failed to set chrome arg: {}", e))?;
    caps.add_arg("--no-first-run")
        .map_err(|e| format!("Failed to set chrome arg: {}", e))?;
    caps.add_arg("--no-default-browser-check")
        .map_err(|e| format!("Failed to set chrome arg: {}", e))?;
    if opts.headless {
        caps.add_arg("--headless=new")
            .map_err(|e| format!("Failed to set chrome arg: {}", e))?;
        caps.add_arg("--disable-gpu")
            .map_err(|e| format!("Failed to set chrome arg: {}", e))?;
    }

    let driver = WebDriver::new(&opts.chromedriver_url, caps)
        .await
        .map_err(|e| format!("Failed to connect to chromedriver: {}", e))?;

    let cdp = ChromeDevTools::new(driver.handle.clone());
    tokio::time::sleep(Duration::from_secs(1)).await;

    let result = run_checks(&driver, &cdp, &opts, &host).await;
    driver.quit().await.ok();

    let errors = result?;
    if errors.is_empty() {
        println!("✓ E2E checks passed for {}", host);
        Ok(())
    } else {
        Err(format!("E2E failed:\n- {}", errors.join("\n- ")))
    }
}

async fn run_checks(
    driver: &WebDriver,
    cdp: &ChromeDevTools,
    opts: &E2eOptions,
    host: &str,
) -> Result<Vec<String>, String> {
    let extension_id = find_extension_id(cdp)
        .await
        .ok_or_else(|| "Failed to locate extension service worker".to_string())?;

    seed_blocklist(driver, &extension_id, &opts.popup_path, host).await?;
    // Let the background re-register the blocking script.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    driver
        .goto(&opts.target_url)
        .await
        .map_err(|e| format!("Failed to open '{}': {}", opts.target_url, e))?;

    let mut errors = Vec::new();

    if let Err(e) = check_marker(driver).await {
        errors.push(format!("Install marker check failed: {}", e));
    }

    if let Err(e) = check_register_blocked(driver).await {
        errors.push(format!("Registration check failed: {}", e));
    }

    if let Err(e) = check_cache_storage_blocked(driver).await {
        errors.push(format!("Cache storage check failed: {}", e));
    }

    if let Err(e) = check_tamper_resistance(driver).await {
        errors.push(format!("Tamper check failed: {}", e));
    }

    Ok(errors)
}

async fn find_extension_id(cdp: &ChromeDevTools) -> Option<String> {
    let targets = cdp.execute_cdp("Target.getTargets").await.ok()?;
    let infos = targets.get("targetInfos")?.as_array()?;
    for info in infos {
        let target_type = info.get("type").and_then(Value::as_str).unwrap_or("");
        let url = info.get("url").and_then(Value::as_str).unwrap_or("");
        if target_type == "service_worker" && url.starts_with("chrome-extension://") {
            let id = url.trim_start_matches("chrome-extension://");
            if let Some(id) = id.split('/').next() {
                if !id.is_empty() {
                    return Some(id.to_string());
                }
            }
        }
    }
    None
}

async fn seed_blocklist(driver: &WebDriver, extension_id: &str, popup_path: &str, host: &str) -> Result<(), String> {
    let url = format!("chrome-extension://{}/{}", extension_id, popup_path.trim_start_matches('/'));
    driver.goto(&url).await.map_err(|e| format!("Failed to open popup page: {}", e))?;

    let stored = eval_async_bool(
        driver,
        "const done = arguments[arguments.length - 1];\
         chrome.storage.sync.set({ [arguments[0]]: [arguments[1]] }).then(() => done(true), () => done(false));",
        vec![json!(BLOCKLIST_KEY), json!(host)],
    )
    .await
    .map_err(|e| format!("Failed to write blocklist: {}", e))?;

    if !stored {
        return Err("chrome.storage.sync.set rejected".to_string());
    }
    Ok(())
}

async fn check_marker(driver: &WebDriver) -> Result<(), String> {
    let marker = ShimOptions::default().marker;
    let present = eval_bool_with(
        driver,
        "const d = Object.getOwnPropertyDescriptor(window, arguments[0]);\
         return !!d && d.value === true && !d.enumerable && !d.configurable;",
        vec![json!(marker)],
    )
    .await
    .map_err(|e| format!("Failed to read marker: {}", e))?;
    if !present {
        return Err("Shim marker missing or mutable".to_string());
    }
    Ok(())
}

async fn check_register_blocked(driver: &WebDriver) -> Result<(), String> {
    let blocked = eval_async_bool(
        driver,
        "const done = arguments[arguments.length - 1];\
         navigator.serviceWorker.register('/swcb-e2e-sw.js')\
           .then(() => done(false), (e) => done(e && e.name === 'SecurityError'));",
        Vec::new(),
    )
    .await
    .map_err(|e| format!("Failed to call register: {}", e))?;
    if !blocked {
        return Err("Expected register() to reject with SecurityError".to_string());
    }
    Ok(())
}

async fn check_cache_storage_blocked(driver: &WebDriver) -> Result<(), String> {
    let blocked = eval_async_bool(
        driver,
        "const done = arguments[arguments.length - 1];\
         Promise.all([\
           caches.keys(),\
           caches.has('x'),\
           caches.match('/'),\
           caches.open('x').then(() => 'opened', (e) => e.name),\
         ]).then(([keys, has, hit, open]) =>\
           done(keys.length === 0 && has === false && hit === undefined && open === 'SecurityError'),\
           () => done(false));",
        Vec::new(),
    )
    .await
    .map_err(|e| format!("Failed to call caches: {}", e))?;
    if !blocked {
        return Err("Expected cache storage stubs".to_string());
    }
    Ok(())
}

async fn check_tamper_resistance(driver: &WebDriver) -> Result<(), String> {
    let intact = eval_bool(
        driver,
        "const sw = navigator.serviceWorker;\
         const before = sw.register;\
         try { sw.register = function () {}; } catch (e) {}\
         try { delete sw.register; } catch (e) {}\
         return sw.register === before && String(before).includes('[native code]');",
    )
    .await
    .map_err(|e| format!("Failed to probe register: {}", e))?;
    if !intact {
        return Err("register() replacement was overridable or revealed itself".to_string());
    }
    Ok(())
}

async fn eval_bool(driver: &WebDriver, script: &str) -> WebDriverResult<bool> {
    eval_bool_with(driver, script, Vec::new()).await
}

async fn eval_bool_with(driver: &WebDriver, script: &str, args: Vec<Value>) -> WebDriverResult<bool> {
    let result = driver.execute(script, args).await?;
    Ok(result.json().as_bool().unwrap_or(false))
}

async fn eval_async_bool(driver: &WebDriver, script: &str, args: Vec<Value>) -> WebDriverResult<bool> {
    let result = driver.execute_async(script, args).await?;
    Ok(result.json().as_bool().unwrap_or(false))
}

fn canonicalize_path(path: &str) -> Result<PathBuf, String> {
    std::fs::canonicalize(path)
        .map_err(|e| format!("Failed to resolve '{}': {}", path, e))
}
