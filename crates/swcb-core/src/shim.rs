//! Blocking shim generator
//!
//! Produces the page-world script that neutralizes service worker
//! registration and Cache Storage. The script:
//!
//! - installs once per page, guarded by a non-enumerable, non-configurable marker
//! - replaces `navigator.serviceWorker.register` with a function that rejects
//!   with a `SecurityError`
//! - replaces each `caches` method with a stub honouring its return contract
//! - defines every replacement as non-writable and non-configurable, so later
//!   page code can neither reassign nor delete it
//! - makes each replacement's `toString()` return the native source, so
//!   stringification does not reveal the swap (not tamper-proof)

use std::fmt::Write;

/// What a stub resolves or rejects with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubReturn {
    ResolveFalse,
    ResolveEmpty,
    ResolveUndefined,
    RejectSecurityError,
}

impl StubReturn {
    fn js(self, message: &str) -> String {
        match self {
            StubReturn::ResolveFalse => "Promise.resolve(false)".to_string(),
            StubReturn::ResolveEmpty => "Promise.resolve([])".to_string(),
            StubReturn::ResolveUndefined => "Promise.resolve(undefined)".to_string(),
            StubReturn::RejectSecurityError => format!(
                "Promise.reject(new DOMException({}, 'SecurityError'))",
                js_string(message)
            ),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheMethod {
    pub name: &'static str,
    pub returns: StubReturn,
}

/// `CacheStorage` methods and the stub each one gets.
pub const CACHE_METHODS: &[CacheMethod] = &[
    CacheMethod { name: "open", returns: StubReturn::RejectSecurityError },
    CacheMethod { name: "has", returns: StubReturn::ResolveFalse },
    CacheMethod { name: "delete", returns: StubReturn::ResolveFalse },
    CacheMethod { name: "keys", returns: StubReturn::ResolveEmpty },
    CacheMethod { name: "match", returns: StubReturn::ResolveUndefined },
];

/// Every page entry point the shim replaces.
pub fn blocked_entry_points() -> Vec<String> {
    let mut points = vec!["navigator.serviceWorker.register".to_string()];
    points.extend(CACHE_METHODS.iter().map(|m| format!("caches.{}", m.name)));
    points
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimOptions {
    /// Global property marking the shim as installed.
    pub marker: String,
    /// Console prefix for blocked-call warnings.
    pub tag: String,
    pub register_message: String,
    pub cache_message: String,
}

impl Default for ShimOptions {
    fn default() -> Self {
        Self {
            marker: "__swcb_active__".to_string(),
            tag: "[SW & Cache Blocker]".to_string(),
            register_message: "Service Worker registration blocked by SW & Cache Blocker extension".to_string(),
            cache_message: "Cache Storage blocked by SW & Cache Blocker extension".to_string(),
        }
    }
}

/// JS string literal. JSON strings are valid JS literals.
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Render the shim as a self-contained script.
pub fn render_shim(opts: &ShimOptions) -> String {
    let mut out = String::with_capacity(2048);
    let reject_register = StubReturn::RejectSecurityError.js(&opts.register_message);

    let _ = writeln!(out, "// Generated by swcb-cli. Runs in the page world at document_start.");
    out.push_str("(function () {\n");
    out.push_str("  'use strict';\n\n");
    let _ = writeln!(out, "  var MARKER = {};", js_string(&opts.marker));
    out.push_str("  if (Object.prototype.hasOwnProperty.call(window, MARKER)) return;\n");
    let _ = writeln!(out, "  var TAG = {};\n", js_string(&opts.tag));
    out.push_str(
        "  Object.defineProperty(window, MARKER, {\n\
         \x20   value: true,\n\
         \x20   enumerable: false,\n\
         \x20   writable: false,\n\
         \x20   configurable: false,\n\
         \x20 });\n\n",
    );

    out.push_str(
        "  var fnToString = Function.prototype.toString;\n\
         \x20 var replace = function (target, name, impl) {\n\
         \x20   var original = target[name];\n\
         \x20   var source = typeof original === 'function'\n\
         \x20     ? fnToString.call(original)\n\
         \x20     : 'function ' + name + '() { [native code] }';\n\
         \x20   Object.defineProperty(impl, 'toString', {\n\
         \x20     value: function toString() { return source; },\n\
         \x20     writable: false,\n\
         \x20     configurable: false,\n\
         \x20   });\n\
         \x20   Object.defineProperty(target, name, {\n\
         \x20     value: impl,\n\
         \x20     writable: false,\n\
         \x20     configurable: false,\n\
         \x20   });\n\
         \x20 };\n\n",
    );

    out.push_str("  var sw = navigator.serviceWorker;\n");
    out.push_str("  if (sw) {\n");
    out.push_str("    replace(sw, 'register', function register(scriptURL) {\n");
    out.push_str("      console.warn(TAG, 'Blocked SW registration:', scriptURL);\n");
    let _ = writeln!(out, "      return {};", reject_register);
    out.push_str("    });\n");
    out.push_str("  }\n\n");

    out.push_str("  var store = window.caches;\n");
    out.push_str("  if (store) {\n");
    for method in CACHE_METHODS {
        let _ = writeln!(out, "    replace(store, {}, function () {{", js_string(method.name));
        let _ = writeln!(
            out,
            "      console.warn(TAG, {}, Array.prototype.slice.call(arguments));",
            js_string(&format!("Blocked caches.{}():", method.name))
        );
        let _ = writeln!(out, "      return {};", method.returns.js(&opts.cache_message));
        out.push_str("    });\n");
    }
    out.push_str("  }\n\n");

    out.push_str("  console.info(TAG, 'Active on', location.hostname);\n");
    out.push_str("})();\n");
    out
}
