//! SW & Cache Blocker Core Library
//!
//! This crate provides the platform-independent engine of the SW & Cache
//! Blocker extension: deciding which sites are blocked, keeping the blocking
//! shim registered for exactly those sites, and purging service workers and
//! cache storage that a site installed before it was blocked.
//!
//! # Architecture
//!
//! Every browser facility the engine needs (tabs, script execution, content
//! script registration, browsing-data removal, storage) is a capability trait
//! in [`platform`] or [`config`]. The wasm crate implements them on top of the
//! `chrome.*` APIs; tests implement them in memory.
//!
//! # Modules
//!
//! - `url`: Fast URL slicing without allocations
//! - `domain`: Domain entry normalization and validation
//! - `matcher`: Hostname against domain entry matching
//! - `pattern`: Domain entries to host match patterns
//! - `blocklist`: Sorted blocklist and its persisted form
//! - `preset`: Built-in and custom domain presets
//! - `config`: Configuration store abstraction and runtime settings
//! - `platform`: Capability traits for the browser host
//! - `probe`: In-frame service worker discovery and unregistration
//! - `cleanup`: Cleanup pipeline over open and temporary tabs
//! - `controller`: Blocking script registration state machine
//! - `shim`: Page-world blocking script generator
//! - `messages`: Popup/background message protocol
//! - `types`: Shared type definitions

pub mod blocklist;
pub mod cleanup;
pub mod config;
pub mod controller;
pub mod domain;
pub mod matcher;
pub mod messages;
pub mod pattern;
pub mod platform;
pub mod preset;
pub mod probe;
pub mod shim;
pub mod types;
pub mod url;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use blocklist::{Blocklist, BlocklistStore};
pub use cleanup::{CleanupCoordinator, CleanupError};
pub use config::{ConfigStore, MemoryStore, Settings};
pub use controller::{ControllerState, RegistrationController};
pub use domain::{is_valid_domain, normalize_domain, DomainEntry, DomainError};
pub use matcher::{find_match, matches};
pub use pattern::{compile_patterns, to_patterns};
pub use platform::{Browser, PlatformError, Subscription};
pub use preset::{effective_blocklist, PresetStore};
pub use shim::{render_shim, ShimOptions};
pub use types::{CleanupReport, FrameProbeResult, InjectionRule};
