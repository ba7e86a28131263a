//! Shared type definitions
//!
//! These types cross the boundary between the core and the browser host:
//! contexts handed out by the tab enumerator, per-frame probe records coming
//! back from script execution, and the descriptors handed to the injection
//! and browsing-data APIs.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Browsing Contexts
// =============================================================================

/// Host-assigned identifier of an open browsing context (a tab).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub i32);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An open browsing context and its current top-level URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowsingContext {
    pub id: ContextId,
    /// `None` when the host hides the URL (no permission) or the tab is blank.
    pub url: Option<String>,
}

impl BrowsingContext {
    /// Hostname of the current URL. `None` for non-web schemes.
    pub fn hostname(&self) -> Option<&str> {
        self.url
            .as_deref()
            .filter(|url| crate::url::is_web_scheme(url))
            .and_then(crate::url::extract_host)
    }
}

// =============================================================================
// Probe Results
// =============================================================================

/// Outcome of one probe run inside one frame.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FrameProbeResult {
    /// Origin of the frame the probe ran in.
    pub origin: String,
    /// Registrations unregistered (0 on error).
    pub count: u32,
    /// Scopes of the unregistered registrations.
    pub scopes: Vec<String>,
    /// Non-fatal discovery/unregistration error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub error: Option<String>,
}

impl FrameProbeResult {
    pub fn empty(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Self::default()
        }
    }

    pub fn failed(origin: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            origin: origin.into(),
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Per-context failure recorded during cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFailure {
    /// Context id, or the domain for a temporary context that never opened.
    pub target: String,
    pub message: String,
}

/// Aggregate of one cleanup invocation. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Every origin seen while probing, plus the secure origin of each exact domain.
    pub discovered_origins: BTreeSet<String>,
    /// Origins where at least one registration was found.
    pub origins_with_hits: BTreeSet<String>,
    pub total_unregistered: u32,
    /// Context-level failures and frame-level probe errors.
    pub failures: Vec<ContextFailure>,
    /// Contexts reloaded at the end of the run.
    pub reloaded: Vec<ContextId>,
}

impl CleanupReport {
    /// Fold one context's frame results into the aggregate.
    pub fn record_frames(&mut self, target: &str, frames: &[FrameProbeResult]) {
        for frame in frames {
            self.discovered_origins.insert(frame.origin.clone());
            self.total_unregistered += frame.count;
            if frame.count > 0 {
                self.origins_with_hits.insert(frame.origin.clone());
            }
            if let Some(error) = &frame.error {
                self.failures.push(ContextFailure {
                    target: format!("{} ({})", target, frame.origin),
                    message: error.clone(),
                });
            }
        }
    }

    pub fn record_failure(&mut self, target: impl Into<String>, message: impl fmt::Display) {
        self.failures.push(ContextFailure {
            target: target.into(),
            message: message.to_string(),
        });
    }
}

// =============================================================================
// Browsing Data Removal
// =============================================================================

bitflags::bitflags! {
    /// Site-data categories accepted by the bulk removal API.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DataCategories: u8 {
        const CACHE_STORAGE = 1 << 0;
        const SERVICE_WORKERS = 1 << 1;
    }
}

impl DataCategories {
    /// Categories the host can only clear globally.
    pub const GLOBAL_ONLY: Self = Self::SERVICE_WORKERS;

    pub fn supports_origin_filter(self) -> bool {
        !self.intersects(Self::GLOBAL_ONLY)
    }
}

/// Which origins a bulk removal applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalScope {
    /// Only the listed origins.
    Origins(Vec<String>),
    /// Every origin in the profile.
    Global,
}

// =============================================================================
// Injection Rules
// =============================================================================

/// Earliest point at which an injected script runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunAt {
    DocumentStart,
    DocumentEnd,
    DocumentIdle,
}

impl RunAt {
    pub fn as_str(self) -> &'static str {
        match self {
            RunAt::DocumentStart => "document_start",
            RunAt::DocumentEnd => "document_end",
            RunAt::DocumentIdle => "document_idle",
        }
    }
}

/// JavaScript world a script executes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionWorld {
    /// Shared with page scripts.
    Main,
    /// Extension-private globals; page overrides are invisible.
    Isolated,
}

impl ExecutionWorld {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionWorld::Main => "MAIN",
            ExecutionWorld::Isolated => "ISOLATED",
        }
    }
}

/// A declarative content-script registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionRule {
    pub id: String,
    pub matches: Vec<String>,
    pub js: Vec<String>,
    pub run_at: RunAt,
    pub all_frames: bool,
    pub world: ExecutionWorld,
}

/// Toolbar badge state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub text: String,
    pub color: String,
}
