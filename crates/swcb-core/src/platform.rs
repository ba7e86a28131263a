//! Capability traits for the browser host
//!
//! The core never touches a browser API directly. Each collaborator is a
//! trait so the wasm crate can bind it to `chrome.*` and tests can swap in
//! fakes. Everything is single-threaded, so the async traits are `?Send`.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::types::{
    Badge, BrowsingContext, ContextId, DataCategories, FrameProbeResult, InjectionRule, RemovalScope,
};

/// A failed call into the host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed: {message}")]
pub struct PlatformError {
    pub operation: &'static str,
    pub message: String,
}

impl PlatformError {
    pub fn new(operation: &'static str, message: impl fmt::Display) -> Self {
        Self {
            operation,
            message: message.to_string(),
        }
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

// =============================================================================
// Subscriptions
// =============================================================================

/// Handle to a registered listener. Dropping it removes the listener.
#[must_use = "dropping a Subscription removes the listener immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A subscription with nothing to release.
    pub fn detached() -> Self {
        Self { release: None }
    }

    /// Remove the listener now.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

// =============================================================================
// Host Capabilities
// =============================================================================

/// Lists open browsing contexts.
#[async_trait(?Send)]
pub trait ContextEnumerator {
    async fn list_contexts(&self) -> PlatformResult<Vec<BrowsingContext>>;

    /// The focused context of the focused window.
    async fn active_context(&self) -> PlatformResult<Option<BrowsingContext>>;
}

/// Creates, reloads and closes browsing contexts.
#[async_trait(?Send)]
pub trait ContextLifecycle {
    /// Open a context at `url` without focusing it.
    async fn create_background(&self, url: &str) -> PlatformResult<ContextId>;

    async fn reload(&self, id: ContextId) -> PlatformResult<()>;

    async fn close(&self, id: ContextId) -> PlatformResult<()>;

    /// Call `listener` when `id` reports load complete. The listener may fire
    /// more than once; it stays registered until the subscription is dropped.
    fn on_load_complete(&self, id: ContextId, listener: Box<dyn FnMut()>) -> Subscription;
}

/// Runs the unregistration probe in every frame of a context, inside an
/// execution world that page scripts cannot tamper with.
#[async_trait(?Send)]
pub trait ScriptExecutor {
    /// One entry per frame; `None` for frames that produced no result.
    async fn run_probe(&self, id: ContextId) -> PlatformResult<Vec<Option<FrameProbeResult>>>;
}

/// Declarative content-script registry.
#[async_trait(?Send)]
pub trait InjectionRegistry {
    async fn register(&self, rule: &InjectionRule) -> PlatformResult<()>;

    /// Fails if no rule with `id` exists.
    async fn unregister(&self, id: &str) -> PlatformResult<()>;
}

/// Bulk site-data removal.
#[async_trait(?Send)]
pub trait BrowsingDataRemover {
    async fn remove(&self, scope: &RemovalScope, categories: DataCategories) -> PlatformResult<()>;
}

/// Toolbar indicator.
#[async_trait(?Send)]
pub trait BadgeIndicator {
    async fn set_badge(&self, badge: &Badge) -> PlatformResult<()>;
}

/// Host timer.
#[async_trait(?Send)]
pub trait Timer {
    async fn sleep(&self, duration: Duration);
}

/// Everything the cleanup coordinator needs from the host.
pub trait Browser: ContextEnumerator + ContextLifecycle + ScriptExecutor + BrowsingDataRemover + Timer {}

impl<T> Browser for T where T: ContextEnumerator + ContextLifecycle + ScriptExecutor + BrowsingDataRemover + Timer {}
