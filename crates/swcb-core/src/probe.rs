//! Per-frame service worker unregistration probe
//!
//! Runs inside one frame with access to the real registration API. It must
//! execute in a world the page cannot reach, otherwise the page could have
//! replaced the lookup functions before the probe calls them.
//!
//! Discovery is an ordered list of strategies; the first one that yields any
//! registration wins:
//!
//! 1. [`DiscoveryStrategy::ListAll`]: the "all registrations for this origin" call.
//! 2. [`DiscoveryStrategy::LinkScopes`]: per-scope lookups for the root path and
//!    the first path segment of every same-origin link on the page. Some
//!    browser versions under-report cross-scope registrations from (1).

use async_trait::async_trait;
use futures::future::join_all;

use crate::types::FrameProbeResult;
use crate::url::{extract_origin, extract_path, first_path_segment};

/// Failure reported by the in-frame registration API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ProbeError(pub String);

/// A live service worker registration.
#[async_trait(?Send)]
pub trait Registration {
    fn scope(&self) -> String;

    async fn unregister(&self) -> Result<bool, ProbeError>;
}

/// What the probe can see from inside a frame.
#[async_trait(?Send)]
pub trait FrameEnvironment {
    type Registration: Registration;

    /// Serialized origin of the frame.
    fn origin(&self) -> String;

    /// `false` when the frame has no registration API (opaque origin, insecure context).
    fn has_registration_api(&self) -> bool;

    async fn get_registrations(&self) -> Result<Vec<Self::Registration>, ProbeError>;

    /// Registration whose scope controls `client_url`, if any.
    async fn get_registration(&self, client_url: &str) -> Result<Option<Self::Registration>, ProbeError>;

    /// Absolute targets of the page's `a[href]` elements.
    fn link_targets(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStrategy {
    ListAll,
    LinkScopes,
}

pub const DISCOVERY_ORDER: [DiscoveryStrategy; 2] = [DiscoveryStrategy::ListAll, DiscoveryStrategy::LinkScopes];

/// Root plus `/<segment>/` for each same-origin link, in first-seen order.
pub fn candidate_scope_paths<I, S>(origin: &str, links: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut paths = vec!["/".to_string()];
    for link in links {
        let link = link.as_ref();
        let path = if link.starts_with('/') && !link.starts_with("//") {
            extract_path_relative(link)
        } else if extract_origin(link).as_deref() == Some(origin) {
            extract_path(link)
        } else {
            continue;
        };
        if let Some(segment) = first_path_segment(path) {
            let candidate = format!("/{}/", segment);
            if !paths.contains(&candidate) {
                paths.push(candidate);
            }
        }
    }
    paths
}

fn extract_path_relative(link: &str) -> &str {
    let end = link.find(|c| c == '?' || c == '#').unwrap_or(link.len());
    &link[..end]
}

async fn run_strategy<E: FrameEnvironment + ?Sized>(
    env: &E,
    strategy: DiscoveryStrategy,
) -> Result<Vec<E::Registration>, ProbeError> {
    match strategy {
        DiscoveryStrategy::ListAll => env.get_registrations().await,
        DiscoveryStrategy::LinkScopes => {
            let origin = env.origin();
            let mut found: Vec<E::Registration> = Vec::new();
            for path in candidate_scope_paths(&origin, env.link_targets()) {
                let url = format!("{}{}", origin, path);
                match env.get_registration(&url).await {
                    Ok(Some(reg)) => {
                        let scope = reg.scope();
                        if !found.iter().any(|r| r.scope() == scope) {
                            found.push(reg);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => log::debug!("Scope lookup for {} failed: {}", url, e),
                }
            }
            Ok(found)
        }
    }
}

/// Run strategies in order and keep the first non-empty result.
pub async fn discover<E: FrameEnvironment + ?Sized>(
    env: &E,
) -> Result<Option<(DiscoveryStrategy, Vec<E::Registration>)>, ProbeError> {
    for strategy in DISCOVERY_ORDER {
        let regs = run_strategy(env, strategy).await?;
        if !regs.is_empty() {
            if strategy != DiscoveryStrategy::ListAll {
                let scopes: Vec<String> = regs.iter().map(|r| r.scope()).collect();
                log::info!("Full listing returned nothing, {:?} found: {:?}", strategy, scopes);
            }
            return Ok(Some((strategy, regs)));
        }
    }
    Ok(None)
}

/// Discover and unregister every registration visible from this frame.
///
/// Never fails: errors come back in [`FrameProbeResult::error`] with a zero count.
pub async fn probe_frame<E: FrameEnvironment + ?Sized>(env: &E) -> FrameProbeResult {
    let origin = env.origin();
    if !env.has_registration_api() {
        return FrameProbeResult::empty(origin);
    }

    let regs = match discover(env).await {
        Ok(Some((_, regs))) => regs,
        Ok(None) => return FrameProbeResult::empty(origin),
        Err(e) => return FrameProbeResult::failed(origin, e),
    };

    let scopes: Vec<String> = regs.iter().map(|r| r.scope()).collect();
    let outcomes = join_all(regs.iter().map(|r| r.unregister())).await;
    if let Some(err) = outcomes.into_iter().find_map(Result::err) {
        return FrameProbeResult::failed(origin, err);
    }

    FrameProbeResult {
        origin,
        count: scopes.len() as u32,
        scopes,
        error: None,
    }
}
