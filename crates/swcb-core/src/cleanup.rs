//! Cleanup coordinator
//!
//! Best-effort purge of service workers and cache storage for a set of
//! domains. The pipeline is strictly staged:
//!
//! 1. probe every open context whose host matches a requested domain
//! 2. open a background context for exact domains that got no hit, probe it, close it
//! 3. clear cache storage for every discovered origin
//! 4. clear service workers (globally; the host cannot scope this category)
//! 5. reload the matched contexts so the blocking shim takes over
//!
//! Per-context failures are logged and recorded in the report. Only a failed
//! bulk removal aborts the run.

use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{select, Either};

use crate::config::Settings;
use crate::domain::is_wildcard;
use crate::matcher;
use crate::platform::{Browser, PlatformError};
use crate::types::{BrowsingContext, CleanupReport, ContextId, DataCategories, RemovalScope};
use crate::url::{domain_origin, extract_origin};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CleanupError {
    #[error("Failed to clear {category}: {source}")]
    Removal {
        category: &'static str,
        #[source]
        source: PlatformError,
    },
    #[error("{0:?} cannot be scoped to origins")]
    UnscopableCategory(DataCategories),
}

pub struct CleanupCoordinator<'b, B: Browser + ?Sized> {
    browser: &'b B,
    load_timeout: Duration,
    secure_scheme: String,
}

impl<'b, B: Browser + ?Sized> CleanupCoordinator<'b, B> {
    pub fn new(browser: &'b B, settings: &Settings) -> Self {
        Self {
            browser,
            load_timeout: settings.load_timeout(),
            secure_scheme: settings.secure_scheme.clone(),
        }
    }

    /// Run the full pipeline for `domains`.
    ///
    /// Service worker data is cleared for *every* origin in the profile, not
    /// just the requested ones. Other sites re-register on their next visit.
    pub async fn cleanup<S: AsRef<str>>(&self, domains: &[S]) -> Result<CleanupReport, CleanupError> {
        let domains: Vec<&str> = domains
            .iter()
            .map(|d| d.as_ref().trim())
            .filter(|d| !d.is_empty())
            .collect();
        let mut report = CleanupReport::default();

        // Stage 1: probe open contexts
        let matched = self.matched_contexts(&domains).await;
        for ctx in &matched {
            self.probe_context(ctx.id, &format!("tab {}", ctx.id), &mut report).await;
        }

        // Stage 2: temporary contexts for exact domains without a hit
        for domain in self.fallback_candidates(&domains, &matched, &report) {
            self.probe_temporary(domain, &mut report).await;
        }

        // Stage 3: origin set for scoped removal
        for domain in domains.iter().filter(|d| !is_wildcard(d)) {
            report
                .discovered_origins
                .insert(domain_origin(&self.secure_scheme, domain));
        }

        log::info!("Total unregistered: {}", report.total_unregistered);

        if !report.discovered_origins.is_empty() {
            let origins: Vec<String> = report.discovered_origins.iter().cloned().collect();
            log::info!("Clearing cache storage for origins: {:?}", origins);
            self.remove_site_data(RemovalScope::Origins(origins), DataCategories::CACHE_STORAGE)
                .await?;
        }

        log::info!("Clearing service workers globally");
        self.remove_site_data(RemovalScope::Global, DataCategories::SERVICE_WORKERS)
            .await?;

        // Stage 4: reload so the shim engages before the page can re-register
        for ctx in &matched {
            match self.browser.reload(ctx.id).await {
                Ok(()) => report.reloaded.push(ctx.id),
                Err(e) => log::debug!("Reload of tab {} failed: {}", ctx.id, e),
            }
        }

        Ok(report)
    }

    async fn matched_contexts(&self, domains: &[&str]) -> Vec<BrowsingContext> {
        let contexts = match self.browser.list_contexts().await {
            Ok(contexts) => contexts,
            Err(e) => {
                log::warn!("Could not enumerate tabs: {}", e);
                return Vec::new();
            }
        };
        contexts
            .into_iter()
            .filter(|ctx| match ctx.hostname() {
                Some(host) => matcher::matches_any(host, domains),
                None => false,
            })
            .collect()
    }

    async fn probe_context(&self, id: ContextId, label: &str, report: &mut CleanupReport) {
        match self.browser.run_probe(id).await {
            Ok(frames) => {
                let frames: Vec<_> = frames.into_iter().flatten().collect();
                for frame in &frames {
                    log::info!(
                        "{} frame {}: {} SW(s) {:?} {}",
                        label,
                        frame.origin,
                        frame.count,
                        frame.scopes,
                        frame.error.as_deref().unwrap_or("")
                    );
                }
                report.record_frames(label, &frames);
            }
            Err(e) => {
                log::warn!("Failed on {}: {}", label, e);
                report.record_failure(label, e);
            }
        }
    }

    /// Exact domains with no matched context, or whose matched contexts found nothing.
    /// Wildcards never qualify.
    fn fallback_candidates<'d>(
        &self,
        domains: &[&'d str],
        matched: &[BrowsingContext],
        report: &CleanupReport,
    ) -> Vec<&'d str> {
        domains
            .iter()
            .copied()
            .filter(|d| !is_wildcard(d))
            .filter(|d| {
                !matched.iter().any(|ctx| {
                    ctx.hostname().map_or(false, |host| matcher::matches(host, d))
                        && ctx
                            .url
                            .as_deref()
                            .and_then(extract_origin)
                            .map_or(false, |origin| report.origins_with_hits.contains(&origin))
                })
            })
            .collect()
    }

    /// Open, wait, probe, close. The close is issued on every path once the context exists.
    async fn probe_temporary(&self, domain: &str, report: &mut CleanupReport) {
        let url = domain_origin(&self.secure_scheme, domain);
        let id = match self.browser.create_background(&url).await {
            Ok(id) => id,
            Err(e) => {
                log::warn!("Temp tab failed for {}: {}", domain, e);
                report.record_failure(domain, e);
                return;
            }
        };

        if !self.wait_for_load(id).await {
            log::debug!("Temp tab {} for {} did not finish loading in {:?}", id, domain, self.load_timeout);
        }
        self.probe_context(id, &format!("temp {}", domain), report).await;

        if let Err(e) = self.browser.close(id).await {
            log::debug!("Closing temp tab {} failed: {}", id, e);
        }
    }

    /// Resolve on load complete or after the timeout, whichever is first.
    /// Returns whether the load was observed. The listener is removed either way.
    async fn wait_for_load(&self, id: ContextId) -> bool {
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        let subscription = self.browser.on_load_complete(
            id,
            Box::new(move || {
                if let Some(tx) = tx.take() {
                    let _ = tx.send(());
                }
            }),
        );

        let loaded = match select(rx, self.browser.sleep(self.load_timeout)).await {
            Either::Left((Ok(()), _)) => true,
            Either::Left((Err(_), timeout)) => {
                timeout.await;
                false
            }
            Either::Right(((), _)) => false,
        };
        subscription.unsubscribe();
        loaded
    }

    async fn remove_site_data(&self, scope: RemovalScope, categories: DataCategories) -> Result<(), CleanupError> {
        if matches!(scope, RemovalScope::Origins(_)) && !categories.supports_origin_filter() {
            return Err(CleanupError::UnscopableCategory(categories));
        }
        let category = if categories == DataCategories::SERVICE_WORKERS {
            "service workers"
        } else {
            "cache storage"
        };
        self.browser
            .remove(&scope, categories)
            .await
            .map_err(|source| CleanupError::Removal { category, source })
    }
}
