//! Registration controller
//!
//! Keeps the blocking shim's content-script registration in step with the
//! effective blocklist. Every update drops the old rule and registers a fresh
//! one, so repeated updates with the same configuration converge on the same
//! single rule. An empty blocklist leaves no rule registered.

use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::lock::Mutex;

use crate::config::{ConfigStore, Settings, BLOCKING_KEYS};
use crate::pattern::compile_patterns;
use crate::platform::{BadgeIndicator, InjectionRegistry, PlatformError, Subscription};
use crate::preset::effective_blocklist;
use crate::types::{Badge, ExecutionWorld, InjectionRule, RunAt};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    #[error("Failed to read blocklist: {0}")]
    Store(#[source] PlatformError),
    #[error("Failed to register blocking script: {0}")]
    Register(#[source] PlatformError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerState {
    /// No rule registered.
    Inactive,
    /// Rule registered for the current blocklist.
    Active(InjectionRule),
}

pub struct RegistrationController<H: ?Sized, S: ?Sized> {
    host: Rc<H>,
    store: Rc<S>,
    settings: Settings,
    state: Mutex<ControllerState>,
}

impl<H, S> RegistrationController<H, S>
where
    H: InjectionRegistry + BadgeIndicator + ?Sized + 'static,
    S: ConfigStore + ?Sized + 'static,
{
    pub fn new(host: Rc<H>, store: Rc<S>, settings: Settings) -> Self {
        Self {
            host,
            store,
            settings,
            state: Mutex::new(ControllerState::Inactive),
        }
    }

    pub async fn state(&self) -> ControllerState {
        self.state.lock().await.clone()
    }

    /// Build the rule for a set of entries, or `None` when there is nothing to block.
    pub fn build_rule<I, T>(&self, entries: I) -> Option<InjectionRule>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let matches = compile_patterns(entries);
        if matches.is_empty() {
            return None;
        }
        Some(InjectionRule {
            id: self.settings.script_id.clone(),
            matches,
            js: vec![self.settings.shim_file.clone()],
            run_at: RunAt::DocumentStart,
            all_frames: true,
            // The shim patches page globals, so it has to share the page's world.
            world: ExecutionWorld::Main,
        })
    }

    /// Re-register the shim for the current configuration.
    ///
    /// Updates are serialized: a second call waits for the first to finish.
    pub async fn update(&self) -> Result<ControllerState, ControllerError> {
        let mut state = self.state.lock().await;

        if let Err(e) = self.host.unregister(&self.settings.script_id).await {
            log::debug!("No previous rule to remove: {}", e);
        }
        *state = ControllerState::Inactive;

        let list = effective_blocklist(&*self.store)
            .await
            .map_err(ControllerError::Store)?;

        let badge = Badge {
            text: if list.is_empty() { String::new() } else { list.len().to_string() },
            color: self.settings.badge_color.clone(),
        };
        if let Err(e) = self.host.set_badge(&badge).await {
            log::warn!("Could not update badge: {}", e);
        }

        let rule = match self.build_rule(&list) {
            Some(rule) => rule,
            None => {
                log::info!("Blocklist empty, blocking script inactive");
                return Ok(ControllerState::Inactive);
            }
        };

        self.host
            .register(&rule)
            .await
            .map_err(ControllerError::Register)?;
        log::info!("Blocking script active on {} pattern(s)", rule.matches.len());

        *state = ControllerState::Active(rule);
        Ok(state.clone())
    }

    /// Run [`update`](Self::update) whenever a blocking-relevant key changes.
    ///
    /// `spawn` hands the update future to the host's executor.
    pub fn watch<F>(self: &Rc<Self>, spawn: F) -> Subscription
    where
        F: Fn(LocalBoxFuture<'static, ()>) + 'static,
    {
        let this = Rc::downgrade(self);
        self.store.subscribe(Box::new(move |change| {
            if !change.touches_any(&BLOCKING_KEYS) {
                return;
            }
            let this = match this.upgrade() {
                Some(this) => this,
                None => return,
            };
            spawn(Box::pin(async move {
                if let Err(e) = this.update().await {
                    log::error!("Blocking script update failed: {}", e);
                }
            }));
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::BlocklistStore;
    use crate::config::{self, MemoryStore, BLOCKLIST_KEY};
    use crate::preset::PresetStore;
    use crate::testing::{Call, FakeBrowser};
    use futures::executor::LocalPool;
    use futures::task::LocalSpawnExt;

    fn controller(browser: &Rc<FakeBrowser>, store: &Rc<MemoryStore>) -> Rc<RegistrationController<FakeBrowser, MemoryStore>> {
        Rc::new(RegistrationController::new(browser.clone(), store.clone(), Settings::default()))
    }

    #[tokio::test]
    async fn test_empty_blocklist_is_inactive() {
        let browser = Rc::new(FakeBrowser::new());
        let store = Rc::new(MemoryStore::new());
        let state = controller(&browser, &store).update().await.unwrap();

        assert_eq!(state, ControllerState::Inactive);
        assert!(browser.rules.borrow().is_empty());
        assert_eq!(browser.count(|c| *c == Call::Badge(String::new())), 1);
    }

    #[tokio::test]
    async fn test_rule_covers_all_patterns() {
        let browser = Rc::new(FakeBrowser::new());
        let store = Rc::new(MemoryStore::new());
        config::save(&*store, BLOCKLIST_KEY, &["example.com", "*.feishu.cn"]).await.unwrap();

        let state = controller(&browser, &store).update().await.unwrap();
        let rule = match state {
            ControllerState::Active(rule) => rule,
            other => panic!("expected active, got {:?}", other),
        };
        assert_eq!(rule.id, "sw-cache-blocker-inject");
        assert_eq!(
            rule.matches,
            vec!["*://*.feishu.cn/*", "*://example.com/*", "*://*.example.com/*"]
        );
        assert_eq!(rule.js, vec!["inject.js"]);
        assert_eq!(rule.run_at, RunAt::DocumentStart);
        assert!(rule.all_frames);
        assert_eq!(rule.world, ExecutionWorld::Main);
        assert_eq!(browser.count(|c| *c == Call::Badge("2".into())), 1);
    }

    #[tokio::test]
    async fn test_update_is_idempotent() {
        let browser = Rc::new(FakeBrowser::new());
        let store = Rc::new(MemoryStore::new());
        config::save(&*store, BLOCKLIST_KEY, &["example.com"]).await.unwrap();
        let controller = controller(&browser, &store);

        let first = controller.update().await.unwrap();
        let second = controller.update().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(browser.rules.borrow().len(), 1);
        let rule = browser.rules.borrow().values().next().cloned().unwrap();
        assert_eq!(ControllerState::Active(rule), second);
    }

    #[tokio::test]
    async fn test_clearing_blocklist_removes_rule() {
        let browser = Rc::new(FakeBrowser::new());
        let store = Rc::new(MemoryStore::new());
        let blocklist = BlocklistStore::new(&*store);
        blocklist.add("example.com").await.unwrap();
        let controller = controller(&browser, &store);

        controller.update().await.unwrap();
        blocklist.remove("example.com").await.unwrap();
        let state = controller.update().await.unwrap();

        assert_eq!(state, ControllerState::Inactive);
        assert!(browser.rules.borrow().is_empty());
        assert_eq!(controller.state().await, ControllerState::Inactive);
    }

    #[tokio::test]
    async fn test_enabled_preset_contributes_patterns() {
        let browser = Rc::new(FakeBrowser::new());
        let store = Rc::new(MemoryStore::new());
        PresetStore::new(&*store).set_enabled("figma", true).await.unwrap();

        let state = controller(&browser, &store).update().await.unwrap();
        match state {
            ControllerState::Active(rule) => {
                assert_eq!(rule.matches, vec!["*://figma.com/*", "*://*.figma.com/*"])
            }
            other => panic!("expected active, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_register_failure_surfaces() {
        let browser = Rc::new(FakeBrowser::new());
        browser.fail_register.set(true);
        let store = Rc::new(MemoryStore::new());
        config::save(&*store, BLOCKLIST_KEY, &["example.com"]).await.unwrap();

        let controller = controller(&browser, &store);
        let err = controller.update().await.unwrap_err();
        assert!(matches!(err, ControllerError::Register(_)));
        assert_eq!(controller.state().await, ControllerState::Inactive);
    }

    #[test]
    fn test_watch_reacts_to_blocking_keys_only() {
        let mut pool = LocalPool::new();
        let spawner = pool.spawner();
        let browser = Rc::new(FakeBrowser::new());
        let store = Rc::new(MemoryStore::new());
        let controller = controller(&browser, &store);

        let subscription = controller.watch(move |fut| {
            spawner.spawn_local(fut).unwrap();
        });

        pool.run_until(async {
            config::save(&*store, "theme", &"dark").await.unwrap();
        });
        pool.run_until_stalled();
        assert_eq!(browser.count(|c| matches!(c, Call::Register(_) | Call::Unregister(_))), 0);

        pool.run_until(async {
            BlocklistStore::new(&*store).add("example.com").await.unwrap();
        });
        pool.run_until_stalled();
        assert_eq!(browser.rules.borrow().len(), 1);

        drop(subscription);
        assert_eq!(store.listener_count(), 0);
    }
}
