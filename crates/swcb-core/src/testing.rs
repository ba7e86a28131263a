//! In-memory browser host for unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;

use crate::platform::{
    BadgeIndicator, BrowsingDataRemover, ContextEnumerator, ContextLifecycle, InjectionRegistry,
    PlatformError, PlatformResult, ScriptExecutor, Subscription, Timer,
};
use crate::types::{
    Badge, BrowsingContext, ContextId, DataCategories, FrameProbeResult, InjectionRule, RemovalScope,
};

pub type ProbeOutcome = PlatformResult<Vec<Option<FrameProbeResult>>>;

/// Every host call, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Probe(ContextId),
    Create(String),
    Subscribe(ContextId),
    Unsubscribe(ContextId),
    Sleep(Duration),
    Close(ContextId),
    Reload(ContextId),
    Remove(RemovalScope, DataCategories),
    Register(String),
    Unregister(String),
    Badge(String),
}

pub struct FakeBrowser {
    pub contexts: RefCell<Vec<BrowsingContext>>,
    pub active: Cell<Option<ContextId>>,
    pub probe_by_id: RefCell<HashMap<ContextId, ProbeOutcome>>,
    /// Results for contexts the coordinator opens, keyed by URL.
    pub probe_by_url: RefCell<HashMap<String, ProbeOutcome>>,
    pub fail_create: RefCell<HashSet<String>>,
    pub fail_list: Cell<bool>,
    pub fail_reload: Cell<bool>,
    pub fail_close: Cell<bool>,
    pub fail_removal: Cell<bool>,
    pub fail_register: Cell<bool>,
    /// Whether opened contexts ever report load complete.
    pub loads: Cell<bool>,
    pub rules: RefCell<BTreeMap<String, InjectionRule>>,
    pub calls: Rc<RefCell<Vec<Call>>>,
    created: RefCell<HashMap<ContextId, String>>,
    next_id: Cell<i32>,
}

impl Default for FakeBrowser {
    fn default() -> Self {
        Self {
            contexts: RefCell::default(),
            active: Cell::new(None),
            probe_by_id: RefCell::default(),
            probe_by_url: RefCell::default(),
            fail_create: RefCell::default(),
            fail_list: Cell::new(false),
            fail_reload: Cell::new(false),
            fail_close: Cell::new(false),
            fail_removal: Cell::new(false),
            fail_register: Cell::new(false),
            loads: Cell::new(true),
            rules: RefCell::default(),
            calls: Rc::default(),
            created: RefCell::default(),
            next_id: Cell::new(1000),
        }
    }
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, id: i32, url: &str) {
        self.contexts.borrow_mut().push(BrowsingContext {
            id: ContextId(id),
            url: Some(url.to_string()),
        });
    }

    pub fn set_probe(&self, id: i32, frames: Vec<FrameProbeResult>) {
        self.probe_by_id
            .borrow_mut()
            .insert(ContextId(id), Ok(frames.into_iter().map(Some).collect()));
    }

    pub fn fail_probe(&self, id: i32, message: &str) {
        self.probe_by_id
            .borrow_mut()
            .insert(ContextId(id), Err(PlatformError::new("scripting.executeScript", message)));
    }

    pub fn set_probe_for_url(&self, url: &str, outcome: ProbeOutcome) {
        self.probe_by_url.borrow_mut().insert(url.to_string(), outcome);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn removals(&self) -> Vec<(RemovalScope, DataCategories)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Remove(scope, categories) => Some((scope.clone(), *categories)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

pub fn frame(origin: &str, count: u32) -> FrameProbeResult {
    FrameProbeResult {
        origin: origin.to_string(),
        count,
        scopes: (0..count).map(|i| format!("{}/s{}/", origin, i)).collect(),
        error: None,
    }
}

#[async_trait(?Send)]
impl ContextEnumerator for FakeBrowser {
    async fn list_contexts(&self) -> PlatformResult<Vec<BrowsingContext>> {
        self.record(Call::List);
        if self.fail_list.get() {
            return Err(PlatformError::new("tabs.query", "boom"));
        }
        Ok(self.contexts.borrow().clone())
    }

    async fn active_context(&self) -> PlatformResult<Option<BrowsingContext>> {
        let active = match self.active.get() {
            Some(id) => id,
            None => return Ok(None),
        };
        Ok(self.contexts.borrow().iter().find(|c| c.id == active).cloned())
    }
}

#[async_trait(?Send)]
impl ContextLifecycle for FakeBrowser {
    async fn create_background(&self, url: &str) -> PlatformResult<ContextId> {
        self.record(Call::Create(url.to_string()));
        if self.fail_create.borrow().contains(url) {
            return Err(PlatformError::new("tabs.create", "blocked"));
        }
        let id = ContextId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.created.borrow_mut().insert(id, url.to_string());
        Ok(id)
    }

    async fn reload(&self, id: ContextId) -> PlatformResult<()> {
        self.record(Call::Reload(id));
        if self.fail_reload.get() {
            return Err(PlatformError::new("tabs.reload", "gone"));
        }
        Ok(())
    }

    async fn close(&self, id: ContextId) -> PlatformResult<()> {
        self.record(Call::Close(id));
        if self.fail_close.get() {
            return Err(PlatformError::new("tabs.remove", "gone"));
        }
        Ok(())
    }

    fn on_load_complete(&self, id: ContextId, mut listener: Box<dyn FnMut()>) -> Subscription {
        self.record(Call::Subscribe(id));
        if self.loads.get() {
            listener();
        }
        let calls = self.calls.clone();
        Subscription::new(move || calls.borrow_mut().push(Call::Unsubscribe(id)))
    }
}

#[async_trait(?Send)]
impl ScriptExecutor for FakeBrowser {
    async fn run_probe(&self, id: ContextId) -> ProbeOutcome {
        self.record(Call::Probe(id));
        if let Some(outcome) = self.probe_by_id.borrow().get(&id) {
            return outcome.clone();
        }
        let url = self.created.borrow().get(&id).cloned();
        match url.and_then(|url| self.probe_by_url.borrow().get(&url).cloned()) {
            Some(outcome) => outcome,
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait(?Send)]
impl BrowsingDataRemover for FakeBrowser {
    async fn remove(&self, scope: &RemovalScope, categories: DataCategories) -> PlatformResult<()> {
        self.record(Call::Remove(scope.clone(), categories));
        if self.fail_removal.get() {
            return Err(PlatformError::new("browsingData.remove", "quota"));
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl Timer for FakeBrowser {
    async fn sleep(&self, duration: Duration) {
        self.record(Call::Sleep(duration));
    }
}

#[async_trait(?Send)]
impl InjectionRegistry for FakeBrowser {
    async fn register(&self, rule: &InjectionRule) -> PlatformResult<()> {
        self.record(Call::Register(rule.id.clone()));
        if self.fail_register.get() {
            return Err(PlatformError::new("scripting.registerContentScripts", "bad pattern"));
        }
        let mut rules = self.rules.borrow_mut();
        if rules.contains_key(&rule.id) {
            return Err(PlatformError::new(
                "scripting.registerContentScripts",
                format!("Duplicate script ID '{}'", rule.id),
            ));
        }
        rules.insert(rule.id.clone(), rule.clone());
        Ok(())
    }

    async fn unregister(&self, id: &str) -> PlatformResult<()> {
        self.record(Call::Unregister(id.to_string()));
        match self.rules.borrow_mut().remove(id) {
            Some(_) => Ok(()),
            None => Err(PlatformError::new(
                "scripting.unregisterContentScripts",
                format!("Nonexistent script ID '{}'", id),
            )),
        }
    }
}

#[async_trait(?Send)]
impl BadgeIndicator for FakeBrowser {
    async fn set_badge(&self, badge: &Badge) -> PlatformResult<()> {
        self.record(Call::Badge(badge.text.clone()));
        Ok(())
    }
}
