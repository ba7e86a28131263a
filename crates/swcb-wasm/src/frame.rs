//! The in-frame side of the unregistration probe.

use async_trait::async_trait;
use js_sys::{Array, Promise, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{HtmlAnchorElement, ServiceWorkerContainer, ServiceWorkerRegistration, Window};

use swcb_core::probe::{FrameEnvironment, ProbeError, Registration};

use crate::chrome::describe;

async fn settle(promise: Result<Promise, JsValue>) -> Result<JsValue, ProbeError> {
    let promise = promise.map_err(|e| ProbeError(describe(&e)))?;
    JsFuture::from(promise).await.map_err(|e| ProbeError(describe(&e)))
}

pub struct PageRegistration(ServiceWorkerRegistration);

#[async_trait(?Send)]
impl Registration for PageRegistration {
    fn scope(&self) -> String {
        self.0.scope()
    }

    async fn unregister(&self) -> Result<bool, ProbeError> {
        let done = settle(self.0.unregister()).await?;
        Ok(done.as_bool().unwrap_or(false))
    }
}

/// The frame the probe was injected into.
pub struct PageFrame {
    window: Window,
    container: Option<ServiceWorkerContainer>,
}

impl PageFrame {
    pub fn current() -> Option<Self> {
        let window = web_sys::window()?;
        // Absent on opaque origins and insecure contexts.
        let container = Reflect::get(&window.navigator(), &JsValue::from_str("serviceWorker"))
            .ok()
            .filter(|c| !c.is_undefined() && !c.is_null())
            .map(|c| c.unchecked_into::<ServiceWorkerContainer>());
        Some(Self { window, container })
    }
}

#[async_trait(?Send)]
impl FrameEnvironment for PageFrame {
    type Registration = PageRegistration;

    fn origin(&self) -> String {
        self.window.origin()
    }

    fn has_registration_api(&self) -> bool {
        self.container.is_some()
    }

    async fn get_registrations(&self) -> Result<Vec<PageRegistration>, ProbeError> {
        let container = match &self.container {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };
        let list = settle(Ok(container.get_registrations())).await?;
        Ok(Array::from(&list)
            .iter()
            .map(|r| PageRegistration(r.unchecked_into()))
            .collect())
    }

    async fn get_registration(&self, client_url: &str) -> Result<Option<PageRegistration>, ProbeError> {
        let container = match &self.container {
            Some(c) => c,
            None => return Ok(None),
        };
        let found = settle(Ok(container.get_registration_with_document_url(client_url))).await?;
        if found.is_undefined() || found.is_null() {
            return Ok(None);
        }
        Ok(Some(PageRegistration(found.unchecked_into())))
    }

    fn link_targets(&self) -> Vec<String> {
        let anchors = match self
            .window
            .document()
            .and_then(|doc| doc.query_selector_all("a[href]").ok())
        {
            Some(list) => list,
            None => return Vec::new(),
        };
        (0..anchors.length())
            .filter_map(|i| anchors.get(i))
            .filter_map(|node| node.dyn_into::<HtmlAnchorElement>().ok())
            .map(|a| a.href())
            .collect()
    }
}
