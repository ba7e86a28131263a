//! Popup ↔ background message protocol
//!
//! Requests are JSON objects tagged by `type`. Every request gets exactly one
//! JSON response; nothing here throws across the messaging boundary.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::cleanup::CleanupCoordinator;
use crate::config::Settings;
use crate::platform::Browser;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[ts(export)]
pub enum Request {
    /// Purge service workers and caches for these entries.
    Cleanup { domains: Vec<String> },
    /// Hostname of the focused tab, for the "block current site" button.
    GetCurrentDomain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CleanupResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CurrentDomainResponse {
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Cleanup(CleanupResponse),
    CurrentDomain(CurrentDomainResponse),
}

/// Parse a raw message. Unknown `type`s are not ours and yield `None`.
pub fn parse_request(raw: &serde_json::Value) -> Option<Request> {
    match serde_json::from_value(raw.clone()) {
        Ok(request) => Some(request),
        Err(e) => {
            log::debug!("Ignoring message {}: {}", raw, e);
            None
        }
    }
}

pub async fn dispatch<B: Browser + ?Sized>(browser: &B, settings: &Settings, request: Request) -> Response {
    match request {
        Request::Cleanup { domains } => Response::Cleanup(handle_cleanup(browser, settings, &domains).await),
        Request::GetCurrentDomain => Response::CurrentDomain(current_domain(browser).await),
    }
}

async fn handle_cleanup<B: Browser + ?Sized>(browser: &B, settings: &Settings, domains: &[String]) -> CleanupResponse {
    match CleanupCoordinator::new(browser, settings).cleanup(domains).await {
        Ok(report) => {
            if !report.failures.is_empty() {
                log::warn!("Cleanup finished with {} recovered failure(s)", report.failures.len());
            }
            CleanupResponse { success: true, error: None }
        }
        Err(e) => {
            log::error!("Cleanup failed: {}", e);
            CleanupResponse {
                success: false,
                error: Some(e.to_string()),
            }
        }
    }
}

async fn current_domain<B: Browser + ?Sized>(browser: &B) -> CurrentDomainResponse {
    let hostname = match browser.active_context().await {
        Ok(ctx) => ctx.and_then(|ctx| ctx.hostname().map(str::to_string)),
        Err(e) => {
            log::warn!("Could not query active tab: {}", e);
            None
        }
    };
    CurrentDomainResponse { hostname }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBrowser;
    use crate::types::ContextId;
    use serde_json::json;

    #[test]
    fn test_parse_requests() {
        assert_eq!(
            parse_request(&json!({"type": "cleanup", "domains": ["a.com", "*.b.com"]})),
            Some(Request::Cleanup { domains: vec!["a.com".into(), "*.b.com".into()] })
        );
        assert_eq!(
            parse_request(&json!({"type": "get-current-domain"})),
            Some(Request::GetCurrentDomain)
        );
        assert_eq!(parse_request(&json!({"type": "ping"})), None);
        assert_eq!(parse_request(&json!("cleanup")), None);
    }

    #[test]
    fn test_response_shapes() {
        let ok = Response::Cleanup(CleanupResponse { success: true, error: None });
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({"success": true}));

        let failed = Response::Cleanup(CleanupResponse {
            success: false,
            error: Some("boom".into()),
        });
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"success": false, "error": "boom"})
        );

        let none = Response::CurrentDomain(CurrentDomainResponse { hostname: None });
        assert_eq!(serde_json::to_value(&none).unwrap(), json!({"hostname": null}));
    }

    #[tokio::test]
    async fn test_cleanup_request_succeeds() {
        let browser = FakeBrowser::new();
        let response = dispatch(
            &browser,
            &Settings::default(),
            Request::Cleanup { domains: vec!["example.com".into()] },
        )
        .await;
        assert_eq!(response, Response::Cleanup(CleanupResponse { success: true, error: None }));
    }

    #[tokio::test]
    async fn test_cleanup_request_reports_removal_failure() {
        let browser = FakeBrowser::new();
        browser.fail_removal.set(true);
        let response = dispatch(
            &browser,
            &Settings::default(),
            Request::Cleanup { domains: vec!["example.com".into()] },
        )
        .await;
        match response {
            Response::Cleanup(CleanupResponse { success: false, error: Some(msg) }) => {
                assert!(msg.contains("quota"), "{}", msg)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_current_domain() {
        let browser = FakeBrowser::new();
        browser.open(1, "https://docs.example.com:8443/page");
        browser.open(2, "chrome://extensions");
        let settings = Settings::default();

        let response = dispatch(&browser, &settings, Request::GetCurrentDomain).await;
        assert_eq!(response, Response::CurrentDomain(CurrentDomainResponse { hostname: None }));

        browser.active.set(Some(ContextId(1)));
        let response = dispatch(&browser, &settings, Request::GetCurrentDomain).await;
        assert_eq!(
            response,
            Response::CurrentDomain(CurrentDomainResponse { hostname: Some("docs.example.com".into()) })
        );

        browser.active.set(Some(ContextId(2)));
        let response = dispatch(&browser, &settings, Request::GetCurrentDomain).await;
        assert_eq!(response, Response::CurrentDomain(CurrentDomainResponse { hostname: None }));
    }
}
