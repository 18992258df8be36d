//! Webhook sender — templated outbound HTTP notifications.
//!
//! DESIGN
//! ======
//! A rule names either a GET URL or a POST URL with an optional body and
//! headers. `{key}` placeholders in the URL and body are substituted in a
//! single left-to-right pass, so a substituted value that happens to look
//! like a placeholder is never expanded again. Unknown placeholders are
//! left as written.
//!
//! ERROR HANDLING
//! ==============
//! Notifications are best-effort: no retries. The caller logs the returned
//! error and moves on.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Method;

use crate::config::NotifyRule;

/// Placeholder values for one notification (`name`, `mac`, `roaming.to`, ...).
pub type NotifyParams = BTreeMap<&'static str, String>;

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("http client build failed: {0}")]
    ClientBuild(String),
    #[error("rule has no url")]
    NoUrl,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {status}")]
    Status { status: u16 },
}

/// Outbound notification sink.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, rule: &NotifyRule, params: &NotifyParams) -> Result<(), NotificationError>;
}

// =============================================================================
// TEMPLATING
// =============================================================================

/// Substitute `{key}` placeholders with values from `params`.
#[must_use]
pub fn render(template: &str, params: &NotifyParams) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => match params.get(&after[..close]) {
                Some(value) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    // EDGE: not a placeholder (e.g. a JSON brace); rescan after it.
                    out.push('{');
                    rest = after;
                }
            },
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Fully rendered request, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
    pub headers: Vec<(String, String)>,
}

/// Render a rule. POST wins when both URLs are set.
///
/// # Errors
///
/// Returns [`NotificationError::NoUrl`] when the rule names no URL.
pub fn prepare(rule: &NotifyRule, params: &NotifyParams) -> Result<PreparedRequest, NotificationError> {
    let (method, url, body) = if !rule.http_post.is_empty() {
        (Method::POST, &rule.http_post, Some(render(&rule.http_post_content, params)))
    } else if !rule.http_get.is_empty() {
        (Method::GET, &rule.http_get, None)
    } else {
        return Err(NotificationError::NoUrl);
    };
    Ok(PreparedRequest {
        method,
        url: render(url, params),
        body,
        headers: rule
            .http_header
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    })
}

// =============================================================================
// HTTP NOTIFIER
// =============================================================================

pub struct HttpNotifier {
    client: reqwest::Client,
}

impl HttpNotifier {
    /// # Errors
    ///
    /// Returns [`NotificationError::ClientBuild`] if the TLS backend fails
    /// to initialize.
    pub fn new(timeout: Duration) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::ClientBuild(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, rule: &NotifyRule, params: &NotifyParams) -> Result<(), NotificationError> {
        let prepared = prepare(rule, params)?;
        let mut request = self.client.request(prepared.method.clone(), &prepared.url);
        for (name, value) in &prepared.headers {
            request = request.header(name, value);
        }
        if let Some(body) = prepared.body {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(NotificationError::Status { status: status.as_u16() });
        }
        tracing::debug!(
            method = %prepared.method,
            url = %prepared.url,
            status = status.as_u16(),
            resp_body_len = body.len(),
            "webhook: notification sent"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "webhook_test.rs"]
mod tests;
