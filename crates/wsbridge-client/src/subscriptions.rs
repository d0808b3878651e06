//! Subscription execution and replay reports.
//!
//! Every subscription yields its own [`SubscriptionResult`]. A failure is
//! logged with the endpoint identity and recorded; it never stops the
//! remaining subscriptions and never touches connection state.

use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;
use wsbridge_core::subscription::DEFAULT_CONTENT_TYPE;
use wsbridge_core::{Headers, HttpSubscription, LinkRef, Subscription};
use wsbridge_http::{HttpClient, HttpRequest};

use crate::connection::WsClient;
use crate::errors::SubscriptionError;
use crate::tasks::TaskContext;

const CONTENT_TYPE: &str = "Content-Type";

/// What a successful subscription did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionOutcome {
    /// Message body queued on the WebSocket.
    Sent,
    /// HTTP call completed with a 2xx status.
    Completed {
        /// Response status.
        status: u16,
    },
}

/// Outcome of one subscription.
pub type SubscriptionResult = Result<SubscriptionOutcome, SubscriptionError>;

/// Why a replay ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayTrigger {
    /// Full replay after entering CONNECTED.
    Connected,
    /// Single task registered while already CONNECTED.
    LateRegistration,
}

/// Results of one task within a replay.
#[derive(Clone, Debug)]
pub struct TaskReport {
    /// Link the task is registered under.
    pub link: LinkRef,
    /// Per-subscription results, in declaration order.
    pub results: Vec<SubscriptionResult>,
}

/// Results of one replay.
#[derive(Clone, Debug)]
pub struct ReplayReport {
    /// Why the replay ran.
    pub trigger: ReplayTrigger,
    /// Tasks that ran to completion, in execution order.
    pub tasks: Vec<TaskReport>,
}

impl ReplayReport {
    /// Number of failed subscriptions across all tasks.
    pub fn failures(&self) -> usize {
        self.tasks
            .iter()
            .flat_map(|t| &t.results)
            .filter(|r| r.is_err())
            .count()
    }
}

/// Executes subscriptions against a client and the shared HTTP collaborator.
#[derive(Clone)]
pub struct SubscriptionExecutor {
    http: Arc<dyn HttpClient>,
}

impl SubscriptionExecutor {
    /// Executor issuing HTTP subscriptions through `http`.
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    /// Execute `subscriptions` in order.
    ///
    /// Stops starting new subscriptions once `ctx` is cancelled; the
    /// remaining ones are reported as [`SubscriptionError::Cancelled`].
    pub async fn execute_all(
        &self,
        ctx: &TaskContext,
        subscriptions: &[Subscription],
    ) -> Vec<SubscriptionResult> {
        let mut results = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            if ctx.is_cancelled() {
                results.push(Err(SubscriptionError::Cancelled));
                continue;
            }
            results.push(self.execute(ctx.client(), subscription).await);
        }
        results
    }

    /// Execute one subscription.
    pub async fn execute(&self, client: &WsClient, subscription: &Subscription) -> SubscriptionResult {
        match subscription {
            Subscription::Message { body } => match client.send_message(body.clone()) {
                Ok(()) => Ok(SubscriptionOutcome::Sent),
                Err(e) => {
                    warn!(endpoint = %client.uri(), error = %e, "message subscription not sent");
                    Err(SubscriptionError::Send(e.to_string()))
                }
            },
            Subscription::Http(http) => self.execute_http(client, http).await,
        }
    }

    async fn execute_http(&self, client: &WsClient, sub: &HttpSubscription) -> SubscriptionResult {
        let endpoint = client.uri();
        let uri = match validate_uri(sub) {
            Ok(uri) => uri,
            Err(e) => {
                warn!(endpoint, error = %e, "skipping http subscription");
                return Err(e);
            }
        };
        let method = sub.effective_method();

        let mut base = client.endpoint().headers.clone();
        if let Some(auth) = client.auth_header() {
            auth.apply(&mut base);
        }
        let headers = effective_headers(&base, sub);

        let mut request = HttpRequest::new(method, uri.clone()).with_headers(headers);
        if let Some(body) = &sub.body {
            request = request.with_body(body.clone());
        }

        match self.http.execute(request).await {
            Ok(response) if response.is_success() => {
                debug!(endpoint, %method, uri, status = response.status, "http subscription completed");
                Ok(SubscriptionOutcome::Completed {
                    status: response.status,
                })
            }
            Ok(response) => {
                warn!(endpoint, %method, uri, status = response.status, "http subscription returned non-success status");
                Err(SubscriptionError::Status {
                    method: method.to_string(),
                    uri,
                    status: response.status,
                })
            }
            Err(e) => {
                warn!(endpoint, %method, uri, error = %e, "http subscription call failed");
                Err(SubscriptionError::Call {
                    method: method.to_string(),
                    uri,
                    message: e.to_string(),
                })
            }
        }
    }
}

fn validate_uri(sub: &HttpSubscription) -> Result<String, SubscriptionError> {
    let raw = sub
        .uri
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(SubscriptionError::MissingUri)?;
    let url = Url::parse(raw).map_err(|e| SubscriptionError::InvalidUri {
        uri: raw.to_owned(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SubscriptionError::InvalidUri {
            uri: raw.to_owned(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    Ok(url.to_string())
}

/// Headers for one HTTP subscription call.
///
/// `base` already carries the connection's credential header. Overrides are
/// merged with replace semantics. The content type comes from the
/// subscription, then any inherited header, then the default.
pub fn effective_headers(base: &Headers, sub: &HttpSubscription) -> Headers {
    let mut headers = base.merged_with(&sub.headers);
    if let Some(content_type) = sub.content_type.as_deref().filter(|c| !c.trim().is_empty()) {
        headers.insert(CONTENT_TYPE, content_type);
    } else if !headers.contains(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, DEFAULT_CONTENT_TYPE);
    }
    headers
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
