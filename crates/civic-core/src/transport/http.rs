use std::time::Duration;

use serde_json::{Value, json};

use super::{MutationTransport, TransportError};
use crate::config::EndpointConfig;
use crate::model::Issue;
use crate::mutation::{MutationIntent, MutationKind};

/// Blocking HTTP transport against the issue backend.
///
/// Every request carries `Authorization: Bearer <token>` when a token is set.
pub struct HttpTransport {
    agent: ureq::Agent,
    base_url: String,
    token: Option<String>,
}

impl HttpTransport {
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Build from config. Returns `None` when no base URL is configured.
    #[must_use]
    pub fn from_config(config: &EndpointConfig) -> Option<Self> {
        let base_url = config.base_url.as_deref()?;
        Some(Self::new(
            base_url,
            config.token(),
            Duration::from_millis(config.timeout_ms),
        ))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let request = self.agent.request(method, &self.url(path));
        match &self.token {
            Some(token) => request.set("Authorization", &format!("Bearer {token}")),
            None => request,
        }
    }

    /// Fetch one issue to seed a store.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] on transport failure, non-2xx status, or
    /// a body that is not an issue.
    pub fn fetch_issue(&self, id: &str) -> Result<Issue, TransportError> {
        let body = read_body(self.request("GET", &format!("/issues/{id}")).call())?;
        serde_json::from_value(body).map_err(|e| TransportError::Malformed(e.to_string()))
    }
}

/// Method, path, and JSON body for an intent.
fn route(intent: &MutationIntent) -> (&'static str, String, Value) {
    let id = &intent.entity_id;
    match &intent.kind {
        MutationKind::Upvote => (
            "PATCH",
            format!("/issues/{id}/upvote"),
            json!({ "user": intent.actor.id }),
        ),
        MutationKind::Assign { staff } => (
            "PATCH",
            format!("/issues/{id}/assign"),
            json!({ "staff": staff }),
        ),
        MutationKind::StatusChange { status } => (
            "PATCH",
            format!("/issues/{id}/status"),
            json!({ "status": status }),
        ),
    }
}

/// An empty 2xx body (e.g. 204 No Content) is `Value::Null`. It carries no
/// authoritative state, so the mutator handles it as an unrecognized shape
/// under the configured `unrecognized_response` policy.
fn parse_success_body(text: &str) -> Result<Value, TransportError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|e| TransportError::Malformed(e.to_string()))
}

fn read_body(result: Result<ureq::Response, ureq::Error>) -> Result<Value, TransportError> {
    match result {
        Ok(response) => response
            .into_string()
            .map_err(|e| TransportError::Network(e.to_string()))
            .and_then(|text| parse_success_body(&text)),
        Err(ureq::Error::Status(status, response)) => {
            let body = response.into_string().unwrap_or_default();
            Err(TransportError::from_status(status, body).unwrap_or_else(|| {
                TransportError::Status {
                    status,
                    body: String::new(),
                }
            }))
        }
        Err(ureq::Error::Transport(err)) => Err(TransportError::Network(err.to_string())),
    }
}

impl MutationTransport for HttpTransport {
    fn submit(&mut self, intent: &MutationIntent) -> Result<Value, TransportError> {
        let (method, path, body) = route(intent);
        tracing::debug!(method, path = %path, "submitting mutation");
        read_body(self.request(method, &path).send_json(body))
    }
}
