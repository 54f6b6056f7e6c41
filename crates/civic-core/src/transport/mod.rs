//! The mutation boundary: sending an intent to the authoritative backend.
//!
//! A transport returns the raw JSON body on success. Deciding which response
//! shape arrived is the reconciler's job, not the transport's.

mod http;

pub use http::HttpTransport;

use std::collections::VecDeque;

use serde_json::Value;

use crate::error::ErrorCode;
use crate::mutation::MutationIntent;

/// Failure taxonomy for a mutation round-trip.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request never produced a response (DNS, connect, timeout).
    #[error("network failure: {0}")]
    Network(String),

    /// 401/403 from an authenticated call. Fatal to the current session.
    #[error("unauthorized (HTTP {status})")]
    Unauthorized { status: u16 },

    /// A 2xx whose non-empty body was not JSON.
    #[error("malformed response body: {0}")]
    Malformed(String),

    /// Any other non-2xx status.
    #[error("server rejected request (HTTP {status}): {body}")]
    Status { status: u16, body: String },
}

impl TransportError {
    /// Classify an HTTP status. Returns `None` for 2xx.
    #[must_use]
    pub fn from_status(status: u16, body: impl Into<String>) -> Option<Self> {
        match status {
            200..=299 => None,
            401 | 403 => Some(Self::Unauthorized { status }),
            _ => Some(Self::Status {
                status,
                body: body.into(),
            }),
        }
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Network(_) => ErrorCode::NetworkFailure,
            Self::Unauthorized { .. } => ErrorCode::SessionUnauthorized,
            Self::Malformed(_) => ErrorCode::UnrecognizedResponse,
            Self::Status { .. } => ErrorCode::ServerRejected,
        }
    }

    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Sends a mutation intent and returns the backend's JSON body.
pub trait MutationTransport {
    /// # Errors
    ///
    /// Returns a [`TransportError`] describing why no usable body arrived.
    fn submit(&mut self, intent: &MutationIntent) -> Result<Value, TransportError>;
}

/// Replays a queue of canned results, one per submit.
///
/// Used by tests and the `civic demo` command. Submitting past the end of
/// the script yields a network failure.
#[derive(Debug, Default, Clone)]
pub struct ScriptedTransport {
    script: VecDeque<Result<Value, TransportError>>,
    submitted: Vec<MutationIntent>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn respond(mut self, body: Value) -> Self {
        self.script.push_back(Ok(body));
        self
    }

    #[must_use]
    pub fn fail(mut self, err: TransportError) -> Self {
        self.script.push_back(Err(err));
        self
    }

    /// Intents received so far, in submit order.
    #[must_use]
    pub fn submitted(&self) -> &[MutationIntent] {
        &self.submitted
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl MutationTransport for ScriptedTransport {
    fn submit(&mut self, intent: &MutationIntent) -> Result<Value, TransportError> {
        self.submitted.push(intent.clone());
        self.script
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("script exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(TransportError::from_status(204, ""), None);
        assert_eq!(
            TransportError::from_status(401, ""),
            Some(TransportError::Unauthorized { status: 401 })
        );
        assert!(TransportError::from_status(403, "").is_some_and(|e| e.is_unauthorized()));
        assert_eq!(
            TransportError::from_status(409, "conflict"),
            Some(TransportError::Status {
                status: 409,
                body: "conflict".to_string()
            })
        );
    }

    #[test]
    fn codes_follow_taxonomy() {
        assert_eq!(
            TransportError::Network("x".into()).code(),
            ErrorCode::NetworkFailure
        );
        assert_eq!(
            TransportError::Unauthorized { status: 403 }.code(),
            ErrorCode::SessionUnauthorized
        );
        assert_eq!(
            TransportError::Malformed("x".into()).code(),
            ErrorCode::UnrecognizedResponse
        );
    }
}
