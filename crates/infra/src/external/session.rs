//! Outbound transport with credential refresh.
//!
//! `AuthenticatedTransport` wraps any `Transport`. On a 401 it refreshes the
//! credentials and retries the request exactly once; a second 401, or a
//! refresh that fails, ends in `ReauthenticationRequired`.

use serde_json::Value as JsonValue;
use thiserror::Error;

pub const STATUS_UNAUTHORIZED: u16 = 401;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<JsonValue>,
    pub bearer_token: Option<String>,
}

impl OutboundRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            bearer_token: None,
        }
    }

    pub fn post(path: impl Into<String>, body: JsonValue) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
            bearer_token: None,
        }
    }

    pub fn with_bearer(&self, token: impl Into<String>) -> Self {
        Self {
            bearer_token: Some(token.into()),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundResponse {
    pub status: u16,
    pub body: JsonValue,
}

impl OutboundResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("collaborator unreachable: {0}")]
    Unreachable(String),

    #[error("collaborator answered {status}: {message}")]
    Status { status: u16, message: String },

    #[error("could not decode collaborator response: {0}")]
    Decode(String),

    #[error("credentials unavailable: {0}")]
    Credentials(String),

    /// Refreshing did not help; a human or the session owner must log in again.
    #[error("re-authentication required: {0}")]
    ReauthenticationRequired(String),
}

/// Anything that can carry a request to a collaborator.
pub trait Transport: Send + Sync {
    fn send(&self, request: &OutboundRequest) -> Result<OutboundResponse, TransportError>;
}

impl<T> Transport for std::sync::Arc<T>
where
    T: Transport + ?Sized,
{
    fn send(&self, request: &OutboundRequest) -> Result<OutboundResponse, TransportError> {
        (**self).send(request)
    }
}

/// Source of bearer tokens for outbound calls.
pub trait CredentialSource: Send + Sync {
    fn current(&self) -> Result<String, TransportError>;

    /// Obtain a fresh token, replacing the current one.
    fn refresh(&self) -> Result<String, TransportError>;
}

#[derive(Debug, Clone)]
pub struct AuthenticatedTransport<T, C> {
    inner: T,
    credentials: C,
}

impl<T, C> AuthenticatedTransport<T, C>
where
    T: Transport,
    C: CredentialSource,
{
    pub fn new(inner: T, credentials: C) -> Self {
        Self { inner, credentials }
    }
}

impl<T, C> Transport for AuthenticatedTransport<T, C>
where
    T: Transport,
    C: CredentialSource,
{
    fn send(&self, request: &OutboundRequest) -> Result<OutboundResponse, TransportError> {
        let token = self.credentials.current()?;
        let response = self.inner.send(&request.with_bearer(token))?;
        if response.status != STATUS_UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!(path = %request.path, "collaborator rejected credentials; refreshing once");
        let token = self.credentials.refresh().map_err(|err| {
            tracing::warn!(path = %request.path, error = %err, "credential refresh failed");
            TransportError::ReauthenticationRequired(err.to_string())
        })?;

        let response = self.inner.send(&request.with_bearer(token))?;
        if response.status == STATUS_UNAUTHORIZED {
            tracing::warn!(path = %request.path, "refreshed credentials rejected");
            return Err(TransportError::ReauthenticationRequired(
                "refreshed credentials were rejected".to_string(),
            ));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Answers with a scripted sequence of statuses and records the tokens it saw.
    struct ScriptedTransport {
        statuses: Mutex<VecDeque<u16>>,
        seen_tokens: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedTransport {
        fn new(statuses: &[u16]) -> Self {
            Self {
                statuses: Mutex::new(statuses.iter().copied().collect()),
                seen_tokens: Mutex::new(vec![]),
            }
        }

        fn calls(&self) -> usize {
            self.seen_tokens.lock().unwrap().len()
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&self, request: &OutboundRequest) -> Result<OutboundResponse, TransportError> {
            self.seen_tokens.lock().unwrap().push(request.bearer_token.clone());
            let status = self
                .statuses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| TransportError::Unreachable("script exhausted".into()))?;
            Ok(OutboundResponse {
                status,
                body: json!({}),
            })
        }
    }

    struct CountingCredentials {
        refreshes: AtomicU32,
        fail_refresh: bool,
    }

    impl CountingCredentials {
        fn new(fail_refresh: bool) -> Self {
            Self {
                refreshes: AtomicU32::new(0),
                fail_refresh,
            }
        }
    }

    impl CredentialSource for CountingCredentials {
        fn current(&self) -> Result<String, TransportError> {
            Ok(format!("token-{}", self.refreshes.load(Ordering::SeqCst)))
        }

        fn refresh(&self) -> Result<String, TransportError> {
            if self.fail_refresh {
                return Err(TransportError::Credentials("refresh token expired".into()));
            }
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("token-{n}"))
        }
    }

    #[test]
    fn success_passes_through_without_refresh() {
        let inner = std::sync::Arc::new(ScriptedTransport::new(&[200]));
        let transport = AuthenticatedTransport::new(inner.clone(), CountingCredentials::new(false));

        let response = transport.send(&OutboundRequest::get("/ping")).unwrap();
        assert!(response.is_success());
        assert_eq!(inner.calls(), 1);
    }

    #[test]
    fn unauthorized_refreshes_and_retries_once() {
        let inner = std::sync::Arc::new(ScriptedTransport::new(&[401, 200]));
        let credentials = CountingCredentials::new(false);
        let transport = AuthenticatedTransport::new(inner.clone(), credentials);

        let response = transport.send(&OutboundRequest::get("/ping")).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(
            *inner.seen_tokens.lock().unwrap(),
            vec![Some("token-0".to_string()), Some("token-1".to_string())]
        );
    }

    #[test]
    fn second_unauthorized_escalates() {
        let inner = std::sync::Arc::new(ScriptedTransport::new(&[401, 401, 200]));
        let transport = AuthenticatedTransport::new(inner.clone(), CountingCredentials::new(false));

        let err = transport.send(&OutboundRequest::get("/ping")).unwrap_err();
        assert!(matches!(err, TransportError::ReauthenticationRequired(_)));
        assert_eq!(inner.calls(), 2);
    }

    #[test]
    fn failed_refresh_escalates_without_retrying() {
        let inner = std::sync::Arc::new(ScriptedTransport::new(&[401, 200]));
        let transport = AuthenticatedTransport::new(inner.clone(), CountingCredentials::new(true));

        let err = transport.send(&OutboundRequest::get("/ping")).unwrap_err();
        assert!(matches!(err, TransportError::ReauthenticationRequired(_)));
        assert_eq!(inner.calls(), 1);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let inner = std::sync::Arc::new(ScriptedTransport::new(&[503]));
        let transport = AuthenticatedTransport::new(inner.clone(), CountingCredentials::new(false));

        let response = transport.send(&OutboundRequest::get("/ping")).unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(inner.calls(), 1);
    }
}
