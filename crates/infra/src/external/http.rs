//! HTTP transport for outbound collaborator calls.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value as JsonValue;

use super::session::{CredentialSource, Method, OutboundRequest, OutboundResponse, Transport, TransportError};

/// Blocking `reqwest` transport rooted at a base URL.
///
/// The client is built on first use, on the calling thread. Callers inside an
/// async runtime must send from a blocking task.
#[derive(Debug)]
pub struct HttpTransport {
    base_url: String,
    timeout: Duration,
    client: OnceLock<Result<Client, String>>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            client: OnceLock::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn client(&self) -> Result<&Client, TransportError> {
        self.client
            .get_or_init(|| {
                Client::builder()
                    .timeout(self.timeout)
                    .build()
                    .map_err(|e| e.to_string())
            })
            .as_ref()
            .map_err(|e| TransportError::Unreachable(e.clone()))
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &OutboundRequest) -> Result<OutboundResponse, TransportError> {
        let client = self.client()?;
        let url = format!("{}{}", self.base_url, request.path);

        let mut req = match request.method {
            Method::Get => client.get(&url),
            Method::Post => client.post(&url),
        };
        if let Some(token) = &request.bearer_token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }

        let resp = req.send().map_err(|e| TransportError::Unreachable(e.to_string()))?;
        let status = resp.status().as_u16();
        let text = resp.text().map_err(|e| TransportError::Decode(e.to_string()))?;

        // Error pages are not always JSON; keep them readable.
        let body = if text.trim().is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_str(&text).unwrap_or(JsonValue::String(text))
        };

        tracing::debug!(%url, status, "collaborator answered");
        Ok(OutboundResponse { status, body })
    }
}

/// Fixed API token. It cannot be refreshed, so a rejected token escalates.
#[derive(Clone)]
pub struct StaticCredentials {
    token: String,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl core::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StaticCredentials").finish_non_exhaustive()
    }
}

impl CredentialSource for StaticCredentials {
    fn current(&self) -> Result<String, TransportError> {
        if self.token.is_empty() {
            return Err(TransportError::Credentials("no api token configured".to_string()));
        }
        Ok(self.token.clone())
    }

    fn refresh(&self) -> Result<String, TransportError> {
        Err(TransportError::Credentials("static api token cannot be refreshed".to_string()))
    }
}
