use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::error::TransmissionError;

/// Header carrying the CSRF session token.
pub const SESSION_HEADER: &str = "X-Transmission-Session-Id";

#[derive(Debug, Deserialize)]
struct Envelope {
    result: String,
    #[serde(default)]
    arguments: Value,
}

/// JSON-RPC client for one daemon.
///
/// The daemon answers `409 Conflict` with a fresh session id whenever the one
/// we send is missing or stale; the call is then repeated once with that id.
pub struct RpcClient {
    http: Client,
    url: Url,
    credentials: Option<(String, Option<String>)>,
    session_id: RwLock<String>,
}

impl RpcClient {
    /// Build a client for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new(
        url: Url,
        credentials: Option<(String, Option<String>)>,
        timeout: Duration,
    ) -> Result<Self, TransmissionError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| TransmissionError::Transport {
                method: "build_client",
                source,
            })?;
        Ok(Self {
            http,
            url,
            credentials,
            session_id: RwLock::new(String::new()),
        })
    }

    /// Invoke `method` and return its `arguments` object.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures, non-200 statuses, or a
    /// `result` other than `success`.
    pub async fn call(
        &self,
        method: &'static str,
        arguments: Value,
    ) -> Result<Value, TransmissionError> {
        let body = json!({ "method": method, "arguments": arguments });
        let mut response = self.send(method, &body).await?;
        if response.status() == StatusCode::CONFLICT {
            let fresh = response
                .headers()
                .get(SESSION_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .ok_or(TransmissionError::SessionRejected { method })?;
            debug!(method, "refreshed transmission session id");
            *self
                .session_id
                .write()
                .unwrap_or_else(PoisonError::into_inner) = fresh;
            response = self.send(method, &body).await?;
            if response.status() == StatusCode::CONFLICT {
                return Err(TransmissionError::SessionRejected { method });
            }
        }
        if response.status() != StatusCode::OK {
            return Err(TransmissionError::UnexpectedStatus {
                method,
                status: response.status().as_u16(),
            });
        }
        let raw = response
            .bytes()
            .await
            .map_err(|source| TransmissionError::Transport { method, source })?;
        let envelope: Envelope = serde_json::from_slice(&raw)
            .map_err(|source| TransmissionError::Decode { method, source })?;
        if envelope.result != "success" {
            return Err(TransmissionError::Rpc {
                method,
                result: envelope.result,
            });
        }
        Ok(envelope.arguments)
    }

    async fn send(
        &self,
        method: &'static str,
        body: &Value,
    ) -> Result<reqwest::Response, TransmissionError> {
        let session_id = self
            .session_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut request = self
            .http
            .post(self.url.clone())
            .header(SESSION_HEADER, session_id)
            .json(body);
        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, password.as_deref());
        }
        request
            .send()
            .await
            .map_err(|source| TransmissionError::Transport { method, source })
    }
}
