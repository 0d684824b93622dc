//! Typed client for the conversation store and the campus assistant.
//!
//! The store speaks the deployed backend's wire format: Spanish field
//! names, one resource per endpoint, JSON bodies. Those names are part of
//! the contract and must not change.

use std::fmt;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::{Config, resolve_base_url};
use crate::loader::Message;

/// Deployed production backend. Serves both the record store and the
/// assistant endpoint.
pub const DEFAULT_BASE_URL: &str = "https://galgoai-backend.onrender.com";

/// One persisted user/assistant exchange, as stored by the backend.
///
/// A record may carry only one side of the exchange; empty strings mean
/// "absent", never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub user_email: String,
    #[serde(rename = "mensaje_usuario", default)]
    pub user_text: String,
    #[serde(rename = "respuesta_asistente", default)]
    pub assistant_text: String,
    /// Set by the store on insert; never sent on writes.
    #[serde(rename = "creado_en", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// The user-visible label for a session. At most one live record per
/// session id; writes are upserts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TitleRecord {
    #[serde(default)]
    pub session_id: String,
    #[serde(rename = "titulo", default)]
    pub title: String,
    #[serde(default)]
    pub user_email: String,
    #[serde(rename = "creado_en", default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConsultMessage<'a> {
    sender: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct ConsultRequest<'a> {
    mensajes: Vec<ConsultMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ConsultResponse {
    #[serde(default)]
    respuesta: Option<String>,
}

/// Categories of gateway errors for consistent error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// HTTP status error (4xx, 5xx)
    HttpStatus,
    /// Connection failure, timeout, or other transport-level problem
    Transport,
    /// Failed to parse the response body
    Decode,
}

impl fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayErrorKind::HttpStatus => write!(f, "http_status"),
            GatewayErrorKind::Transport => write!(f, "transport"),
            GatewayErrorKind::Decode => write!(f, "decode"),
        }
    }
}

/// Structured error from a remote call with kind and details.
#[derive(Debug, Clone)]
pub struct GatewayError {
    /// Error category
    pub kind: GatewayErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// Optional additional details (e.g., raw error body)
    pub details: Option<String>,
}

impl GatewayError {
    /// Creates a new gateway error.
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(status: u16, body: &str) -> Self {
        let message = format!("HTTP {status}");
        let details = if body.is_empty() {
            None
        } else {
            // The backend reports failures as {"error": "..."}
            if let Ok(json) = serde_json::from_str::<Value>(body)
                && let Some(msg) = json.get("error").and_then(|v| v.as_str())
            {
                return Self {
                    kind: GatewayErrorKind::HttpStatus,
                    message: format!("HTTP {status}: {msg}"),
                    details: Some(body.to_string()),
                };
            }
            Some(body.to_string())
        };
        Self {
            kind: GatewayErrorKind::HttpStatus,
            message,
            details,
        }
    }

    /// Creates a decode error carrying the offending body.
    pub fn decode(message: impl Into<String>, body: &str) -> Self {
        Self {
            kind: GatewayErrorKind::Decode,
            message: message.into(),
            details: if body.is_empty() {
                None
            } else {
                Some(body.to_string())
            },
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GatewayError {}

/// Result type for gateway operations.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

fn classify_reqwest_error(e: &reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::new(GatewayErrorKind::Transport, format!("Request timed out: {e}"))
    } else if e.is_connect() {
        GatewayError::new(GatewayErrorKind::Transport, format!("Connection failed: {e}"))
    } else {
        GatewayError::new(GatewayErrorKind::Transport, format!("Network error: {e}"))
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> GatewayResult<T> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(GatewayError::http_status(status.as_u16(), &body));
    }
    serde_json::from_str(&body)
        .map_err(|e| GatewayError::decode(format!("Failed to parse store response: {e}"), &body))
}

async fn read_ack(response: reqwest::Response) -> GatewayResult<()> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GatewayError::http_status(status.as_u16(), &body));
    }
    Ok(())
}

/// Resolved endpoints for one gateway instance.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the record store (`/historial`, `/titulos`,
    /// `/conversaciones`).
    pub api_base_url: String,
    /// Base URL of the assistant (`/consultar`). Usually the same host.
    pub assistant_base_url: String,
}

impl GatewayConfig {
    /// Resolves gateway endpoints from the loaded configuration.
    ///
    /// # Errors
    /// Returns an error if a configured or env-provided URL is malformed.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_base_url = resolve_base_url(
            config.api_base_url.as_deref(),
            "GALGO_API_URL",
            DEFAULT_BASE_URL,
            "store",
        )?;
        let assistant_base_url = resolve_base_url(
            config.assistant_base_url.as_deref(),
            "GALGO_ASSISTANT_URL",
            DEFAULT_BASE_URL,
            "assistant",
        )?;
        Ok(Self {
            api_base_url,
            assistant_base_url,
        })
    }
}

/// Client for the remote record store and the assistant endpoint.
///
/// Stateless: every method is a single request/response exchange. No
/// timeouts are configured; callers own the decision to wait.
pub struct RemoteGateway {
    config: GatewayConfig,
    http: reqwest::Client,
}

impl RemoteGateway {
    /// Creates a new gateway with the given endpoints.
    ///
    /// # Panics
    /// - In test builds (`#[cfg(test)]`), panics if either base URL is the
    ///   production backend.
    /// - At runtime, panics if `GALGO_BLOCK_REAL_API=1` and either base URL
    ///   is the production backend.
    ///
    /// This prevents tests from accidentally making real network requests.
    /// Use `GALGO_API_URL` / `GALGO_ASSISTANT_URL` env vars or config to
    /// point to a mock server.
    pub fn new(config: GatewayConfig) -> Self {
        // Compile-time guard for unit tests
        #[cfg(test)]
        if config.api_base_url == DEFAULT_BASE_URL || config.assistant_base_url == DEFAULT_BASE_URL
        {
            panic!(
                "Tests must not use the production backend!\n\
                 Set GALGO_API_URL to a mock server (e.g., wiremock).\n\
                 Found base_url: {}",
                config.api_base_url
            );
        }

        // Runtime guard for integration tests (set GALGO_BLOCK_REAL_API=1 in test harness)
        #[cfg(not(test))]
        if std::env::var("GALGO_BLOCK_REAL_API").is_ok_and(|v| v == "1")
            && (config.api_base_url == DEFAULT_BASE_URL
                || config.assistant_base_url == DEFAULT_BASE_URL)
        {
            panic!(
                "GALGO_BLOCK_REAL_API=1 but trying to use the production backend!\n\
                 Set GALGO_API_URL to a mock server.\n\
                 Found base_url: {}",
                config.api_base_url
            );
        }

        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Fetches every history record belonging to `email`, in store order.
    ///
    /// # Errors
    /// Returns an error on transport failure, non-success status, or an
    /// unparseable body.
    pub async fn fetch_history(&self, email: &str) -> GatewayResult<Vec<HistoryRecord>> {
        let url = format!("{}/historial", self.config.api_base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("email", email)])
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        read_json(response).await
    }

    /// Appends one history record.
    ///
    /// # Errors
    /// Returns an error on transport failure or non-success status.
    pub async fn append_history(&self, record: &HistoryRecord) -> GatewayResult<()> {
        let url = format!("{}/historial", self.config.api_base_url);
        let response = self
            .http
            .post(&url)
            .json(record)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        read_ack(response).await
    }

    /// Deletes every history record for `session_id`.
    ///
    /// # Errors
    /// Returns an error on transport failure or non-success status.
    pub async fn delete_history(&self, session_id: &str, email: &str) -> GatewayResult<()> {
        let url = format!("{}/conversaciones", self.config.api_base_url);
        let response = self
            .http
            .delete(&url)
            .json(&json!({ "session_id": session_id, "user_email": email }))
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        read_ack(response).await
    }

    /// Fetches every title record belonging to `email`, in store order.
    ///
    /// # Errors
    /// Returns an error on transport failure, non-success status, or an
    /// unparseable body.
    pub async fn fetch_titles(&self, email: &str) -> GatewayResult<Vec<TitleRecord>> {
        let url = format!("{}/titulos", self.config.api_base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("email", email)])
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        read_json(response).await
    }

    /// Upserts the title for `session_id`. Latest write wins.
    ///
    /// # Errors
    /// Returns an error on transport failure or non-success status.
    pub async fn upsert_title(
        &self,
        session_id: &str,
        title: &str,
        email: &str,
    ) -> GatewayResult<()> {
        let url = format!("{}/titulos", self.config.api_base_url);
        let response = self
            .http
            .put(&url)
            .json(&json!({
                "session_id": session_id,
                "titulo": title,
                "user_email": email,
            }))
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        read_ack(response).await
    }

    /// Deletes the title record for `session_id`.
    ///
    /// # Errors
    /// Returns an error on transport failure or non-success status.
    pub async fn delete_title(&self, session_id: &str, email: &str) -> GatewayResult<()> {
        let url = format!("{}/titulos", self.config.api_base_url);
        let response = self
            .http
            .delete(&url)
            .json(&json!({ "session_id": session_id, "user_email": email }))
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        read_ack(response).await
    }

    /// Sends the running transcript to the assistant and returns its reply.
    ///
    /// Blank-text messages are dropped from the payload. A reply body
    /// without a `respuesta` value (or with an empty one) is `Ok(None)`:
    /// the assistant chose silence, which is not an error.
    ///
    /// # Errors
    /// Returns an error on transport failure, non-success status, or an
    /// unparseable body.
    pub async fn consult(&self, messages: &[Message]) -> GatewayResult<Option<String>> {
        let mensajes: Vec<ConsultMessage<'_>> = messages
            .iter()
            .filter(|m| !m.text.is_empty())
            .map(|m| ConsultMessage {
                sender: m.sender.as_str(),
                text: &m.text,
            })
            .collect();
        let url = format!("{}/consultar", self.config.assistant_base_url);
        let response = self
            .http
            .post(&url)
            .json(&ConsultRequest { mensajes })
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        let reply: ConsultResponse = read_json(response).await?;
        Ok(reply.respuesta.filter(|r| !r.is_empty()))
    }
}
