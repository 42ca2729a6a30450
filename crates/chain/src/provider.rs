//! JSON-RPC provider for Solana read calls.
//!
//! The rest of the workspace only sees [`RpcTransport`]: one method, raw JSON in,
//! raw JSON out. [`RpcProvider`] is the HTTP implementation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Fixed request timeout for provider calls.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised by an RPC transport.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("request to provider timed out")]
    Timeout,

    #[error("http error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed rpc envelope: {0}")]
    Envelope(String),
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}

/// Primitive JSON-RPC call boundary.
#[async_trait]
pub trait RpcTransport: Send + Sync + Debug {
    /// Issue `method(params)` and return the envelope's `result` member.
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Option<Value>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// HTTP JSON-RPC provider.
pub struct RpcProvider {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl Debug for RpcProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Provider URLs routinely embed API keys in the query string
        f.debug_struct("RpcProvider")
            .field("url", &redact_url(&self.url))
            .finish()
    }
}

impl RpcProvider {
    /// Create a provider with the default request timeout.
    pub fn new(url: impl Into<String>) -> Result<Self, RpcError> {
        Self::with_timeout(url, DEFAULT_RPC_TIMEOUT)
    }

    /// Create a provider with a custom request timeout.
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let url = url.into();
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        info!(
            url = %redact_url(&url),
            timeout_secs = timeout.as_secs(),
            "Initializing RPC provider"
        );

        Ok(Self {
            client,
            url,
            next_id: AtomicU64::new(1),
        })
    }

    /// Endpoint URL with any query string stripped.
    pub fn endpoint(&self) -> &str {
        redact_url(&self.url)
    }

    /// Get current slot (used as a connectivity probe).
    pub async fn slot(&self) -> Result<u64, RpcError> {
        let value = self.call("getSlot", json!([])).await?;
        value
            .as_u64()
            .ok_or_else(|| RpcError::Envelope(format!("expected slot number, got {value}")))
    }
}

#[async_trait]
impl RpcTransport for RpcProvider {
    #[instrument(skip(self, params), fields(endpoint = %self.endpoint()))]
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!(method, id, "Sending RPC request");

        let response = self.client.post(&self.url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::Status { status, body });
        }

        let envelope: RpcEnvelope = response.json().await?;
        unwrap_envelope(envelope)
    }
}

fn unwrap_envelope(envelope: RpcEnvelope) -> Result<Value, RpcError> {
    if let Some(err) = envelope.error {
        return Err(RpcError::Rpc {
            code: err.code,
            message: err.message,
        });
    }
    envelope
        .result
        .ok_or_else(|| RpcError::Envelope("response has neither result nor error".to_string()))
}

fn redact_url(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_error_takes_precedence() {
        let envelope: RpcEnvelope = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": [],
            "error": {"code": -32010, "message": "excluded from account secondary indexes"}
        }))
        .unwrap();

        match unwrap_envelope(envelope) {
            Err(RpcError::Rpc { code, message }) => {
                assert_eq!(code, -32010);
                assert!(message.contains("secondary indexes"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_envelope_without_result() {
        let envelope: RpcEnvelope =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1})).unwrap();
        assert!(matches!(unwrap_envelope(envelope), Err(RpcError::Envelope(_))));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let provider =
            RpcProvider::new("https://mainnet.helius-rpc.com/?api-key=secret").unwrap();
        let rendered = format!("{provider:?}");
        assert!(!rendered.contains("secret"));
        assert_eq!(provider.endpoint(), "https://mainnet.helius-rpc.com/");
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_provider_slot() {
        let provider = RpcProvider::new("https://api.mainnet-beta.solana.com").unwrap();
        assert!(provider.slot().await.unwrap() > 0);
    }
}
