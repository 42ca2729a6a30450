//! Narrative risk analysis through the Anthropic Messages API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Messages API endpoint.
pub const DEFAULT_NARRATION_URL: &str = "https://api.anthropic.com/v1/messages";

/// Model used for narration unless configured otherwise.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default narration request timeout.
pub const DEFAULT_NARRATION_TIMEOUT: Duration = Duration::from_secs(30);

const API_VERSION: &str = "2023-06-01";

/// Narration failures.
#[derive(Debug, Error)]
pub enum NarrationError {
    #[error("no API key configured for narration")]
    MissingApiKey,

    #[error("narration request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("narration API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("narration response contained no text")]
    Empty,
}

/// Position figures handed to the narrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionBrief {
    pub protocol: String,
    /// `None` when the position carries no debt
    pub health_factor: Option<f64>,
    pub collateral_usd: f64,
    pub debt_usd: f64,
    pub risk_level: String,
    pub tokens_collateral: Vec<String>,
    pub tokens_debt: Vec<String>,
}

impl PositionBrief {
    /// Analysis prompt for this position.
    pub fn prompt(&self) -> String {
        let health_factor = self
            .health_factor
            .map(|hf| format!("{hf:.4}"))
            .unwrap_or_else(|| "n/a (no debt)".to_string());

        format!(
            "Assess the liquidation risk of this Solana lending position.\n\n\
             Protocol: {}\n\
             Health factor: {}\n\
             Collateral: ${:.2} ({})\n\
             Debt: ${:.2} ({})\n\
             Risk level: {}\n\n\
             Reply with:\n\
             1. A risk score from 1 to 10\n\
             2. The main risk drivers\n\
             3. A recommended action (hold / add_collateral / repay_debt / emergency_withdraw)\n\
             4. A suggested amount for that action in USD\n\
             5. Two or three sentences of reasoning",
            self.protocol,
            health_factor,
            self.collateral_usd,
            self.tokens_collateral.join(", "),
            self.debt_usd,
            self.tokens_debt.join(", "),
            self.risk_level,
        )
    }
}

/// Narrative produced for a position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Narration {
    pub text: String,
    pub model: String,
}

/// Text-generation collaborator.
#[async_trait]
pub trait Summarizer: Send + Sync + Debug {
    async fn summarize(&self, brief: &PositionBrief) -> Result<Narration, NarrationError>;
}

/// Anthropic Messages API narrator.
#[derive(Clone)]
pub struct AnthropicNarrator {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
}

impl Debug for AnthropicNarrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicNarrator")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

impl AnthropicNarrator {
    /// Create a narrator. A missing key fails each call instead of construction.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: crate::jupiter::http_client(DEFAULT_NARRATION_TIMEOUT),
            api_url: DEFAULT_NARRATION_URL.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 500,
        }
    }

    /// Set a custom endpoint.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Bound every narration request by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, NarrationError> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// Set the response token limit.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl MessagesResponse {
    fn text(self) -> Option<String> {
        let text: String = self
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");
        (!text.trim().is_empty()).then_some(text)
    }
}

#[async_trait]
impl Summarizer for AnthropicNarrator {
    #[instrument(skip(self, brief), fields(protocol = %brief.protocol, model = %self.model))]
    async fn summarize(&self, brief: &PositionBrief) -> Result<Narration, NarrationError> {
        let api_key = self.api_key.as_deref().ok_or(NarrationError::MissingApiKey)?;

        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{"role": "user", "content": brief.prompt()}],
        });

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NarrationError::Status { status, body });
        }

        let parsed: MessagesResponse = response.json().await?;
        let text = parsed.text().ok_or(NarrationError::Empty)?;
        debug!(chars = text.len(), "Narration received");

        Ok(Narration {
            text,
            model: self.model.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brief() -> PositionBrief {
        PositionBrief {
            protocol: "Kamino".into(),
            health_factor: Some(1.34),
            collateral_usd: 5200.0,
            debt_usd: 3880.0,
            risk_level: "warning".into(),
            tokens_collateral: vec!["SOL".into(), "mSOL".into()],
            tokens_debt: vec!["USDC".into()],
        }
    }

    #[test]
    fn test_prompt_contains_figures() {
        let prompt = brief().prompt();
        assert!(prompt.contains("Protocol: Kamino"));
        assert!(prompt.contains("Health factor: 1.3400"));
        assert!(prompt.contains("$5200.00 (SOL, mSOL)"));
        assert!(prompt.contains("$3880.00 (USDC)"));
    }

    #[test]
    fn test_prompt_without_debt() {
        let mut brief = brief();
        brief.health_factor = None;
        assert!(brief.prompt().contains("n/a (no debt)"));
    }

    #[test]
    fn test_response_text_joins_blocks() {
        let parsed: MessagesResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "Risk score: 6"},
                {"type": "text", "text": "Add collateral."}
            ]
        }))
        .unwrap();
        assert_eq!(parsed.text().unwrap(), "Risk score: 6\nAdd collateral.");

        let empty: MessagesResponse = serde_json::from_value(json!({"content": []})).unwrap();
        assert!(empty.text().is_none());
    }

    #[tokio::test]
    async fn test_stalled_narration_times_out() {
        let narrator = AnthropicNarrator::new(Some("key".into()))
            .with_api_url(crate::jupiter::tests::stalled_endpoint().await)
            .with_timeout(Duration::from_millis(100))
            .unwrap();

        let started = std::time::Instant::now();
        let result = narrator.summarize(&brief()).await;
        assert!(matches!(result, Err(NarrationError::Http(ref e)) if e.is_timeout()));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_request() {
        let narrator = AnthropicNarrator::new(None).with_api_url("http://127.0.0.1:1");
        assert!(matches!(
            narrator.summarize(&brief()).await,
            Err(NarrationError::MissingApiKey)
        ));
    }
}
