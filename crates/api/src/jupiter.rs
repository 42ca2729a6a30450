//! Jupiter swap quote API client.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, instrument};

/// Jupiter v6 quote endpoint.
pub const DEFAULT_QUOTE_URL: &str = "https://quote-api.jup.ag/v6/quote";

/// Default quote request timeout.
pub const DEFAULT_QUOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default slippage tolerance (0.5%).
pub const DEFAULT_SLIPPAGE_BPS: u16 = 50;

/// Swap quote failures.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("quote request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("quote API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("quote API error: {0}")]
    Api(String),

    #[error("invalid quote response: {0}")]
    Invalid(String),
}

/// Parameters for a quote request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuoteRequest {
    /// Input mint (base58)
    pub input_mint: String,
    /// Output mint (base58)
    pub output_mint: String,
    /// Input amount in the input token's smallest unit
    pub amount: u64,
    /// Slippage tolerance in basis points (e.g., 50 = 0.5%)
    pub slippage_bps: u16,
}

impl QuoteRequest {
    /// Create a request with the default slippage tolerance.
    pub fn new(input_mint: impl Into<String>, output_mint: impl Into<String>, amount: u64) -> Self {
        Self {
            input_mint: input_mint.into(),
            output_mint: output_mint.into(),
            amount,
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
        }
    }

    /// Set slippage tolerance.
    pub fn with_slippage_bps(mut self, slippage_bps: u16) -> Self {
        self.slippage_bps = slippage_bps;
        self
    }
}

/// Quoted swap route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwapRoute {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: u64,
    /// Expected output amount
    pub out_amount: u64,
    /// Minimum output after slippage
    pub min_out_amount: u64,
    pub slippage_bps: u16,
    /// Price impact percentage (if reported)
    pub price_impact_pct: Option<f64>,
    pub legs: Vec<RouteLeg>,
}

impl SwapRoute {
    /// Check if this is a direct swap (single leg).
    pub fn is_direct(&self) -> bool {
        self.legs.len() == 1
    }

    /// AMM labels along the route, in order.
    pub fn labels(&self) -> Vec<&str> {
        self.legs.iter().map(|l| l.label.as_str()).collect()
    }
}

/// One AMM hop within a route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteLeg {
    pub label: String,
    pub input_mint: String,
    pub output_mint: String,
    /// Share of the input routed through this leg
    pub percent: u8,
}

/// Swap route lookup.
#[async_trait]
pub trait SwapQuoter: Send + Sync + Debug {
    /// Quote `amount` of `input_mint` into `output_mint`.
    async fn quote(&self, request: &QuoteRequest) -> Result<SwapRoute, QuoteError>;
}

#[derive(Clone)]
struct CachedRoute {
    route: SwapRoute,
    cached_at: Instant,
}

/// Jupiter quote client with a short-lived route cache.
#[derive(Clone)]
pub struct JupiterClient {
    client: reqwest::Client,
    quote_url: String,
    cache: Arc<DashMap<QuoteRequest, CachedRoute>>,
    cache_ttl: Duration,
}

impl Debug for JupiterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JupiterClient")
            .field("quote_url", &self.quote_url)
            .field("cache_size", &self.cache.len())
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}

impl Default for JupiterClient {
    fn default() -> Self {
        Self::new()
    }
}

impl JupiterClient {
    /// Create a client against the public quote endpoint.
    pub fn new() -> Self {
        Self::with_quote_url(DEFAULT_QUOTE_URL)
    }

    /// Create a client with a custom quote endpoint.
    pub fn with_quote_url(quote_url: impl Into<String>) -> Self {
        Self {
            client: http_client(DEFAULT_QUOTE_TIMEOUT),
            quote_url: quote_url.into(),
            cache: Arc::new(DashMap::new()),
            cache_ttl: Duration::from_secs(5),
        }
    }

    /// Set cache TTL.
    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    /// Bound every quote request by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, QuoteError> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// Clear expired entries from cache.
    pub fn cleanup_cache(&self) {
        self.cache
            .retain(|_, cached| cached.cached_at.elapsed() < self.cache_ttl);
    }

    /// Get current cache size.
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    #[instrument(skip(self), fields(input = %request.input_mint, output = %request.output_mint))]
    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<SwapRoute, QuoteError> {
        let response = self
            .client
            .get(&self.quote_url)
            .query(&[
                ("inputMint", request.input_mint.clone()),
                ("outputMint", request.output_mint.clone()),
                ("amount", request.amount.to_string()),
                ("slippageBps", request.slippage_bps.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(QuoteError::Status { status, body });
        }

        let quote: QuoteResponse = response.json().await?;
        let route = quote.into_route()?;

        debug!(
            legs = route.legs.len(),
            out_amount = route.out_amount,
            "Got swap quote"
        );

        Ok(route)
    }
}

/// Client with a request timeout; falls back to reqwest's defaults if the
/// builder cannot initialize.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

#[async_trait]
impl SwapQuoter for JupiterClient {
    async fn quote(&self, request: &QuoteRequest) -> Result<SwapRoute, QuoteError> {
        if let Some(cached) = self.cache.get(request) {
            if cached.cached_at.elapsed() < self.cache_ttl {
                debug!(
                    cache_age_ms = cached.cached_at.elapsed().as_millis(),
                    "Cache hit for swap quote"
                );
                return Ok(cached.route.clone());
            }
        }

        let route = self.fetch_quote(request).await?;
        self.cache.insert(
            request.clone(),
            CachedRoute {
                route: route.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(route)
    }
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    input_mint: String,
    #[serde(default)]
    in_amount: String,
    #[serde(default)]
    output_mint: String,
    #[serde(default)]
    out_amount: String,
    #[serde(default)]
    other_amount_threshold: String,
    #[serde(default)]
    slippage_bps: u16,
    #[serde(default)]
    price_impact_pct: Option<String>,
    #[serde(default)]
    route_plan: Vec<RoutePlanStep>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutePlanStep {
    swap_info: SwapInfo,
    percent: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapInfo {
    #[serde(default)]
    label: Option<String>,
    input_mint: String,
    output_mint: String,
}

impl QuoteResponse {
    fn into_route(self) -> Result<SwapRoute, QuoteError> {
        if let Some(error) = self.error {
            return Err(QuoteError::Api(error));
        }

        let amount = |field: &str, raw: &str| -> Result<u64, QuoteError> {
            raw.parse()
                .map_err(|_| QuoteError::Invalid(format!("{field} '{raw}' is not an integer")))
        };

        Ok(SwapRoute {
            in_amount: amount("inAmount", &self.in_amount)?,
            out_amount: amount("outAmount", &self.out_amount)?,
            min_out_amount: amount("otherAmountThreshold", &self.other_amount_threshold)?,
            input_mint: self.input_mint,
            output_mint: self.output_mint,
            slippage_bps: self.slippage_bps,
            price_impact_pct: self.price_impact_pct.and_then(|s| s.parse().ok()),
            legs: self
                .route_plan
                .into_iter()
                .map(|step| RouteLeg {
                    label: step.swap_info.label.unwrap_or_else(|| "unknown".to_string()),
                    input_mint: step.swap_info.input_mint,
                    output_mint: step.swap_info.output_mint,
                    percent: step.percent,
                })
                .collect(),
        })
    }
}
