//! SolShield API clients for external services.
//!
//! This crate provides HTTP clients for:
//! - Jupiter: swap quotes for rebalancing
//! - Anthropic Messages API: narrative risk analysis of a position

mod jupiter;
mod narrator;

pub use jupiter::{
    JupiterClient, QuoteError, QuoteRequest, RouteLeg, SwapQuoter, SwapRoute, DEFAULT_QUOTE_TIMEOUT,
    DEFAULT_QUOTE_URL, DEFAULT_SLIPPAGE_BPS,
};
pub use narrator::{
    AnthropicNarrator, Narration, NarrationError, PositionBrief, Summarizer, DEFAULT_MODEL,
    DEFAULT_NARRATION_TIMEOUT, DEFAULT_NARRATION_URL,
};
