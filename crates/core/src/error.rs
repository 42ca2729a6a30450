//! Error taxonomy for the position engine.

use serde::Serialize;
use solshield_api::QuoteError;
use solshield_chain::{DecodeError, Protocol, RpcError};
use thiserror::Error;

/// Category of a per-source failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    /// Provider call failed
    Transport,
    /// Source did not answer within its deadline
    Timeout,
    /// Accounts were returned but could not be turned into positions
    Decode,
}

/// A failure scoped to one protocol source.
///
/// Source failures are data: the aggregator returns them alongside positions
/// from the sources that succeeded.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{protocol} source {kind:?} error: {message}")]
pub struct SourceError {
    pub protocol: Protocol,
    pub kind: SourceErrorKind,
    #[serde(rename = "error")]
    pub message: String,
}

impl SourceError {
    /// A provider-side timeout is reported as [`SourceErrorKind::Timeout`].
    pub fn transport(protocol: Protocol, err: &RpcError) -> Self {
        let kind = match err {
            RpcError::Timeout => SourceErrorKind::Timeout,
            _ => SourceErrorKind::Transport,
        };
        Self {
            protocol,
            kind,
            message: err.to_string(),
        }
    }

    pub fn timeout(protocol: Protocol, after: std::time::Duration) -> Self {
        Self {
            protocol,
            kind: SourceErrorKind::Timeout,
            message: format!("no response within {}ms", after.as_millis()),
        }
    }

    pub fn decode(protocol: Protocol, err: &DecodeError) -> Self {
        Self {
            protocol,
            kind: SourceErrorKind::Decode,
            message: err.to_string(),
        }
    }
}

/// Errors surfaced to callers of the service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("no {protocol} position found for {wallet}")]
    NoPositionFound { protocol: Protocol, wallet: String },

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("invalid amount: {0} (must be a positive, finite USD value)")]
    InvalidAmount(f64),

    #[error("asset {0} has no configured mint")]
    UnknownAsset(String),

    #[error("invalid alert thresholds: {0}")]
    InvalidThreshold(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("swap quote failed: {0}")]
    Quote(#[from] QuoteError),
}

impl ServiceError {
    /// Stable machine-readable code for structured responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownProtocol(_) => "unknown_protocol",
            Self::NoPositionFound { .. } => "no_position_found",
            Self::InvalidAction(_) => "invalid_action",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::UnknownAsset(_) => "unknown_asset",
            Self::InvalidThreshold(_) => "invalid_threshold",
            Self::Source(_) => "source_error",
            Self::Quote(_) => "quote_error",
        }
    }
}
