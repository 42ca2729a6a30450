//! SolShield position engine.
//!
//! This crate provides the position monitoring core:
//! - Normalized position model and deterministic risk classification
//! - Per-protocol source adapters with scoped failures
//! - Concurrent aggregation with per-source deadlines
//! - Rebalance projection and confirmation-gated execution
//! - Per-wallet alert thresholds
//! - The tool-call surface used by the binary
//!
//! Supports Kamino, MarginFi and Solend lending positions on Solana.

mod aggregator;
mod alerts;
pub mod config;
mod error;
mod executor;
mod position;
mod registry;
mod service;
mod simulator;
mod source;
pub mod tools;

pub use aggregator::{Aggregator, SourceOutcome};
pub use alerts::{AlertBook, AlertLevel, AlertThresholds};
pub use config::{config, init_config, FallbackMode, MonitorConfig};
pub use error::{ServiceError, SourceError, SourceErrorKind};
pub use executor::{ExecutionOutcome, ExecutionReport, RebalanceExecutor, SwapPlan};
pub use position::{classify, Position, RiskLevel, TokenList};
pub use registry::SourceRegistry;
pub use service::{RiskAnalysis, SolShield};
pub use simulator::{PositionSnapshot, RebalanceAction, RebalanceSimulator, SimulationResult};
pub use source::{ProtocolAdapter, ReserveSymbols};
pub use tools::{ToolCall, ToolRequest};
