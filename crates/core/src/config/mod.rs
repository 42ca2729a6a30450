//! Configuration for the position monitor.
//!
//! This module provides:
//! - Monitor runtime configuration (profiles, timeouts, fallback policy)
//! - Source descriptor overrides per protocol
//! - Swap asset table and narration settings

mod monitor;

pub use monitor::{
    config, init_config, AggregationConfig, AssetInfo, FallbackMode, MonitorConfig,
    NarrationConfig, RpcConfig, SimulationConfig, SourceOverride, SourcesConfig, SwapConfig,
    PUBLIC_RPC_URL,
};
