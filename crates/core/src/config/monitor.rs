//! Monitor configuration with profile support.
//!
//! Provides centralized configuration for the position monitor with support for
//! different profiles (default, demo, production) and TOML files.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use solshield_api::{
    DEFAULT_MODEL, DEFAULT_NARRATION_TIMEOUT, DEFAULT_NARRATION_URL, DEFAULT_QUOTE_TIMEOUT,
    DEFAULT_QUOTE_URL, DEFAULT_SLIPPAGE_BPS,
};
use solshield_chain::{Protocol, SourceDescriptor};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

/// Public mainnet endpoint, used when no provider is configured.
pub const PUBLIC_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

/// Main configuration structure containing all monitor parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Blockchain provider
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Per-protocol descriptor overrides
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Fan-out behaviour
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Rebalance projection parameters
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Swap quoting and asset table
    #[serde(default)]
    pub swap: SwapConfig,

    /// Risk narration
    #[serde(default)]
    pub narration: NarrationConfig,

    /// Reserve address -> token symbol. A `[reserves]` table replaces the
    /// main-market defaults.
    #[serde(default = "default_reserves")]
    pub reserves: BTreeMap<String, String>,
}

/// Main-market SOL and USDC reserves of Kamino and Solend.
fn default_reserves() -> BTreeMap<String, String> {
    [
        ("d4A2prbA2whesmvHaL88BH6Ewn5N4bTSU2Ze8P6Bc4Q", "SOL"),
        ("D6q6wuQSrifJKZYpR1M8R4YawnLDtDsMmWM1NbBmgJ59", "USDC"),
        ("8PbodeaosQP19SjYFx855UMqWxH2HynZLdBXmsrbac36", "SOL"),
        ("BgxfHJDzm44T7XG68MYKx7YisTjZu73tVovyZSjJMpmw", "USDC"),
    ]
    .into_iter()
    .map(|(reserve, symbol)| (reserve.to_string(), symbol.to_string()))
    .collect()
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Blockchain provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Explicit endpoint. Falls back to `SOLANA_RPC_URL`, then a Helius URL
    /// built from `HELIUS_API_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Per-request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl RpcConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Resolve the provider endpoint.
    pub fn endpoint(&self) -> String {
        if let Some(url) = self.url.as_ref().filter(|u| !u.is_empty()) {
            return url.clone();
        }
        if let Ok(url) = std::env::var("SOLANA_RPC_URL") {
            if !url.is_empty() {
                return url;
            }
        }
        match std::env::var("HELIUS_API_KEY") {
            Ok(key) if !key.is_empty() => {
                format!("https://mainnet.helius-rpc.com/?api-key={key}")
            }
            _ => PUBLIC_RPC_URL.to_string(),
        }
    }
}

/// Override for one protocol's source descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceOverride {
    /// Whether the protocol is registered at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_offset: Option<usize>,
}

fn default_enabled() -> bool {
    true
}

impl Default for SourceOverride {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            program_id: None,
            data_size: None,
            owner_offset: None,
        }
    }
}

/// Per-protocol source settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub kamino: SourceOverride,
    #[serde(default)]
    pub marginfi: SourceOverride,
    #[serde(default)]
    pub solend: SourceOverride,
}

impl SourcesConfig {
    pub fn get(&self, protocol: Protocol) -> &SourceOverride {
        match protocol {
            Protocol::Kamino => &self.kamino,
            Protocol::MarginFi => &self.marginfi,
            Protocol::Solend => &self.solend,
        }
    }

    pub fn is_enabled(&self, protocol: Protocol) -> bool {
        self.get(protocol).enabled
    }

    /// Built-in descriptor with any configured overrides applied.
    pub fn descriptor(&self, protocol: Protocol) -> SourceDescriptor {
        let overrides = self.get(protocol);
        let mut descriptor = protocol.descriptor();
        if let Some(program_id) = &overrides.program_id {
            descriptor.program_id = program_id.clone();
        }
        if let Some(data_size) = overrides.data_size {
            descriptor.data_size = data_size;
        }
        if let Some(owner_offset) = overrides.owner_offset {
            descriptor.owner_offset = owner_offset;
        }
        descriptor
    }
}

/// What a source reports when its provider call fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackMode {
    /// Report a transport `SourceError`
    #[default]
    Disabled,
    /// Emit the protocol's demonstration position, marked `synthetic`
    Demo,
}

/// Aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Deadline for each source, enforced independently (seconds)
    #[serde(default = "default_source_timeout")]
    pub source_timeout_secs: u64,

    #[serde(default)]
    pub fallback: FallbackMode,
}

fn default_source_timeout() -> u64 {
    20
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            source_timeout_secs: default_source_timeout(),
            fallback: FallbackMode::default(),
        }
    }
}

impl AggregationConfig {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }
}

/// Rebalance projection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Liquidation threshold used when it cannot be derived from the position
    #[serde(default = "default_liquidation_threshold")]
    pub default_liquidation_threshold: f64,

    /// Network fee estimate reported with each projection (SOL)
    #[serde(default = "default_estimated_fee")]
    pub estimated_fee_sol: f64,
}

fn default_liquidation_threshold() -> f64 {
    0.85
}
fn default_estimated_fee() -> f64 {
    0.005
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            default_liquidation_threshold: default_liquidation_threshold(),
            estimated_fee_sol: default_estimated_fee(),
        }
    }
}

/// Token mint and precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub mint: String,
    pub decimals: u8,
}

impl AssetInfo {
    fn new(mint: &str, decimals: u8) -> Self {
        Self {
            mint: mint.to_string(),
            decimals,
        }
    }
}

/// Swap quoting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapConfig {
    #[serde(default = "default_quote_url")]
    pub quote_url: String,

    /// Slippage tolerance (basis points)
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u16,

    /// Asset spent to fund rebalances
    #[serde(default = "default_funding_asset")]
    pub funding_asset: String,

    /// Quote cache lifetime (seconds)
    #[serde(default = "default_quote_cache_ttl")]
    pub quote_cache_ttl_secs: u64,

    /// Quote request timeout (seconds)
    #[serde(default = "default_quote_timeout")]
    pub request_timeout_secs: u64,

    /// Symbol -> mint/decimals
    #[serde(default = "default_assets")]
    pub assets: BTreeMap<String, AssetInfo>,
}

fn default_quote_url() -> String {
    DEFAULT_QUOTE_URL.to_string()
}
fn default_slippage_bps() -> u16 {
    DEFAULT_SLIPPAGE_BPS
}
fn default_funding_asset() -> String {
    "USDC".to_string()
}
fn default_quote_cache_ttl() -> u64 {
    5
}
fn default_quote_timeout() -> u64 {
    DEFAULT_QUOTE_TIMEOUT.as_secs()
}
fn default_assets() -> BTreeMap<String, AssetInfo> {
    BTreeMap::from([
        (
            "SOL".to_string(),
            AssetInfo::new("So11111111111111111111111111111111111111112", 9),
        ),
        (
            "mSOL".to_string(),
            AssetInfo::new("mSoLzYCxHdYgdzU16g5QSh3i5K3z3KZK7ytfqcJm7So", 9),
        ),
        (
            "JitoSOL".to_string(),
            AssetInfo::new("J1toso1uCk3RLmjorhTtrVwY9HJ7X8V9yYac6Y7kGCPn", 9),
        ),
        (
            "USDC".to_string(),
            AssetInfo::new("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", 6),
        ),
        (
            "USDT".to_string(),
            AssetInfo::new("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", 6),
        ),
    ])
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            quote_url: default_quote_url(),
            slippage_bps: default_slippage_bps(),
            funding_asset: default_funding_asset(),
            quote_cache_ttl_secs: default_quote_cache_ttl(),
            request_timeout_secs: default_quote_timeout(),
            assets: default_assets(),
        }
    }
}

impl SwapConfig {
    pub fn quote_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.quote_cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Case-insensitive asset lookup. Returns the canonical symbol.
    pub fn asset(&self, symbol: &str) -> Option<(&str, &AssetInfo)> {
        self.assets
            .iter()
            .find(|(s, _)| s.eq_ignore_ascii_case(symbol))
            .map(|(s, info)| (s.as_str(), info))
    }
}

/// Risk narration settings. The API key comes from `ANTHROPIC_API_KEY`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationConfig {
    #[serde(default = "default_narration_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Narration request timeout (seconds)
    #[serde(default = "default_narration_timeout")]
    pub request_timeout_secs: u64,
}

fn default_narration_url() -> String {
    DEFAULT_NARRATION_URL.to_string()
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_max_tokens() -> u32 {
    500
}
fn default_narration_timeout() -> u64 {
    DEFAULT_NARRATION_TIMEOUT.as_secs()
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            api_url: default_narration_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_narration_timeout(),
        }
    }
}

impl NarrationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn api_key(&self) -> Option<String> {
        std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            rpc: RpcConfig::default(),
            sources: SourcesConfig::default(),
            aggregation: AggregationConfig::default(),
            simulation: SimulationConfig::default(),
            swap: SwapConfig::default(),
            narration: NarrationConfig::default(),
            reserves: default_reserves(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("failed to parse {path}"))?;
        Ok(config)
    }

    /// Demo profile: provider failures produce labelled demonstration positions.
    pub fn demo() -> Self {
        Self {
            profile: "demo".to_string(),
            aggregation: AggregationConfig {
                source_timeout_secs: 10,
                fallback: FallbackMode::Demo,
            },
            ..Default::default()
        }
    }

    /// Production profile with tighter deadlines.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            rpc: RpcConfig {
                url: None,
                request_timeout_secs: 15,
            },
            aggregation: AggregationConfig {
                source_timeout_secs: 15,
                fallback: FallbackMode::Disabled,
            },
            swap: SwapConfig {
                quote_cache_ttl_secs: 3,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Get profile from environment variable SOLSHIELD_PROFILE, or default.
    /// Supported values: demo, production
    pub fn from_env() -> Self {
        let profile = std::env::var("SOLSHIELD_PROFILE").unwrap_or_else(|_| "default".to_string());
        match profile.to_lowercase().as_str() {
            "demo" => Self::demo(),
            "production" | "prod" => Self::production(),
            _ => Self::default(),
        }
    }

    /// Load from the file named by SOLSHIELD_CONFIG if set, else the env profile.
    pub fn load() -> anyhow::Result<Self> {
        let config = match std::env::var("SOLSHIELD_CONFIG") {
            Ok(path) if !path.is_empty() => Self::from_file(&path)?,
            _ => Self::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no operation could run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rpc.request_timeout_secs == 0 {
            bail!("rpc.request_timeout_secs must be positive");
        }
        if self.aggregation.source_timeout_secs == 0 {
            bail!("aggregation.source_timeout_secs must be positive");
        }
        if self.swap.request_timeout_secs == 0 || self.narration.request_timeout_secs == 0 {
            bail!("swap and narration request timeouts must be positive");
        }
        let lt = self.simulation.default_liquidation_threshold;
        if !(lt > 0.0 && lt <= 1.0) {
            bail!("simulation.default_liquidation_threshold must be in (0, 1], got {lt}");
        }
        if self.swap.slippage_bps > 10_000 {
            bail!("swap.slippage_bps must be at most 10000");
        }
        if self.swap.asset(&self.swap.funding_asset).is_none() {
            bail!(
                "swap.funding_asset {} is missing from swap.assets",
                self.swap.funding_asset
            );
        }
        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Monitor configuration loaded");
        for protocol in Protocol::ALL {
            let descriptor = self.sources.descriptor(protocol);
            tracing::info!(
                protocol = %protocol,
                enabled = self.sources.is_enabled(protocol),
                program = %descriptor.program_id,
                data_size = descriptor.data_size,
                owner_offset = descriptor.owner_offset,
                "Source descriptor"
            );
        }
        tracing::info!(
            request_timeout_secs = self.rpc.request_timeout_secs,
            source_timeout_secs = self.aggregation.source_timeout_secs,
            fallback = ?self.aggregation.fallback,
            "Aggregation parameters"
        );
        tracing::info!(
            funding_asset = %self.swap.funding_asset,
            slippage_bps = self.swap.slippage_bps,
            assets = self.swap.assets.len(),
            "Swap parameters"
        );
        tracing::info!(
            model = %self.narration.model,
            has_api_key = self.narration.api_key().is_some(),
            "Narration parameters"
        );
    }
}

static GLOBAL_CONFIG: OnceLock<MonitorConfig> = OnceLock::new();

/// Initialize global configuration.
pub fn init_config(config: MonitorConfig) {
    let _ = GLOBAL_CONFIG.set(config);
}

/// Get the global configuration, initializing from environment if needed.
pub fn config() -> &'static MonitorConfig {
    GLOBAL_CONFIG.get_or_init(MonitorConfig::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.rpc.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.aggregation.source_timeout(), Duration::from_secs(20));
        assert_eq!(config.aggregation.fallback, FallbackMode::Disabled);
        assert_eq!(config.swap.slippage_bps, 50);
        assert_eq!(config.narration.max_tokens, 500);
        assert_eq!(config.swap.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.narration.request_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_reserves_label_main_markets() {
        let config = MonitorConfig::default();
        assert_eq!(
            config.reserves["BgxfHJDzm44T7XG68MYKx7YisTjZu73tVovyZSjJMpmw"],
            "USDC"
        );
        // Every default symbol must be quotable
        for symbol in config.reserves.values() {
            assert!(config.swap.asset(symbol).is_some(), "{symbol} has no mint");
        }

        let config: MonitorConfig = toml::from_str("profile = \"custom\"").unwrap();
        assert_eq!(config.reserves, default_reserves());
    }

    #[test]
    fn test_demo_profile() {
        let config = MonitorConfig::demo();
        assert_eq!(config.profile, "demo");
        assert_eq!(config.aggregation.fallback, FallbackMode::Demo);
    }

    #[test]
    fn test_production_profile() {
        let config = MonitorConfig::production();
        assert_eq!(config.profile, "production");
        assert_eq!(config.aggregation.fallback, FallbackMode::Disabled);
        assert!(config.aggregation.source_timeout_secs < default_source_timeout());
    }

    #[test]
    fn test_partial_toml() {
        let config: MonitorConfig = toml::from_str(
            r#"
            profile = "custom"

            [aggregation]
            fallback = "demo"

            [sources.marginfi]
            enabled = false

            [sources.solend]
            owner_offset = 10

            [reserves]
            "d4A2prbA2whesmvHaL88BH6Ewn5N4bTSU2Ze8P6Bc4Q" = "SOL"
            "#,
        )
        .unwrap();

        assert_eq!(config.profile, "custom");
        assert_eq!(config.aggregation.fallback, FallbackMode::Demo);
        assert_eq!(config.aggregation.source_timeout_secs, 20);
        assert!(!config.sources.is_enabled(Protocol::MarginFi));
        assert!(config.sources.is_enabled(Protocol::Kamino));

        let solend = config.sources.descriptor(Protocol::Solend);
        assert_eq!(solend.owner_offset, 10);
        assert_eq!(solend.data_size, Protocol::Solend.descriptor().data_size);
        assert_eq!(config.reserves.len(), 1);
        assert_eq!(config.swap.assets.len(), 5);
    }

    #[test]
    fn test_asset_lookup_is_case_insensitive() {
        let swap = SwapConfig::default();
        let (symbol, info) = swap.asset("usdc").unwrap();
        assert_eq!(symbol, "USDC");
        assert_eq!(info.decimals, 6);
        assert!(swap.asset("BONK").is_none());
    }

    #[test]
    fn test_validation() {
        let mut config = MonitorConfig::default();
        config.swap.funding_asset = "BONK".to_string();
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.simulation.default_liquidation_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.aggregation.source_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.narration.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_rpc_url_wins() {
        let rpc = RpcConfig {
            url: Some("http://localhost:8899".to_string()),
            request_timeout_secs: 30,
        };
        assert_eq!(rpc.endpoint(), "http://localhost:8899");
    }

    #[test]
    fn test_serialization() {
        let config = MonitorConfig::demo();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("profile = \"demo\""));

        let parsed: MonitorConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.profile, "demo");
        assert_eq!(parsed.aggregation.fallback, FallbackMode::Demo);
    }
}
