//! SolShield Position Monitor
//!
//! Liquidation risk monitor for Solana lending positions (Kamino, MarginFi, Solend).
//! Features:
//! - Concurrent per-protocol account scans with isolated failures
//! - Deterministic risk classification from health factors
//! - Rebalance simulation and confirmation-gated dry-run execution
//!
//! Reads one JSON tool request per line on stdin and writes one JSON response per
//! line on stdout. Logs go to stderr.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use solshield_api::{AnthropicNarrator, JupiterClient};
use solshield_chain::RpcProvider;
use solshield_core::{config, init_config, tools, MonitorConfig, SolShield, ToolRequest};

/// Environment variable names.
mod env {
    pub const LOG_JSON: &str = "SOLSHIELD_LOG_JSON";
}

/// Meta request answered with the tool definitions.
const LIST_TOOLS: &str = "list_tools";

const CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    // Use SOLSHIELD_CONFIG for a TOML file, or SOLSHIELD_PROFILE: demo, production
    let monitor_config = MonitorConfig::load().context("failed to load configuration")?;
    monitor_config.log_config();
    init_config(monitor_config);
    let config = config();

    let provider = RpcProvider::with_timeout(config.rpc.endpoint(), config.rpc.request_timeout())
        .context("failed to create RPC provider")?;
    match provider.slot().await {
        Ok(slot) => info!(slot, endpoint = %provider.endpoint(), "Connected to RPC provider"),
        Err(e) => warn!(error = %e, endpoint = %provider.endpoint(), "RPC provider unreachable"),
    }

    let quoter = Arc::new(
        JupiterClient::with_quote_url(&config.swap.quote_url)
            .with_cache_ttl(config.swap.quote_cache_ttl())
            .with_timeout(config.swap.request_timeout())
            .context("failed to create quote client")?,
    );
    spawn_cache_cleanup(quoter.clone());

    let narrator = AnthropicNarrator::new(config.narration.api_key())
        .with_api_url(&config.narration.api_url)
        .with_model(&config.narration.model)
        .with_max_tokens(config.narration.max_tokens)
        .with_timeout(config.narration.request_timeout())
        .context("failed to create narrator")?;

    let service = SolShield::from_config(config, Arc::new(provider), quoter, Arc::new(narrator));

    info!("SolShield ready, reading tool requests from stdin");
    serve(&service).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,solshield_core=debug,solshield_chain=debug"));
    let json = std::env::var(env::LOG_JSON)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    // stdout carries responses
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

fn spawn_cache_cleanup(quoter: Arc<JupiterClient>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CACHE_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            quoter.cleanup_cache();
        }
    });
}

async fn serve(service: &SolShield) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = respond(service, line).await;
        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    info!("stdin closed, shutting down");
    Ok(())
}

async fn respond(service: &SolShield, line: &str) -> Value {
    match serde_json::from_str::<ToolRequest>(line) {
        Ok(request) if request.tool == LIST_TOOLS => tools::definitions(),
        Ok(request) => tools::handle(service, request).await,
        Err(e) => {
            warn!(error = %e, "Malformed request");
            tools::error_response("invalid_request", &e.to_string())
        }
    }
}
