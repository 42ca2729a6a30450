//! Service facade over the position engine.

use std::sync::Arc;

use serde::Serialize;
use solshield_api::{Summarizer, SwapQuoter};
use solshield_chain::{Protocol, RpcTransport};
use tracing::{info, instrument, warn};

use crate::aggregator::{Aggregator, SourceOutcome};
use crate::alerts::{AlertBook, AlertLevel, AlertThresholds};
use crate::config::MonitorConfig;
use crate::error::ServiceError;
use crate::executor::{ExecutionOutcome, RebalanceExecutor};
use crate::position::Position;
use crate::registry::SourceRegistry;
use crate::simulator::{RebalanceAction, RebalanceSimulator, SimulationResult};

/// Position with its narrated risk assessment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAnalysis {
    pub position: Position,
    pub alert: AlertLevel,
    /// `None` when narration was unavailable
    pub ai_analysis: Option<String>,
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration_error: Option<String>,
}

/// Entry point for every position operation.
#[derive(Debug)]
pub struct SolShield {
    aggregator: Aggregator,
    simulator: RebalanceSimulator,
    executor: RebalanceExecutor,
    narrator: Arc<dyn Summarizer>,
    alerts: AlertBook,
}

impl SolShield {
    pub fn new(
        aggregator: Aggregator,
        simulator: RebalanceSimulator,
        executor: RebalanceExecutor,
        narrator: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            aggregator,
            simulator,
            executor,
            narrator,
            alerts: AlertBook::new(),
        }
    }

    /// Wire the engine from configuration and its external collaborators.
    pub fn from_config(
        config: &MonitorConfig,
        transport: Arc<dyn RpcTransport>,
        quoter: Arc<dyn SwapQuoter>,
        narrator: Arc<dyn Summarizer>,
    ) -> Self {
        let registry = Arc::new(SourceRegistry::from_config(config, transport));
        Self::new(
            Aggregator::new(registry, config.aggregation.source_timeout()),
            RebalanceSimulator::from_config(config),
            RebalanceExecutor::new(quoter, config),
            narrator,
        )
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn alerts(&self) -> &AlertBook {
        &self.alerts
    }

    /// Positions and per-source failures across the selected protocols.
    pub async fn fetch_all(&self, wallet: &str, filter: Option<&str>) -> Vec<SourceOutcome> {
        self.aggregator.fetch_all(wallet, filter).await
    }

    /// First position the wallet holds on `protocol`, if any.
    ///
    /// Holding nothing there is `Ok(None)`.
    pub async fn find_one(
        &self,
        wallet: &str,
        protocol: &str,
    ) -> Result<Option<Position>, ServiceError> {
        let protocol = self.resolve(protocol)?;
        Ok(self.aggregator.fetch_one(wallet, protocol).await?)
    }

    /// First position the wallet holds on `protocol`, required to exist.
    pub async fn fetch_one(&self, wallet: &str, protocol: &str) -> Result<Position, ServiceError> {
        let protocol = self.resolve(protocol)?;
        self.aggregator
            .fetch_one(wallet, protocol)
            .await?
            .ok_or_else(|| ServiceError::NoPositionFound {
                protocol,
                wallet: wallet.to_string(),
            })
    }

    /// Fetch one position and narrate its risk.
    ///
    /// `None` when the wallet holds no position on the protocol. A narration
    /// failure degrades to an analysis without text.
    #[instrument(skip(self))]
    pub async fn analyze(
        &self,
        wallet: &str,
        protocol: &str,
    ) -> Result<Option<RiskAnalysis>, ServiceError> {
        let Some(position) = self.find_one(wallet, protocol).await? else {
            info!("No position to analyze");
            return Ok(None);
        };
        let alert = self.alert_for(&position);

        let (ai_analysis, model, narration_error) =
            match self.narrator.summarize(&position.brief()).await {
                Ok(narration) => (Some(narration.text), Some(narration.model), None),
                Err(err) => {
                    warn!(error = %err, "Narration unavailable");
                    (None, None, Some(err.to_string()))
                }
            };

        Ok(Some(RiskAnalysis {
            position,
            alert,
            ai_analysis,
            model,
            narration_error,
        }))
    }

    /// Project a rebalance against the wallet's current position.
    #[instrument(skip(self))]
    pub async fn simulate(
        &self,
        wallet: &str,
        protocol: &str,
        action: &str,
        amount_usd: f64,
    ) -> Result<SimulationResult, ServiceError> {
        let action: RebalanceAction = action.parse()?;
        Self::check_amount(amount_usd)?;
        let position = self.fetch_one(wallet, protocol).await?;
        self.simulator.project(&position, action, amount_usd)
    }

    /// Confirmation-gated rebalance. Without `confirm` nothing is fetched or
    /// quoted and the request is rejected.
    #[instrument(skip(self))]
    pub async fn execute(
        &self,
        wallet: &str,
        protocol: &str,
        action: &str,
        amount_usd: f64,
        confirm: bool,
    ) -> Result<ExecutionOutcome, ServiceError> {
        if !confirm {
            info!("Execution rejected without confirmation");
            return Ok(ExecutionOutcome::confirmation_required());
        }

        let action: RebalanceAction = action.parse()?;
        if action == RebalanceAction::FullUnwind {
            return Err(ServiceError::InvalidAction(
                "full_unwind cannot be executed, only simulated".to_string(),
            ));
        }
        Self::check_amount(amount_usd)?;

        let position = self.fetch_one(wallet, protocol).await?;
        let simulation = self.simulator.project(&position, action, amount_usd)?;
        self.executor.plan(&position, simulation).await
    }

    /// Configure alert thresholds for a wallet.
    pub fn set_alert_threshold(
        &self,
        wallet: &str,
        warning_threshold: Option<f64>,
        critical_threshold: Option<f64>,
    ) -> Result<AlertThresholds, ServiceError> {
        let thresholds = self
            .alerts
            .set(wallet, warning_threshold, critical_threshold)?;
        info!(
            %wallet,
            warning = thresholds.warning_threshold,
            critical = thresholds.critical_threshold,
            "Alert thresholds configured"
        );
        Ok(thresholds)
    }

    /// Alert raised by a position under its wallet's thresholds.
    pub fn alert_for(&self, position: &Position) -> AlertLevel {
        self.alerts
            .alert_for(position.wallet(), position.health_factor())
    }

    fn resolve(&self, protocol: &str) -> Result<Protocol, ServiceError> {
        Protocol::parse(protocol)
            .filter(|p| self.aggregator.registry().get(*p).is_some())
            .ok_or_else(|| ServiceError::UnknownProtocol(protocol.to_string()))
    }

    fn check_amount(amount_usd: f64) -> Result<(), ServiceError> {
        if amount_usd.is_finite() && amount_usd > 0.0 {
            Ok(())
        } else {
            Err(ServiceError::InvalidAmount(amount_usd))
        }
    }
}
