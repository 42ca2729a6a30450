//! Confirmation-gated rebalance execution.
//!
//! Execution stops at a dry run: the funding swap is quoted and reported, but no
//! transaction is built, signed or sent.

use std::sync::Arc;

use serde::Serialize;
use solshield_api::{QuoteRequest, SwapQuoter, SwapRoute};
use tracing::{info, instrument};

use crate::config::{MonitorConfig, SwapConfig};
use crate::error::ServiceError;
use crate::position::Position;
use crate::simulator::{RebalanceAction, SimulationResult};

const DRY_RUN_MESSAGE: &str =
    "Dry run: the swap was quoted but no transaction was signed or submitted.";

/// Result of an execute request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Not executed; nothing was fetched, quoted or changed
    Rejected { reason: String },
    DryRun(ExecutionReport),
}

impl ExecutionOutcome {
    pub(crate) fn confirmation_required() -> Self {
        Self::Rejected {
            reason: "execution requires confirm=true; simulate the rebalance first".to_string(),
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// What a confirmed rebalance would do.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub simulation: SimulationResult,
    /// Funding swap; absent when the funding asset is the target asset
    pub swap: Option<SwapPlan>,
    pub message: String,
}

/// Quoted funding swap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwapPlan {
    pub input_asset: String,
    pub output_asset: String,
    /// Input amount in the funding asset's smallest unit
    pub input_amount: u64,
    pub route: SwapRoute,
}

/// Plans the funding swap for a confirmed rebalance.
#[derive(Debug, Clone)]
pub struct RebalanceExecutor {
    quoter: Arc<dyn SwapQuoter>,
    swap: SwapConfig,
}

impl RebalanceExecutor {
    pub fn new(quoter: Arc<dyn SwapQuoter>, config: &MonitorConfig) -> Self {
        Self {
            quoter,
            swap: config.swap.clone(),
        }
    }

    /// Asset the rebalance delivers: the first collateral token when adding
    /// collateral, the first debt token when repaying.
    fn target_asset<'a>(
        position: &'a Position,
        action: RebalanceAction,
    ) -> Result<&'a str, ServiceError> {
        let tokens = match action {
            RebalanceAction::AddCollateral => position.tokens_collateral(),
            RebalanceAction::RepayDebt => position.tokens_debt(),
            RebalanceAction::FullUnwind => {
                return Err(ServiceError::InvalidAction(
                    "full_unwind cannot be executed, only simulated".to_string(),
                ))
            }
        };
        tokens.first().map(String::as_str).ok_or_else(|| {
            ServiceError::InvalidAction(format!("position lists no asset for {action}"))
        })
    }

    /// Funding amount in smallest units. The funding asset is USD-denominated.
    fn funding_amount(amount_usd: f64, decimals: u8) -> Result<u64, ServiceError> {
        let units = (amount_usd * 10f64.powi(i32::from(decimals))).round();
        if !units.is_finite() || units < 1.0 || units >= u64::MAX as f64 {
            return Err(ServiceError::InvalidAmount(amount_usd));
        }
        Ok(units as u64)
    }

    /// Quote the funding swap for a validated simulation.
    #[instrument(
        skip(self, position, simulation),
        fields(protocol = %position.protocol(), action = %simulation.action)
    )]
    pub async fn plan(
        &self,
        position: &Position,
        simulation: SimulationResult,
    ) -> Result<ExecutionOutcome, ServiceError> {
        let target = Self::target_asset(position, simulation.action)?;

        let (funding_symbol, funding) = self
            .swap
            .asset(&self.swap.funding_asset)
            .ok_or_else(|| ServiceError::UnknownAsset(self.swap.funding_asset.clone()))?;

        if funding_symbol.eq_ignore_ascii_case(target) {
            info!(asset = %target, "Funding asset matches target, no swap needed");
            return Ok(ExecutionOutcome::DryRun(ExecutionReport {
                simulation,
                swap: None,
                message: DRY_RUN_MESSAGE.to_string(),
            }));
        }

        let (target_symbol, target_info) = self
            .swap
            .asset(target)
            .ok_or_else(|| ServiceError::UnknownAsset(target.to_string()))?;

        let input_amount = Self::funding_amount(simulation.amount_usd, funding.decimals)?;
        let request = QuoteRequest::new(&funding.mint, &target_info.mint, input_amount)
            .with_slippage_bps(self.swap.slippage_bps);
        let route = self.quoter.quote(&request).await?;

        info!(
            input = %funding_symbol,
            output = %target_symbol,
            input_amount,
            out_amount = route.out_amount,
            legs = route.legs.len(),
            "Quoted rebalance swap"
        );

        Ok(ExecutionOutcome::DryRun(ExecutionReport {
            simulation,
            swap: Some(SwapPlan {
                input_asset: funding_symbol.to_string(),
                output_asset: target_symbol.to_string(),
                input_amount,
                route,
            }),
            message: DRY_RUN_MESSAGE.to_string(),
        }))
    }
}
