//! Rebalance projection.
//!
//! Projects a position after adding collateral, repaying debt or unwinding it
//! entirely. The projection is pure: it reads a [`Position`] and never touches
//! the network.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solshield_chain::Protocol;

use crate::config::MonitorConfig;
use crate::error::ServiceError;
use crate::position::{classify, serialize_health_factor, Position, RiskLevel};

/// Rebalance action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceAction {
    AddCollateral,
    RepayDebt,
    FullUnwind,
}

impl RebalanceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddCollateral => "add_collateral",
            Self::RepayDebt => "repay_debt",
            Self::FullUnwind => "full_unwind",
        }
    }
}

impl fmt::Display for RebalanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RebalanceAction {
    type Err = ServiceError;

    /// Accepts `add_collateral`, `addCollateral`, `add-collateral` and so on.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "addcollateral" => Ok(Self::AddCollateral),
            "repaydebt" => Ok(Self::RepayDebt),
            "fullunwind" => Ok(Self::FullUnwind),
            _ => Err(ServiceError::InvalidAction(format!("unknown action '{s}'"))),
        }
    }
}

/// Health figures at one point of a projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionSnapshot {
    #[serde(serialize_with = "serialize_health_factor")]
    pub health_factor: f64,
    pub collateral_usd: f64,
    pub debt_usd: f64,
    pub risk_level: RiskLevel,
}

impl PositionSnapshot {
    fn new(health_factor: f64, collateral_usd: f64, debt_usd: f64) -> Self {
        Self {
            health_factor,
            collateral_usd,
            debt_usd,
            risk_level: classify(health_factor),
        }
    }
}

/// Projected outcome of a rebalance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub protocol: Protocol,
    pub wallet: String,
    pub action: RebalanceAction,
    pub amount_usd: f64,
    pub current: PositionSnapshot,
    pub projected: PositionSnapshot,
    /// Liquidation threshold the projection was computed with
    pub liquidation_threshold: f64,
    /// Collateral left over after a full unwind
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released_collateral_usd: Option<f64>,
    pub estimated_fee_sol: f64,
    pub slippage_bps: u16,
    /// Projection is based on demonstration data
    pub synthetic: bool,
    pub simulated_at: DateTime<Utc>,
}

impl SimulationResult {
    /// Projected minus current health factor, when both are finite.
    pub fn health_factor_change(&self) -> Option<f64> {
        let (before, after) = (self.current.health_factor, self.projected.health_factor);
        (before.is_finite() && after.is_finite()).then(|| after - before)
    }
}

/// Projects rebalances against a liquidation threshold model.
///
/// The threshold is derived from the position itself (`hf * debt / collateral`)
/// whenever that is defined, so the projection reproduces the reported health
/// factor before the change is applied.
#[derive(Debug, Clone)]
pub struct RebalanceSimulator {
    default_liquidation_threshold: f64,
    estimated_fee_sol: f64,
    slippage_bps: u16,
}

impl Default for RebalanceSimulator {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

impl RebalanceSimulator {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            default_liquidation_threshold: config.simulation.default_liquidation_threshold,
            estimated_fee_sol: config.simulation.estimated_fee_sol,
            slippage_bps: config.swap.slippage_bps,
        }
    }

    /// Liquidation threshold implied by the position, or the configured default.
    pub fn liquidation_threshold(&self, position: &Position) -> f64 {
        let hf = position.health_factor();
        if hf.is_finite() && position.has_debt() && position.collateral_usd() > 0.0 {
            let implied = hf * position.debt_usd() / position.collateral_usd();
            if implied.is_finite() && implied > 0.0 {
                return implied;
            }
        }
        self.default_liquidation_threshold
    }

    /// Project `action` of `amount_usd` on `position`.
    pub fn project(
        &self,
        position: &Position,
        action: RebalanceAction,
        amount_usd: f64,
    ) -> Result<SimulationResult, ServiceError> {
        if !amount_usd.is_finite() || amount_usd <= 0.0 {
            return Err(ServiceError::InvalidAmount(amount_usd));
        }

        let collateral = position.collateral_usd();
        let debt = position.debt_usd();
        let lt = self.liquidation_threshold(position);

        let (collateral_after, debt_after, released) = match action {
            RebalanceAction::AddCollateral => (collateral + amount_usd, debt, None),
            RebalanceAction::RepayDebt => {
                if !position.has_debt() {
                    return Err(ServiceError::InvalidAction(
                        "position has no debt to repay".to_string(),
                    ));
                }
                (collateral, (debt - amount_usd).max(0.0), None)
            }
            RebalanceAction::FullUnwind => {
                let released = collateral - debt;
                if released < 0.0 {
                    return Err(ServiceError::InvalidAction(format!(
                        "collateral ${collateral:.2} does not cover debt ${debt:.2}"
                    )));
                }
                (0.0, 0.0, Some(released))
            }
        };

        let projected_hf = if debt_after > 0.0 {
            lt * collateral_after / debt_after
        } else {
            f64::INFINITY
        };

        Ok(SimulationResult {
            protocol: position.protocol(),
            wallet: position.wallet().to_string(),
            action,
            amount_usd,
            current: PositionSnapshot::new(position.health_factor(), collateral, debt),
            projected: PositionSnapshot::new(projected_hf, collateral_after, debt_after),
            liquidation_threshold: lt,
            released_collateral_usd: released,
            estimated_fee_sol: self.estimated_fee_sol,
            slippage_bps: self.slippage_bps,
            synthetic: position.is_synthetic(),
            simulated_at: Utc::now(),
        })
    }
}
