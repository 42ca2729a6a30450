//! Normalized lending position and risk classification.

use serde::{Serialize, Serializer};
use smallvec::SmallVec;
use solshield_api::PositionBrief;
use solshield_chain::Protocol;

/// Liquidation risk bands, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// HF >= 1.5
    Healthy,
    /// 1.2 <= HF < 1.5
    Warning,
    /// 1.05 <= HF < 1.2
    Critical,
    /// HF < 1.05
    Emergency,
}

impl RiskLevel {
    /// Lowest health factor classified Healthy.
    pub const HEALTHY_MIN: f64 = 1.5;
    /// Lowest health factor classified Warning.
    pub const WARNING_MIN: f64 = 1.2;
    /// Lowest health factor classified Critical.
    pub const CRITICAL_MIN: f64 = 1.05;

    /// Classify a health factor. Boundary values belong to the safer band.
    ///
    /// Total over `f64`: zero, negatives and NaN are Emergency, `+inf` (no debt)
    /// is Healthy.
    pub fn from_health_factor(hf: f64) -> Self {
        if hf >= Self::HEALTHY_MIN {
            Self::Healthy
        } else if hf >= Self::WARNING_MIN {
            Self::Warning
        } else if hf >= Self::CRITICAL_MIN {
            Self::Critical
        } else {
            Self::Emergency
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Emergency => "emergency",
        }
    }
}

/// Classify a health factor into a [`RiskLevel`].
#[inline]
pub fn classify(health_factor: f64) -> RiskLevel {
    RiskLevel::from_health_factor(health_factor)
}

/// Token symbols attached to a position.
pub type TokenList = SmallVec<[String; 4]>;

/// One lending position held by a wallet on one protocol.
///
/// Built only by protocol source adapters. `risk_level` is always
/// `classify(health_factor)`. A position without debt has an infinite health
/// factor, serialized as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    protocol: Protocol,
    wallet: String,
    #[serde(serialize_with = "serialize_health_factor")]
    health_factor: f64,
    collateral_usd: f64,
    debt_usd: f64,
    risk_level: RiskLevel,
    tokens_collateral: TokenList,
    tokens_debt: TokenList,
    /// Demonstration data rather than a live read
    synthetic: bool,
}

pub(crate) fn serialize_health_factor<S: Serializer>(
    hf: &f64,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    if hf.is_finite() {
        serializer.serialize_f64(*hf)
    } else {
        serializer.serialize_none()
    }
}

impl Position {
    /// Position read from a live source.
    pub(crate) fn observed(
        protocol: Protocol,
        wallet: &str,
        health_factor: f64,
        collateral_usd: f64,
        debt_usd: f64,
        tokens_collateral: TokenList,
        tokens_debt: TokenList,
    ) -> Self {
        Self::build(
            protocol,
            wallet,
            health_factor,
            collateral_usd,
            debt_usd,
            tokens_collateral,
            tokens_debt,
            false,
        )
    }

    /// Demonstration position, flagged as synthetic.
    pub(crate) fn synthetic(
        protocol: Protocol,
        wallet: &str,
        health_factor: f64,
        collateral_usd: f64,
        debt_usd: f64,
        tokens_collateral: &[&str],
        tokens_debt: &[&str],
    ) -> Self {
        Self::build(
            protocol,
            wallet,
            health_factor,
            collateral_usd,
            debt_usd,
            tokens_collateral.iter().map(|s| s.to_string()).collect(),
            tokens_debt.iter().map(|s| s.to_string()).collect(),
            true,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        protocol: Protocol,
        wallet: &str,
        health_factor: f64,
        collateral_usd: f64,
        debt_usd: f64,
        tokens_collateral: TokenList,
        tokens_debt: TokenList,
        synthetic: bool,
    ) -> Self {
        let health_factor = if health_factor.is_nan() {
            0.0
        } else {
            health_factor.max(0.0)
        };
        Self {
            protocol,
            wallet: wallet.to_string(),
            health_factor,
            collateral_usd: collateral_usd.max(0.0),
            debt_usd: debt_usd.max(0.0),
            risk_level: classify(health_factor),
            tokens_collateral,
            tokens_debt,
            synthetic,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn wallet(&self) -> &str {
        &self.wallet
    }

    /// Health factor; `f64::INFINITY` when the position has no debt.
    pub fn health_factor(&self) -> f64 {
        self.health_factor
    }

    pub fn collateral_usd(&self) -> f64 {
        self.collateral_usd
    }

    pub fn debt_usd(&self) -> f64 {
        self.debt_usd
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn tokens_collateral(&self) -> &[String] {
        &self.tokens_collateral
    }

    pub fn tokens_debt(&self) -> &[String] {
        &self.tokens_debt
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    /// Check if the position carries debt.
    pub fn has_debt(&self) -> bool {
        self.debt_usd > 0.0
    }

    /// Figures handed to the narration collaborator.
    pub fn brief(&self) -> PositionBrief {
        PositionBrief {
            protocol: self.protocol.name().to_string(),
            health_factor: self.health_factor.is_finite().then_some(self.health_factor),
            collateral_usd: self.collateral_usd,
            debt_usd: self.debt_usd,
            risk_level: self.risk_level.as_str().to_string(),
            tokens_collateral: self.tokens_collateral.to_vec(),
            tokens_debt: self.tokens_debt.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_classification_boundaries() {
        assert_eq!(classify(1.5), RiskLevel::Healthy);
        assert_eq!(classify(1.49999), RiskLevel::Warning);
        assert_eq!(classify(1.2), RiskLevel::Warning);
        assert_eq!(classify(1.19999), RiskLevel::Critical);
        assert_eq!(classify(1.05), RiskLevel::Critical);
        assert_eq!(classify(1.04999), RiskLevel::Emergency);
        assert_eq!(classify(0.0), RiskLevel::Emergency);
        assert_eq!(classify(-3.0), RiskLevel::Emergency);
    }

    #[test]
    fn test_classification_extremes() {
        assert_eq!(classify(f64::INFINITY), RiskLevel::Healthy);
        assert_eq!(classify(f64::NAN), RiskLevel::Emergency);
        assert_eq!(classify(f64::NEG_INFINITY), RiskLevel::Emergency);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(RiskLevel::Healthy < RiskLevel::Warning);
        assert!(RiskLevel::Warning < RiskLevel::Critical);
        assert!(RiskLevel::Critical < RiskLevel::Emergency);
    }

    #[test]
    fn test_risk_level_follows_health_factor() {
        for hf in [0.0, 0.5, 1.04, 1.1, 1.3, 2.1, f64::INFINITY] {
            let position = Position::observed(
                Protocol::Kamino,
                "wallet",
                hf,
                100.0,
                50.0,
                smallvec![],
                smallvec![],
            );
            assert_eq!(position.risk_level(), classify(position.health_factor()));
            assert!(!position.is_synthetic());
        }
    }

    #[test]
    fn test_serialized_shape() {
        let position = Position::synthetic(
            Protocol::Kamino,
            "wallet",
            1.34,
            5200.0,
            3880.0,
            &["SOL", "mSOL"],
            &["USDC"],
        );
        let value = serde_json::to_value(&position).unwrap();
        assert_eq!(value["protocol"], "Kamino");
        assert_eq!(value["wallet"], "wallet");
        assert_eq!(value["health_factor"], 1.34);
        assert_eq!(value["risk_level"], "warning");
        assert_eq!(value["tokens_collateral"][1], "mSOL");
        assert_eq!(value["synthetic"], true);
    }

    #[test]
    fn test_no_debt_serializes_null_health_factor() {
        let position = Position::observed(
            Protocol::Solend,
            "wallet",
            f64::INFINITY,
            100.0,
            0.0,
            smallvec!["SOL".to_string()],
            smallvec![],
        );
        let value = serde_json::to_value(&position).unwrap();
        assert!(value["health_factor"].is_null());
        assert_eq!(value["risk_level"], "healthy");
        assert!(position.brief().health_factor.is_none());
    }
}
