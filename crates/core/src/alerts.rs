//! Per-wallet alert thresholds.
//!
//! Thresholds only drive the `alert` decoration of health checks. They never
//! change a position's risk level.

use dashmap::DashMap;
use serde::Serialize;

use crate::error::ServiceError;

/// Health factor thresholds that trigger an alert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlertThresholds {
    pub warning_threshold: f64,
    pub critical_threshold: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            warning_threshold: 1.5,
            critical_threshold: 1.2,
        }
    }
}

impl AlertThresholds {
    /// Validated thresholds: `warning > critical > 0`, both finite.
    pub fn new(warning_threshold: f64, critical_threshold: f64) -> Result<Self, ServiceError> {
        if !warning_threshold.is_finite() || !critical_threshold.is_finite() {
            return Err(ServiceError::InvalidThreshold(
                "thresholds must be finite".to_string(),
            ));
        }
        if critical_threshold <= 0.0 {
            return Err(ServiceError::InvalidThreshold(format!(
                "critical threshold {critical_threshold} must be positive"
            )));
        }
        if warning_threshold <= critical_threshold {
            return Err(ServiceError::InvalidThreshold(format!(
                "warning threshold {warning_threshold} must exceed critical threshold {critical_threshold}"
            )));
        }
        Ok(Self {
            warning_threshold,
            critical_threshold,
        })
    }

    /// Alert raised by a health factor. A value equal to a threshold does not
    /// trigger it.
    pub fn alert_for(&self, health_factor: f64) -> AlertLevel {
        if health_factor.is_nan() || health_factor < self.critical_threshold {
            AlertLevel::Critical
        } else if health_factor < self.warning_threshold {
            AlertLevel::Warning
        } else {
            AlertLevel::None
        }
    }
}

/// Alert attached to a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    None,
    Warning,
    Critical,
}

/// Alert thresholds keyed by wallet.
#[derive(Debug, Default)]
pub struct AlertBook {
    thresholds: DashMap<String, AlertThresholds>,
}

impl AlertBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store thresholds for a wallet. Omitted values take their defaults.
    pub fn set(
        &self,
        wallet: &str,
        warning_threshold: Option<f64>,
        critical_threshold: Option<f64>,
    ) -> Result<AlertThresholds, ServiceError> {
        let defaults = AlertThresholds::default();
        let thresholds = AlertThresholds::new(
            warning_threshold.unwrap_or(defaults.warning_threshold),
            critical_threshold.unwrap_or(defaults.critical_threshold),
        )?;
        self.thresholds.insert(wallet.to_string(), thresholds);
        Ok(thresholds)
    }

    /// Thresholds for a wallet, or the defaults.
    pub fn get(&self, wallet: &str) -> AlertThresholds {
        self.thresholds
            .get(wallet)
            .map(|t| *t)
            .unwrap_or_default()
    }

    pub fn alert_for(&self, wallet: &str, health_factor: f64) -> AlertLevel {
        self.get(wallet).alert_for(health_factor)
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }
}
