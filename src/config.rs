//! Planner configuration.

use std::fmt;

use crate::error::PlanError;

/// Where the account lives. Decides which cash figure is trusted for buys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Environment {
    /// Paper/mock account: usable cash is derived from settlement cash.
    #[default]
    Simulated,
    /// Real account: the broker's orderable-cash figure is preferred.
    Live,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Simulated => f.pad("simulated"),
            Environment::Live => f.pad("live"),
        }
    }
}

/// Knobs for a planning call.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlanConfig {
    /// Tolerance band in percentage points of portfolio weight.
    pub band_pct: f64,
    /// Maximum order value per instrument. `0.0` = unlimited.
    pub max_order_value: f64,
    /// Percentage of total asset value withheld from the buy budget.
    pub safety_margin_pct: f64,
    pub environment: Environment,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            band_pct: 1.0,
            max_order_value: 0.0,
            safety_margin_pct: 0.0,
            environment: Environment::Simulated,
        }
    }
}

impl PlanConfig {
    pub fn with_band_pct(mut self, band_pct: f64) -> Self {
        self.band_pct = band_pct;
        self
    }

    pub fn with_max_order_value(mut self, max_order_value: f64) -> Self {
        self.max_order_value = max_order_value;
        self
    }

    pub fn with_safety_margin_pct(mut self, safety_margin_pct: f64) -> Self {
        self.safety_margin_pct = safety_margin_pct;
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Check config invariants.
    pub fn validate(&self) -> Result<(), PlanError> {
        if !self.band_pct.is_finite() || self.band_pct < 0.0 {
            return Err(PlanError::InvalidConfig(format!(
                "band_pct must be a finite value >= 0, got {}",
                self.band_pct
            )));
        }
        if !self.max_order_value.is_finite() || self.max_order_value < 0.0 {
            return Err(PlanError::InvalidConfig(format!(
                "max_order_value must be a finite value >= 0, got {}",
                self.max_order_value
            )));
        }
        if !(0.0..100.0).contains(&self.safety_margin_pct) {
            return Err(PlanError::InvalidConfig(format!(
                "safety_margin_pct must be in [0, 100), got {}",
                self.safety_margin_pct
            )));
        }
        Ok(())
    }
}
