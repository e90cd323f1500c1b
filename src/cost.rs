//! Commission estimates and netting savings.

use std::fmt;

use crate::order::OrderPlan;
use crate::types::PriceMap;

/// Default commission rate (0.15% of traded value).
pub const DEFAULT_COMMISSION_RATE: f64 = 0.0015;

/// Estimated execution costs of a plan.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CostEstimate {
    /// Sum of `qty * price` over priced orders.
    pub traded_value: f64,
    pub commission: f64,
    pub orders: usize,
}

/// Commission for `plan` at `commission_rate`. Unpriced orders cost nothing.
pub fn estimate_cost(plan: &[OrderPlan], prices: &PriceMap, commission_rate: f64) -> CostEstimate {
    let traded_value: f64 = plan
        .iter()
        .filter_map(|o| {
            prices
                .get(&o.code)
                .filter(|&&p| p > 0.0)
                .map(|&p| o.notional(p))
        })
        .sum();
    CostEstimate {
        traded_value,
        commission: traded_value * commission_rate,
        orders: plan.len(),
    }
}

impl fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} orders, {:.0} traded, {:.0} commission",
            self.orders, self.traded_value, self.commission
        )
    }
}

/// Order-count reduction from netting a plan.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NettingSavings {
    pub original: usize,
    pub optimized: usize,
    pub saved: usize,
    pub savings_pct: f64,
}

impl NettingSavings {
    pub fn compare(original: &[OrderPlan], optimized: &[OrderPlan]) -> Self {
        Self::from_counts(original.len(), optimized.len())
    }

    pub fn from_counts(original: usize, optimized: usize) -> Self {
        let saved = original.saturating_sub(optimized);
        let savings_pct = if original == 0 {
            0.0
        } else {
            saved as f64 / original as f64 * 100.0
        };
        Self {
            original,
            optimized,
            saved,
            savings_pct,
        }
    }
}

impl fmt::Display for NettingSavings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} orders ({} saved, {:.1}%)",
            self.original, self.optimized, self.saved, self.savings_pct
        )
    }
}
