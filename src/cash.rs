//! Virtual cash: total asset value and the cash that may be committed to buys.
//!
//! Buy affordability must never assume sell proceeds that have not settled,
//! so "what is the portfolio worth" and "how much can I spend" are computed
//! separately.

use log::debug;

use crate::config::Environment;
use crate::types::{Positions, PriceMap};

/// Cash figures derived from raw balance fields.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VirtualCash {
    /// Market value of held instruments.
    pub portfolio_value: f64,
    /// Reported total, or portfolio value plus settlement cash.
    pub total_asset_value: f64,
    /// Cash before the safety margin is withheld.
    pub available_cash: f64,
    /// `total_asset_value * safety_margin_pct / 100`.
    pub safety_amount: f64,
    /// `available_cash - safety_amount`. May be negative.
    pub usable_cash: f64,
}

impl VirtualCash {
    /// Derive total asset value and usable cash.
    ///
    /// In a live environment the broker's orderable cash is trusted when it is
    /// supplied; otherwise, and always in simulation, settlement cash is used.
    pub fn compute(
        positions: &Positions,
        prices: &PriceMap,
        settlement_cash: f64,
        environment: Environment,
        safety_margin_pct: f64,
        reported_total: Option<f64>,
        orderable_cash: Option<f64>,
    ) -> Self {
        let portfolio_value: f64 = positions
            .iter()
            .map(|(code, &qty)| {
                let price = prices.get(code).copied().unwrap_or(0.0).max(0.0);
                price * qty as f64
            })
            .sum();

        let total_asset_value = reported_total.unwrap_or(portfolio_value + settlement_cash);
        let safety_amount = total_asset_value * (safety_margin_pct / 100.0);

        let available_cash = match environment {
            Environment::Live => orderable_cash.unwrap_or(settlement_cash),
            Environment::Simulated => settlement_cash,
        };
        let usable_cash = available_cash - safety_amount;

        debug!(
            "virtual cash ({environment}): holdings {portfolio_value:.0}, total {total_asset_value:.0}, \
             safety {safety_amount:.0}, usable {usable_cash:.0}"
        );

        Self {
            portfolio_value,
            total_asset_value,
            available_cash,
            safety_amount,
            usable_cash,
        }
    }
}
