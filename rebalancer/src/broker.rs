//! Broker connection and account state used by rebalancer execution.

use std::path::Path;

use lotplan::{Code, Positions, PriceMap, Snapshot};
use lotplan_broker::paper::PaperBroker;
use lotplan_broker::{Balance, Broker, Holding};

use crate::config::Config;
use crate::error::Result;
use crate::target::TargetSpec;

/// Open the configured paper account and connect to it.
pub fn connect(config: &Config) -> Result<Box<dyn Broker>> {
    let mut broker = PaperBroker::load(Path::new(&config.broker.snapshot))?;
    broker.connect()?;
    Ok(Box::new(broker))
}

/// Balance, holdings and quotes fetched in one pass.
#[derive(Debug, Clone)]
pub struct AccountState {
    pub balance: Balance,
    pub holdings: Vec<Holding>,
    pub prices: PriceMap,
}

impl AccountState {
    /// Fetch the account, quoting every held and targeted instrument.
    pub fn fetch(broker: &dyn Broker, target: &TargetSpec) -> Result<Self> {
        let balance = broker.balance()?;
        let holdings = broker.positions()?;
        let codes = collect_all_codes(&holdings, target);
        let prices = broker.prices(&codes)?.into_iter().collect();
        Ok(Self {
            balance,
            holdings,
            prices,
        })
    }

    pub fn positions(&self) -> Positions {
        self.holdings.iter().map(|h| (h.code, h.qty)).collect()
    }

    /// Market value of holdings with a positive quote.
    pub fn holdings_value(&self) -> f64 {
        self.holdings
            .iter()
            .filter_map(|h| {
                self.prices
                    .get(&h.code)
                    .filter(|&&p| p > 0.0)
                    .map(|&p| h.qty as f64 * p)
            })
            .sum()
    }

    /// Broker-reported total, or cash plus holdings at market.
    pub fn total_value(&self) -> f64 {
        self.balance
            .total_asset_value
            .unwrap_or_else(|| self.balance.cash + self.holdings_value())
    }

    /// Planner input for `target`.
    pub fn snapshot(&self, target: &TargetSpec) -> Snapshot {
        Snapshot {
            positions: self.positions(),
            prices: self.prices.clone(),
            targets: target.weights(),
            cash: self.balance.cash,
            settlement_cash: self.balance.settlement_cash,
            total_asset_value: self.balance.total_asset_value,
            orderable_cash: self.balance.orderable_cash,
        }
    }
}

/// Held codes first, then target codes not already held.
pub fn collect_all_codes(holdings: &[Holding], target: &TargetSpec) -> Vec<Code> {
    let mut codes: Vec<Code> = holdings.iter().map(|h| h.code).collect();
    for code in target.codes() {
        if !codes.contains(&code) {
            codes.push(code);
        }
    }
    codes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> PaperBroker {
        let mut broker = PaperBroker::builder()
            .with_cash(100_000.0)
            .with_settlement_cash(90_000.0)
            .with_holding(Code::new("A"), 10, 900.0)
            .with_price(Code::new("A"), 1_000.0)
            .with_price(Code::new("B"), 500.0)
            .build();
        broker.connect().unwrap();
        broker
    }

    fn target() -> TargetSpec {
        TargetSpec::from_json(r#"{"tickers": {"B": 0.4, "C": 0.2}}"#).unwrap()
    }

    #[test]
    fn codes_union_keeps_holdings_first() {
        let holdings = vec![Holding {
            code: Code::new("A"),
            qty: 10,
            avg_price: 900.0,
        }];
        let codes = collect_all_codes(&holdings, &target());
        assert_eq!(codes, vec![Code::new("A"), Code::new("B"), Code::new("C")]);
    }

    #[test]
    fn fetch_skips_unquoted_codes() {
        let state = AccountState::fetch(&account(), &target()).unwrap();
        assert_eq!(state.prices.len(), 2);
        assert!(!state.prices.contains_key(&Code::new("C")));
        assert_eq!(state.holdings_value(), 10_000.0);
        assert_eq!(state.total_value(), 110_000.0);
    }

    #[test]
    fn snapshot_carries_cash_figures() {
        let state = AccountState::fetch(&account(), &target()).unwrap();
        let snapshot = state.snapshot(&target());
        assert_eq!(snapshot.cash, 100_000.0);
        assert_eq!(snapshot.settlement_cash, Some(90_000.0));
        assert_eq!(snapshot.positions[&Code::new("A")], 10);
        assert_eq!(snapshot.targets.len(), 2);
    }
}
