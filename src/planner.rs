//! Planning entry point.
//!
//! One allocator, one resolver, one assembler. [`plan_rebalance`] picks the
//! path from the sign of the cash figures:
//!
//! ```text
//! START ─┬─ cash < 0 ──> DEFICIT_RESOLUTION ──┐
//!        └─ otherwise ─> NORMAL_ALLOCATION ───┴─> BAND_FILTER ─> SELLS ─> BUYS ─> NET_AND_VALIDATE
//! ```

use std::fmt;

use log::{debug, info, warn};

use crate::allocate::allocate;
use crate::assemble::{assemble, net_orders};
use crate::band::band_filter;
use crate::cash::VirtualCash;
use crate::cash_guard::{projected_cash, validate_cash_sufficiency};
use crate::config::PlanConfig;
use crate::cost::NettingSavings;
use crate::deficit::resolve_deficit;
use crate::error::PlanError;
use crate::order::OrderPlan;
use crate::types::{Code, Positions, PriceMap, TargetWeights};
use crate::universe::Universe;

/// Everything the planner needs to know about an account at one instant.
///
/// Built fresh per call; the planner never mutates or keeps it.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    pub positions: Positions,
    pub prices: PriceMap,
    pub targets: TargetWeights,
    /// Orderable cash. Negative = margin debt.
    pub cash: f64,
    /// Settlement (D+2) cash. Preferred for deciding deficit status.
    pub settlement_cash: Option<f64>,
    /// Broker-reported total asset value.
    pub total_asset_value: Option<f64>,
    /// Broker-reported orderable cash, trusted in a live environment.
    pub orderable_cash: Option<f64>,
}

impl Snapshot {
    pub fn new(cash: f64) -> Self {
        Self {
            cash,
            ..Self::default()
        }
    }

    pub fn position(mut self, code: Code, qty: i64) -> Self {
        self.positions.insert(code, qty);
        self
    }

    pub fn price(mut self, code: Code, price: f64) -> Self {
        self.prices.insert(code, price);
        self
    }

    pub fn target(mut self, code: Code, weight: f64) -> Self {
        self.targets.insert(code, weight);
        self
    }

    pub fn with_settlement_cash(mut self, settlement_cash: f64) -> Self {
        self.settlement_cash = Some(settlement_cash);
        self
    }

    pub fn with_total_asset_value(mut self, total: f64) -> Self {
        self.total_asset_value = Some(total);
        self
    }

    pub fn with_orderable_cash(mut self, orderable_cash: f64) -> Self {
        self.orderable_cash = Some(orderable_cash);
        self
    }

    /// Reject non-finite numbers. Zero or negative prices and negative
    /// weights are accepted; they only make an instrument untradeable.
    pub fn validate(&self) -> Result<(), PlanError> {
        for (code, &price) in &self.prices {
            if !price.is_finite() {
                return Err(PlanError::InvalidPrice { code: *code, price });
            }
        }
        for (code, &weight) in &self.targets {
            if !weight.is_finite() {
                return Err(PlanError::InvalidWeight {
                    code: *code,
                    weight,
                });
            }
        }
        let cash_fields = [
            ("cash", Some(self.cash)),
            ("settlement_cash", self.settlement_cash),
            ("total_asset_value", self.total_asset_value),
            ("orderable_cash", self.orderable_cash),
        ];
        for (field, value) in cash_fields {
            if let Some(value) = value.filter(|v| !v.is_finite()) {
                return Err(PlanError::InvalidCash { field, value });
            }
        }
        Ok(())
    }

    /// The negative cash figure that puts the account in deficit, if any.
    ///
    /// Settlement cash is checked first; a negative orderable cash also counts.
    pub fn deficit(&self) -> Option<f64> {
        match self.settlement_cash {
            Some(settlement) if settlement < 0.0 => Some(settlement),
            _ if self.cash < 0.0 => Some(self.cash),
            _ => None,
        }
    }
}

/// Which branch produced a plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PlanPath {
    Normal,
    Deficit,
}

impl fmt::Display for PlanPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanPath::Normal => f.pad("normal"),
            PlanPath::Deficit => f.pad("deficit"),
        }
    }
}

/// A plan together with the figures that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanOutcome {
    pub orders: Vec<OrderPlan>,
    pub path: PlanPath,
    pub cash: VirtualCash,
    /// Reserve ratio accepted by the deficit rebuild.
    pub reserve_ratio: Option<f64>,
    /// Cash left after every order fills at the assumed prices.
    pub projected_cash: f64,
    /// Always true on the normal path.
    pub deficit_cleared: bool,
    /// Order lines before same-instrument netting.
    pub orders_before_netting: usize,
}

impl PlanOutcome {
    fn empty(path: PlanPath, cash: VirtualCash, projected_cash: f64) -> Self {
        Self {
            orders: Vec::new(),
            path,
            cash,
            reserve_ratio: None,
            projected_cash,
            deficit_cleared: path == PlanPath::Normal || projected_cash >= 0.0,
            orders_before_netting: 0,
        }
    }

    /// Order lines saved by netting.
    pub fn netting(&self) -> NettingSavings {
        NettingSavings::from_counts(self.orders_before_netting, self.orders.len())
    }

    pub fn sells(&self) -> impl Iterator<Item = &OrderPlan> {
        self.orders.iter().filter(|o| o.is_sell())
    }

    pub fn buys(&self) -> impl Iterator<Item = &OrderPlan> {
        self.orders.iter().filter(|o| o.is_buy())
    }
}

/// Compute the ordered list of trades that moves `snapshot` toward its targets.
///
/// Returns an empty plan when nothing is tradeable or the account is worth
/// nothing. Errors only on malformed input.
///
/// ```
/// use lotplan::{plan_rebalance, Code, PlanConfig, Side, Snapshot};
///
/// let a = Code::new("A");
/// let snapshot = Snapshot::new(1_000.0).position(a, 0).price(a, 100.0).target(a, 1.0);
/// let plan = plan_rebalance(&snapshot, &PlanConfig::default()).unwrap();
///
/// assert_eq!(plan.len(), 1);
/// assert_eq!(plan[0].side, Side::Buy);
/// assert_eq!(plan[0].qty, 10);
/// ```
pub fn plan_rebalance(
    snapshot: &Snapshot,
    config: &PlanConfig,
) -> Result<Vec<OrderPlan>, PlanError> {
    plan_rebalance_detailed(snapshot, config).map(|outcome| outcome.orders)
}

/// Like [`plan_rebalance`], but also reports the path taken and cash figures.
pub fn plan_rebalance_detailed(
    snapshot: &Snapshot,
    config: &PlanConfig,
) -> Result<PlanOutcome, PlanError> {
    config.validate()?;
    snapshot.validate()?;

    let settlement = snapshot.settlement_cash.unwrap_or(snapshot.cash);
    let cash = VirtualCash::compute(
        &snapshot.positions,
        &snapshot.prices,
        settlement,
        config.environment,
        config.safety_margin_pct,
        snapshot.total_asset_value,
        snapshot.orderable_cash,
    );
    let universe = Universe::new(&snapshot.positions, &snapshot.targets, &snapshot.prices);

    if universe.is_empty() {
        return Ok(match snapshot.deficit() {
            Some(deficit) => {
                warn!("deficit of {:.0} but nothing tradable, debt stays", -deficit);
                PlanOutcome::empty(PlanPath::Deficit, cash, deficit)
            }
            None => {
                info!("no tradable instruments, empty plan");
                PlanOutcome::empty(PlanPath::Normal, cash, cash.available_cash)
            }
        });
    }

    match snapshot.deficit() {
        Some(deficit) => Ok(plan_deficit(snapshot, config, &universe, cash, deficit)),
        None => Ok(plan_normal(snapshot, config, &universe, cash)),
    }
}

fn plan_normal(
    snapshot: &Snapshot,
    config: &PlanConfig,
    universe: &Universe,
    cash: VirtualCash,
) -> PlanOutcome {
    let total_value = cash.total_asset_value;
    if total_value <= 0.0 {
        info!("total asset value {total_value:.0} is not positive, empty plan");
        return PlanOutcome::empty(PlanPath::Normal, cash, cash.available_cash);
    }

    let budget = universe.holdings_value(&snapshot.positions) + cash.usable_cash.max(0.0);
    info!(
        "normal rebalance: total {total_value:.0}, budget {budget:.0}, usable cash {:.0}",
        cash.usable_cash
    );

    let target_qty = allocate(budget, universe, &snapshot.targets);
    let decisions = band_filter(
        universe,
        &snapshot.positions,
        &target_qty,
        total_value,
        config.band_pct,
    );
    let violators = decisions.iter().filter(|d| d.violator).count();
    debug!("{violators} of {} instruments outside the band", decisions.len());

    let orders = assemble(&decisions, cash.usable_cash, config.max_order_value);
    let end_cash = projected_cash(&orders, cash.available_cash, &snapshot.prices);

    PlanOutcome {
        orders_before_netting: orders.len(),
        orders,
        path: PlanPath::Normal,
        cash,
        reserve_ratio: None,
        projected_cash: end_cash,
        deficit_cleared: true,
    }
}

fn plan_deficit(
    snapshot: &Snapshot,
    config: &PlanConfig,
    universe: &Universe,
    cash: VirtualCash,
    deficit: f64,
) -> PlanOutcome {
    info!("deficit path: cash {deficit:.0}");
    let resolution = resolve_deficit(
        deficit,
        &snapshot.positions,
        universe,
        &snapshot.targets,
        config.band_pct,
        config.max_order_value,
    );

    debug!(
        "deficit rebuild spends {:.0} of {:.0}",
        resolution.buy_cost(universe),
        resolution.expected_cash
    );

    let unnetted = resolution.orders();
    let (orders, end_cash) =
        validate_cash_sufficiency(&net_orders(&unnetted), deficit, &snapshot.prices);
    if !resolution.cleared() {
        warn!("best-effort plan: projected cash {end_cash:.0} remains negative");
    }

    PlanOutcome {
        orders_before_netting: unnetted.len(),
        orders,
        path: PlanPath::Deficit,
        cash,
        reserve_ratio: resolution.reserve_ratio,
        projected_cash: end_cash,
        deficit_cleared: resolution.cleared(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::side::Side;

    fn code(s: &str) -> Code {
        Code::new(s)
    }

    #[test]
    fn validate_rejects_nan_price() {
        let snapshot = Snapshot::new(0.0).price(code("A"), f64::NAN);
        assert!(matches!(
            snapshot.validate(),
            Err(PlanError::InvalidPrice { .. })
        ));
    }

    #[test]
    fn validate_rejects_infinite_cash() {
        let snapshot = Snapshot::new(0.0).with_orderable_cash(f64::INFINITY);
        assert_eq!(
            snapshot.validate(),
            Err(PlanError::InvalidCash {
                field: "orderable_cash",
                value: f64::INFINITY
            })
        );
    }

    #[test]
    fn validate_accepts_negative_price_and_weight() {
        let snapshot = Snapshot::new(0.0)
            .price(code("A"), -1.0)
            .target(code("A"), -0.5);
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn deficit_prefers_settlement_cash() {
        assert_eq!(Snapshot::new(100.0).with_settlement_cash(-50.0).deficit(), Some(-50.0));
        assert_eq!(Snapshot::new(-80.0).with_settlement_cash(-50.0).deficit(), Some(-50.0));
        assert_eq!(Snapshot::new(-80.0).deficit(), Some(-80.0));
        assert_eq!(Snapshot::new(0.0).with_settlement_cash(0.0).deficit(), None);
    }

    #[test]
    fn invalid_config_is_an_error() {
        let config = PlanConfig::default().with_band_pct(-1.0);
        assert!(plan_rebalance(&Snapshot::new(0.0), &config).is_err());
    }

    #[test]
    fn no_tradable_instruments_is_empty() {
        let snapshot = Snapshot::new(1_000.0)
            .position(code("A"), 10)
            .price(code("A"), 0.0)
            .target(code("A"), 1.0);
        let outcome = plan_rebalance_detailed(&snapshot, &PlanConfig::default()).unwrap();
        assert!(outcome.orders.is_empty());
        assert_eq!(outcome.path, PlanPath::Normal);
    }

    #[test]
    fn zero_total_value_is_empty() {
        let snapshot = Snapshot::new(0.0)
            .position(code("A"), 0)
            .price(code("A"), 10.0)
            .target(code("A"), 1.0);
        assert!(plan_rebalance(&snapshot, &PlanConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn normal_path_reports_projection() {
        let a = code("A");
        let snapshot = Snapshot::new(1_050.0).position(a, 0).price(a, 100.0).target(a, 1.0);
        let outcome = plan_rebalance_detailed(&snapshot, &PlanConfig::default()).unwrap();
        assert_eq!(outcome.orders, vec![OrderPlan::market(a, Side::Buy, 10)]);
        assert_eq!(outcome.projected_cash, 50.0);
        assert!(outcome.deficit_cleared);
        assert_eq!(outcome.reserve_ratio, None);
    }

    #[test]
    fn deficit_path_is_selected() {
        let a = code("A");
        let snapshot = Snapshot::new(-30_000.0)
            .position(a, 100)
            .price(a, 1_000.0)
            .target(a, 1.0);
        let outcome = plan_rebalance_detailed(&snapshot, &PlanConfig::default()).unwrap();
        assert_eq!(outcome.path, PlanPath::Deficit);
        assert_eq!(outcome.orders, vec![OrderPlan::market(a, Side::Sell, 30)]);
        assert_eq!(outcome.projected_cash, 0.0);
        assert!(outcome.deficit_cleared);
    }

    #[test]
    fn untradable_deficit_stays_on_deficit_path() {
        let a = code("A");
        let snapshot = Snapshot::new(-500.0).position(a, 10).target(a, 1.0);
        let outcome = plan_rebalance_detailed(&snapshot, &PlanConfig::default()).unwrap();
        assert_eq!(outcome.path, PlanPath::Deficit);
        assert!(outcome.orders.is_empty());
        assert!(!outcome.deficit_cleared);
        assert_eq!(outcome.projected_cash, -500.0);
    }

    #[test]
    fn netting_counts_lines_before_and_after() {
        let a = code("A");
        let snapshot = Snapshot::new(-30_000.0)
            .position(a, 100)
            .price(a, 1_000.0)
            .target(a, 1.0);
        let outcome = plan_rebalance_detailed(&snapshot, &PlanConfig::default()).unwrap();
        assert_eq!(outcome.orders_before_netting, 1);
        assert_eq!(outcome.netting().saved, 0);
    }

    #[test]
    fn path_display() {
        assert_eq!(PlanPath::Deficit.to_string(), "deficit");
        assert_eq!(format!("{:>7}", PlanPath::Normal), " normal");
    }
}
