//! Margin-debt recovery.
//!
//! When cash is negative the account first sells just enough to clear the
//! debt, most expensive holdings first, then spends whatever surplus the
//! sells leave on the instruments furthest under target.
//!
//! The surplus is not spent blindly. A fixed ladder of reserve ratios is
//! scanned from 0% to 5%; at each ratio the buy set must fit inside
//! `surplus * (1 - ratio)`. The first ratio that yields a non-empty, fully
//! affordable set wins.

use log::{debug, info, warn};
use rustc_hash::FxHashSet;

use crate::allocate::{allocate, effective_weight};
use crate::band::band_filter;
use crate::order::OrderPlan;
use crate::rounding::{clamp_order_value, round_lot};
use crate::side::Side;
use crate::types::{Code, Positions, TargetWeights};
use crate::universe::Universe;

/// Reserve ratios tried, in order, when rebuilding after a deficit.
pub const RESERVE_RATIOS: [f64; 11] = [
    0.0, 0.005, 0.01, 0.015, 0.02, 0.025, 0.03, 0.035, 0.04, 0.045, 0.05,
];

/// What the resolver decided.
#[derive(Clone, Debug, PartialEq)]
pub struct DeficitResolution {
    /// Liquidation orders, in the order they were chosen.
    pub sells: Vec<OrderPlan>,
    /// Reconstruction orders, largest need first. Empty if nothing is left over.
    pub buys: Vec<OrderPlan>,
    /// `|deficit|`.
    pub required_cash: f64,
    /// Expected proceeds of `sells`.
    pub proceeds: f64,
    /// `proceeds - required_cash`. Negative when the debt cannot be cleared.
    pub expected_cash: f64,
    /// Reserve ratio of the accepted buy set. `None` when no rebuild ran.
    pub reserve_ratio: Option<f64>,
}

impl DeficitResolution {
    /// Sale proceeds cover the debt.
    #[inline]
    pub fn cleared(&self) -> bool {
        self.proceeds >= self.required_cash
    }

    /// Sells followed by buys.
    pub fn orders(&self) -> Vec<OrderPlan> {
        self.sells.iter().chain(self.buys.iter()).copied().collect()
    }

    /// Cash spent by `buys` at the given universe prices.
    pub fn buy_cost(&self, universe: &Universe) -> f64 {
        self.buys
            .iter()
            .filter_map(|o| universe.price(&o.code).map(|p| o.notional(p)))
            .sum()
    }
}

struct Candidate {
    code: Code,
    price: f64,
    need: i64,
}

/// Resolve a negative cash balance.
///
/// `deficit` is the negative cash figure. Holdings without a price are not
/// sold. If even full liquidation cannot cover the debt, the result carries
/// only sells and [`DeficitResolution::cleared`] is false.
pub fn resolve_deficit(
    deficit: f64,
    positions: &Positions,
    universe: &Universe,
    targets: &TargetWeights,
    band_pct: f64,
    max_order_value: f64,
) -> DeficitResolution {
    let required_cash = deficit.abs();
    info!("resolving deficit of {required_cash:.0}");

    let (sells, proceeds) = liquidate(required_cash, positions, universe, max_order_value);
    let expected_cash = proceeds - required_cash;

    let mut resolution = DeficitResolution {
        sells,
        buys: Vec::new(),
        required_cash,
        proceeds,
        expected_cash,
        reserve_ratio: None,
    };

    if !resolution.cleared() {
        warn!(
            "deficit not cleared: proceeds {proceeds:.0} < required {required_cash:.0}, sell-only plan"
        );
        return resolution;
    }
    if expected_cash <= 0.0 {
        info!("deficit cleared exactly, nothing left to reinvest");
        return resolution;
    }

    let candidates = rebuild_candidates(
        &resolution.sells,
        expected_cash,
        positions,
        universe,
        targets,
        band_pct,
    );
    if candidates.is_empty() {
        debug!("no instrument under target after liquidation");
        return resolution;
    }

    let (buys, ratio) = reserve_scan(&candidates, expected_cash, max_order_value);
    info!(
        "deficit rebuild: {} buys at reserve {:.1}%",
        buys.len(),
        ratio * 100.0
    );
    resolution.buys = buys;
    resolution.reserve_ratio = Some(ratio);
    resolution
}

/// Sell the minimum needed to raise `required_cash`, highest price first.
fn liquidate(
    required_cash: f64,
    positions: &Positions,
    universe: &Universe,
    max_order_value: f64,
) -> (Vec<OrderPlan>, f64) {
    let mut held: Vec<(Code, i64, f64)> = positions
        .iter()
        .filter(|&(_, &qty)| qty > 0)
        .filter_map(|(code, &qty)| universe.price(code).map(|p| (*code, qty, p)))
        .collect();
    held.sort_by(|a, b| b.2.total_cmp(&a.2).then(a.0.cmp(&b.0)));

    let mut sells = Vec::new();
    let mut proceeds = 0.0;
    for (code, qty, price) in held {
        if proceeds >= required_cash {
            break;
        }
        let remaining = required_cash - proceeds;
        let needed = round_lot(remaining / price).max(1);
        let sell_qty = clamp_order_value(qty.min(needed), price, max_order_value);
        if sell_qty <= 0 {
            continue;
        }
        debug!("{code}: liquidate {sell_qty} @ {price:.0}");
        proceeds += sell_qty as f64 * price;
        sells.push(OrderPlan::market(code, Side::Sell, sell_qty as u64));
    }
    (sells, proceeds)
}

/// Instruments still under target once the liquidation has settled.
///
/// Anything sold in this pass is left out, so the final plan never both
/// sells and buys the same instrument.
fn rebuild_candidates(
    sells: &[OrderPlan],
    expected_cash: f64,
    positions: &Positions,
    universe: &Universe,
    targets: &TargetWeights,
    band_pct: f64,
) -> Vec<Candidate> {
    let mut expected_positions = positions.clone();
    for order in sells {
        *expected_positions.entry(order.code).or_insert(0) -= order.qty as i64;
    }
    let sold: FxHashSet<Code> = sells.iter().map(|o| o.code).collect();

    let total_value = expected_cash + universe.holdings_value(&expected_positions);
    let target_qty = allocate(total_value, universe, targets);

    let mut candidates: Vec<Candidate> =
        band_filter(universe, &expected_positions, &target_qty, total_value, band_pct)
            .into_iter()
            .filter(|d| d.delta() > 0 && !sold.contains(&d.code))
            .filter(|d| effective_weight(targets.get(&d.code).copied().unwrap_or(0.0)) > 0.0)
            .map(|d| Candidate {
                code: d.code,
                price: d.price,
                need: d.delta(),
            })
            .collect();
    candidates.sort_by(|a, b| {
        (b.need as f64 * b.price)
            .total_cmp(&(a.need as f64 * a.price))
            .then(a.code.cmp(&b.code))
    });
    candidates
}

/// Scan [`RESERVE_RATIOS`] for the first fully affordable buy set.
///
/// Falls back to whatever the most conservative ratio managed to place.
fn reserve_scan(
    candidates: &[Candidate],
    expected_cash: f64,
    max_order_value: f64,
) -> (Vec<OrderPlan>, f64) {
    let mut fallback = Vec::new();
    for &ratio in &RESERVE_RATIOS {
        let cap = expected_cash * (1.0 - ratio);
        let (buys, feasible) = build_buys(candidates, cap, max_order_value);
        if feasible && !buys.is_empty() {
            return (buys, ratio);
        }
        debug!("reserve {:.1}%: no affordable buy set", ratio * 100.0);
        fallback = buys;
    }
    (fallback, RESERVE_RATIOS[RESERVE_RATIOS.len() - 1])
}

fn build_buys(candidates: &[Candidate], cap: f64, max_order_value: f64) -> (Vec<OrderPlan>, bool) {
    let mut buys = Vec::new();
    let mut used = 0.0;
    for c in candidates {
        let room = cap - used;
        let mut affordable = if room > 0.0 { round_lot(room / c.price) } else { 0 };
        while affordable > 0 && affordable as f64 * c.price > room {
            affordable -= 1;
        }
        if affordable == 0 {
            return (buys, false);
        }
        let qty = clamp_order_value(c.need.min(affordable), c.price, max_order_value);
        if qty > 0 {
            used += qty as f64 * c.price;
            buys.push(OrderPlan::market(c.code, Side::Buy, qty as u64));
        }
    }
    (buys, true)
}
