//! Target allocator: fractional weights to whole-unit target holdings.
//!
//! Two passes. The floor pass buys `floor(budget * weight / price)` of each
//! instrument; the remainder pass walks every tradable instrument from
//! cheapest to most expensive and adds units while the unspent budget still
//! covers one more. The result never spends more than the budget, and what
//! stays idle is less than the cheapest price.

use log::debug;

use crate::rounding::round_lot;
use crate::types::{Code, TargetQuantities, TargetWeights};
use crate::universe::Universe;

/// Weight actually used for allocation: non-positive and NaN weights drop to 0.
#[inline]
pub(crate) fn effective_weight(weight: f64) -> f64 {
    if weight > 0.0 { weight.min(1.0) } else { 0.0 }
}

/// Compute integer target quantities for every instrument in `universe`.
///
/// The floor pass only buys instruments with a positive weight. The
/// remainder pass spends `budget - spent` across the whole universe, so
/// weights summing to less than one still leave idle cash below the
/// cheapest price. Weights summing to more than one are scaled down
/// proportionally.
///
/// Ties in price are visited in code order.
pub fn allocate(budget: f64, universe: &Universe, targets: &TargetWeights) -> TargetQuantities {
    let mut target_qty: TargetQuantities =
        universe.codes().iter().map(|code| (*code, 0)).collect();

    let budget = if budget.is_finite() { budget.max(0.0) } else { 0.0 };
    if budget == 0.0 {
        return target_qty;
    }

    let weight_of = |code: &Code| effective_weight(targets.get(code).copied().unwrap_or(0.0));
    let weight_sum: f64 = universe.codes().iter().map(weight_of).sum();
    let scale = if weight_sum > 1.0 { 1.0 / weight_sum } else { 1.0 };

    // Floor pass
    let mut spent = 0.0;
    for (code, price) in universe.iter() {
        let w = weight_of(&code);
        if w <= 0.0 {
            continue;
        }
        let qty = round_lot(budget * w * scale / price);
        target_qty.insert(code, qty);
        spent += qty as f64 * price;
    }

    // Remainder pass, cheapest first
    let mut leftover = (budget - spent).max(0.0);
    let mut by_price: Vec<(Code, f64)> = universe.iter().collect();
    by_price.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    for (code, price) in by_price {
        if leftover < price {
            continue;
        }
        let mut extra = round_lot(leftover / price);
        while extra > 0 && extra as f64 * price > leftover {
            extra -= 1;
        }
        if extra > 0 {
            *target_qty.entry(code).or_insert(0) += extra;
            leftover -= extra as f64 * price;
        }
    }

    debug!(
        "allocated budget {budget:.0}: spent {:.0}, idle {leftover:.0}",
        budget - leftover
    );
    target_qty
}
