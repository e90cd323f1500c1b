//! Cash-sufficiency replay.
//!
//! A plan is replayed against a starting cash figure at the assumed prices:
//! every SELL first (adding proceeds), then every BUY (spending). An order
//! carrying a limit is replayed at its limit, so a BUY limited above the last
//! price is costed at what it may actually fill at. Orders on instruments
//! without a positive price are ignored by the replay.

use log::warn;

use crate::order::OrderPlan;
use crate::rounding::round_lot;
use crate::types::PriceMap;

#[inline]
fn priced(order: &OrderPlan, prices: &PriceMap) -> Option<f64> {
    let last = prices.get(&order.code).copied().filter(|&p| p > 0.0)?;
    Some(order.limit.filter(|&l| l > 0.0).unwrap_or(last))
}

/// Replay `plan` and repair it so running cash never goes negative.
///
/// A BUY the running balance cannot cover is shrunk to the affordable lot
/// count, or dropped if not even one unit fits. Orders without a positive
/// price are dropped. Returns the repaired plan (SELLs first, relative order
/// preserved) and the projected end cash.
pub fn validate_cash_sufficiency(
    plan: &[OrderPlan],
    initial_cash: f64,
    prices: &PriceMap,
) -> (Vec<OrderPlan>, f64) {
    let mut adjusted = Vec::with_capacity(plan.len());
    let mut cash = initial_cash;

    for order in plan.iter().filter(|o| o.is_sell()) {
        if let Some(price) = priced(order, prices) {
            cash += order.notional(price);
            adjusted.push(*order);
        }
    }

    for order in plan.iter().filter(|o| o.is_buy()) {
        let Some(price) = priced(order, prices) else {
            continue;
        };
        let cost = order.notional(price);
        if cash >= cost {
            cash -= cost;
            adjusted.push(*order);
            continue;
        }
        let affordable = if cash > 0.0 { round_lot(cash / price) } else { 0 };
        if affordable > 0 {
            warn!(
                "{}: buy shrunk {} -> {affordable} (cash {cash:.0})",
                order.code, order.qty
            );
            cash -= affordable as f64 * price;
            adjusted.push(OrderPlan {
                qty: affordable as u64,
                ..*order
            });
        } else {
            warn!("{}: buy of {} dropped, cash {cash:.0}", order.code, order.qty);
        }
    }

    (adjusted, cash)
}

/// End cash after executing every priced order in `plan`.
pub fn projected_cash(plan: &[OrderPlan], initial_cash: f64, prices: &PriceMap) -> f64 {
    plan.iter().fold(initial_cash, |cash, order| match priced(order, prices) {
        Some(price) if order.is_buy() => cash - order.notional(price),
        Some(price) => cash + order.notional(price),
        None => cash,
    })
}

/// BUY orders that would bounce for lack of cash, SELLs replayed first.
///
/// A bounced order does not consume cash, so later smaller buys may still fit.
pub fn insufficient_orders(
    plan: &[OrderPlan],
    initial_cash: f64,
    prices: &PriceMap,
) -> Vec<OrderPlan> {
    let mut cash = initial_cash
        + plan
            .iter()
            .filter(|o| o.is_sell())
            .filter_map(|o| priced(o, prices).map(|p| o.notional(p)))
            .sum::<f64>();

    let mut bounced = Vec::new();
    for order in plan.iter().filter(|o| o.is_buy()) {
        let Some(price) = priced(order, prices) else {
            continue;
        };
        let cost = order.notional(price);
        if cash < cost {
            bounced.push(*order);
        } else {
            cash -= cost;
        }
    }
    bounced
}
