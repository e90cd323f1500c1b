//! Plan assembly: band decisions to an executable SELL-then-BUY sequence.

use log::debug;
use rustc_hash::FxHashMap;

use crate::band::BandDecision;
use crate::cash_guard::validate_cash_sufficiency;
use crate::order::OrderPlan;
use crate::rounding::{clamp_order_value, round_lot};
use crate::side::Side;
use crate::types::{Code, PriceMap};

/// Turn band decisions into an ordered plan.
///
/// SELLs come first, most over-weight first, and their proceeds are added to
/// the running cash. BUYs follow, most under-weight first, each limited to
/// what the running cash covers. Every order is capped at `max_order_value`
/// (0 = unlimited). The result is netted and replayed through
/// [`validate_cash_sufficiency`] against `starting_cash`.
pub fn assemble(
    decisions: &[BandDecision],
    starting_cash: f64,
    max_order_value: f64,
) -> Vec<OrderPlan> {
    let mut sells: Vec<&BandDecision> = decisions.iter().filter(|d| d.delta() < 0).collect();
    let mut buys: Vec<&BandDecision> = decisions.iter().filter(|d| d.delta() > 0).collect();
    sells.sort_by(|a, b| {
        b.deviation()
            .total_cmp(&a.deviation())
            .then(a.code.cmp(&b.code))
    });
    buys.sort_by(|a, b| {
        a.deviation()
            .total_cmp(&b.deviation())
            .then(a.code.cmp(&b.code))
    });

    let mut plan = Vec::with_capacity(sells.len() + buys.len());
    let mut running = starting_cash;

    for d in sells {
        let qty = clamp_order_value(-d.delta(), d.price, max_order_value);
        if qty <= 0 {
            continue;
        }
        running += qty as f64 * d.price;
        plan.push(OrderPlan::market(d.code, Side::Sell, qty as u64));
    }

    for d in buys {
        if running <= 0.0 {
            debug!("{}: no cash left for buy of {}", d.code, d.delta());
            break;
        }
        let mut qty = d.delta().min(round_lot(running / d.price));
        qty = clamp_order_value(qty, d.price, max_order_value);
        while qty > 0 && qty as f64 * d.price > running {
            qty -= 1;
        }
        if qty <= 0 {
            continue;
        }
        running -= qty as f64 * d.price;
        plan.push(OrderPlan::market(d.code, Side::Buy, qty as u64));
    }

    let prices: PriceMap = decisions.iter().map(|d| (d.code, d.price)).collect();
    let (plan, end_cash) = validate_cash_sufficiency(&net_orders(&plan), starting_cash, &prices);
    debug!("assembled {} orders, projected cash {end_cash:.0}", plan.len());
    plan
}

/// Collapse same-instrument BUY and SELL entries into one directional order.
///
/// Instruments that net to zero are removed. SELLs are returned before BUYs,
/// each side in order of first appearance. A netted order keeps the limit of
/// the first input order on its side.
pub fn net_orders(plan: &[OrderPlan]) -> Vec<OrderPlan> {
    let mut first_seen: Vec<Code> = Vec::new();
    let mut net: FxHashMap<Code, i64> = FxHashMap::default();
    for order in plan {
        let entry = net.entry(order.code).or_insert_with(|| {
            first_seen.push(order.code);
            0
        });
        *entry += order.signed_qty();
    }

    let limit_for = |code: Code, side: Side| {
        plan.iter()
            .find(|o| o.code == code && o.side == side)
            .and_then(|o| o.limit)
    };
    let build = |code: Code, qty: i64| {
        let side = if qty > 0 { Side::Buy } else { Side::Sell };
        OrderPlan {
            code,
            side,
            qty: qty.unsigned_abs(),
            limit: limit_for(code, side),
        }
    };

    let sells = first_seen
        .iter()
        .filter(|code| net[*code] < 0)
        .map(|code| build(*code, net[code]));
    let buys = first_seen
        .iter()
        .filter(|code| net[*code] > 0)
        .map(|code| build(*code, net[code]));
    sells.chain(buys).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> Code {
        Code::new(s)
    }

    fn decision(c: &str, price: f64, current: i64, target: i64, total: f64) -> BandDecision {
        BandDecision {
            code: code(c),
            price,
            current_qty: current,
            target_qty: target,
            current_weight: current as f64 * price / total,
            target_weight: target as f64 * price / total,
            violator: true,
        }
    }

    #[test]
    fn sells_precede_buys() {
        let decisions = [
            decision("A", 100.0, 0, 10, 2_000.0),
            decision("B", 100.0, 10, 0, 2_000.0),
        ];
        let plan = assemble(&decisions, 0.0, 0.0);
        assert_eq!(
            plan,
            vec![
                OrderPlan::market(code("B"), Side::Sell, 10),
                OrderPlan::market(code("A"), Side::Buy, 10),
            ]
        );
    }

    #[test]
    fn buys_limited_by_running_cash() {
        let decisions = [decision("A", 100.0, 0, 10, 1_000.0)];
        let plan = assemble(&decisions, 450.0, 0.0);
        assert_eq!(plan, vec![OrderPlan::market(code("A"), Side::Buy, 4)]);
    }

    #[test]
    fn most_underweight_buys_first() {
        // B is 40pp under, A is 10pp under; only one fits
        let decisions = [
            decision("A", 100.0, 0, 1, 1_000.0),
            decision("B", 100.0, 0, 4, 1_000.0),
        ];
        let plan = assemble(&decisions, 400.0, 0.0);
        assert_eq!(plan, vec![OrderPlan::market(code("B"), Side::Buy, 4)]);
    }

    #[test]
    fn most_overweight_sells_first() {
        let decisions = [
            decision("A", 100.0, 2, 0, 1_000.0),
            decision("B", 100.0, 5, 0, 1_000.0),
        ];
        let plan = assemble(&decisions, 0.0, 0.0);
        assert_eq!(plan[0].code, code("B"));
        assert_eq!(plan[1].code, code("A"));
    }

    #[test]
    fn orders_are_capped() {
        let decisions = [
            decision("A", 100.0, 0, 100, 20_000.0),
            decision("B", 100.0, 100, 0, 20_000.0),
        ];
        let plan = assemble(&decisions, 10_000.0, 1_000.0);
        assert_eq!(
            plan,
            vec![
                OrderPlan::market(code("B"), Side::Sell, 10),
                OrderPlan::market(code("A"), Side::Buy, 10),
            ]
        );
    }

    #[test]
    fn cap_below_price_removes_order() {
        let decisions = [decision("A", 5_000.0, 0, 2, 10_000.0)];
        assert!(assemble(&decisions, 10_000.0, 1_000.0).is_empty());
    }

    #[test]
    fn in_band_decisions_produce_nothing() {
        let mut d = decision("A", 100.0, 10, 11, 2_000.0);
        d.violator = false;
        assert!(assemble(&[d], 1_000.0, 0.0).is_empty());
    }

    #[test]
    fn negative_cash_blocks_buys_until_sells_cover_it() {
        let decisions = [
            decision("A", 100.0, 0, 5, 2_000.0),
            decision("B", 100.0, 3, 0, 2_000.0),
        ];
        // -100 + 300 from the sell = 200 -> two of A
        let plan = assemble(&decisions, -100.0, 0.0);
        assert_eq!(plan[1], OrderPlan::market(code("A"), Side::Buy, 2));
    }

    #[test]
    fn net_orders_collapses_opposites() {
        let plan = vec![
            OrderPlan::market(code("A"), Side::Sell, 10),
            OrderPlan::market(code("B"), Side::Sell, 5),
            OrderPlan::market(code("A"), Side::Buy, 4),
            OrderPlan::market(code("B"), Side::Buy, 5),
            OrderPlan::market(code("C"), Side::Buy, 1),
        ];
        assert_eq!(
            net_orders(&plan),
            vec![
                OrderPlan::market(code("A"), Side::Sell, 6),
                OrderPlan::market(code("C"), Side::Buy, 1),
            ]
        );
    }

    #[test]
    fn net_orders_puts_sells_first() {
        let plan = vec![
            OrderPlan::market(code("A"), Side::Buy, 1),
            OrderPlan::market(code("B"), Side::Sell, 1),
        ];
        let netted = net_orders(&plan);
        assert!(netted[0].is_sell());
        assert!(netted[1].is_buy());
    }

    #[test]
    fn net_orders_keeps_limit_of_net_side() {
        let plan = vec![
            OrderPlan::market(code("A"), Side::Buy, 5).with_limit(101.0),
            OrderPlan::market(code("A"), Side::Sell, 2).with_limit(99.0),
        ];
        assert_eq!(
            net_orders(&plan),
            vec![OrderPlan::market(code("A"), Side::Buy, 3).with_limit(101.0)]
        );
    }
}
