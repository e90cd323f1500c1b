//! Tolerance band: suppress trades whose weight deviation is too small to act on.

use log::debug;

use crate::types::{Code, Positions, TargetQuantities};
use crate::universe::Universe;

/// Per-instrument band outcome.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BandDecision {
    pub code: Code,
    pub price: f64,
    pub current_qty: i64,
    pub target_qty: i64,
    /// `current_qty * price / total_value`.
    pub current_weight: f64,
    /// `target_qty * price / total_value`.
    pub target_weight: f64,
    /// Deviation exceeds the band; the delta is retained for trading.
    pub violator: bool,
}

impl BandDecision {
    /// Quantity the instrument should end at: target for violators, current otherwise.
    #[inline]
    pub fn adjusted_qty(&self) -> i64 {
        if self.violator { self.target_qty } else { self.current_qty }
    }

    /// Signed trade quantity. Zero for instruments inside the band.
    #[inline]
    pub fn delta(&self) -> i64 {
        self.adjusted_qty() - self.current_qty
    }

    /// `current_weight - target_weight`. Positive = over-weight.
    #[inline]
    pub fn deviation(&self) -> f64 {
        self.current_weight - self.target_weight
    }
}

/// Classify every tradable instrument against the band.
///
/// `total_value` is the denominator for both weights. A non-positive total
/// yields no decisions. Decisions come back in code order.
pub fn band_filter(
    universe: &Universe,
    positions: &Positions,
    target_qty: &TargetQuantities,
    total_value: f64,
    band_pct: f64,
) -> Vec<BandDecision> {
    if total_value.is_nan() || total_value <= 0.0 {
        return Vec::new();
    }
    let band = band_pct.max(0.0) / 100.0;

    universe
        .iter()
        .map(|(code, price)| {
            let current_qty = positions.get(&code).copied().unwrap_or(0).max(0);
            let target = target_qty.get(&code).copied().unwrap_or(0).max(0);
            let current_weight = current_qty as f64 * price / total_value;
            let target_weight = target as f64 * price / total_value;
            let violator = (current_weight - target_weight).abs() > band;
            if violator {
                debug!(
                    "{code}: weight {:.2}% vs target {:.2}% ({current_qty} -> {target})",
                    current_weight * 100.0,
                    target_weight * 100.0
                );
            }
            BandDecision {
                code,
                price,
                current_qty,
                target_qty: target,
                current_weight,
                target_weight,
                violator,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PriceMap, TargetWeights};

    fn code(s: &str) -> Code {
        Code::new(s)
    }

    fn universe(prices: &[(&str, f64)]) -> Universe {
        let prices: PriceMap = prices.iter().map(|(c, p)| (code(c), *p)).collect();
        let positions: Positions = prices.keys().map(|c| (*c, 0)).collect();
        Universe::new(&positions, &TargetWeights::default(), &prices)
    }

    fn qty(pairs: &[(&str, i64)]) -> Positions {
        pairs.iter().map(|(c, q)| (code(c), *q)).collect()
    }

    #[test]
    fn within_band_keeps_current() {
        let u = universe(&[("A", 100.0)]);
        // current 50%, target 50.5% -> diff 0.5pp < 1pp
        let decisions = band_filter(&u, &qty(&[("A", 100)]), &qty(&[("A", 101)]), 20_000.0, 1.0);
        assert!(!decisions[0].violator);
        assert_eq!(decisions[0].adjusted_qty(), 100);
        assert_eq!(decisions[0].delta(), 0);
    }

    #[test]
    fn outside_band_takes_target() {
        let u = universe(&[("A", 100.0)]);
        let decisions = band_filter(&u, &qty(&[("A", 10)]), &qty(&[("A", 30)]), 10_000.0, 1.0);
        let d = decisions[0];
        assert!(d.violator);
        assert_eq!(d.adjusted_qty(), 30);
        assert_eq!(d.delta(), 20);
        assert!(d.deviation() < 0.0);
    }

    #[test]
    fn zero_holding_with_target_is_eligible() {
        let u = universe(&[("A", 100.0)]);
        let decisions = band_filter(&u, &Positions::default(), &qty(&[("A", 10)]), 1_000.0, 1.0);
        assert!(decisions[0].violator);
        assert_eq!(decisions[0].delta(), 10);
    }

    #[test]
    fn tiny_target_stays_inside_band() {
        // target 0.5% of portfolio, band 1% -> no buy
        let u = universe(&[("A", 5.0)]);
        let decisions = band_filter(&u, &Positions::default(), &qty(&[("A", 10)]), 10_000.0, 1.0);
        assert!(!decisions[0].violator);
        assert_eq!(decisions[0].delta(), 0);
    }

    #[test]
    fn zero_band_trades_any_difference() {
        let u = universe(&[("A", 1.0)]);
        let decisions = band_filter(&u, &qty(&[("A", 10)]), &qty(&[("A", 11)]), 1_000_000.0, 0.0);
        assert!(decisions[0].violator);
    }

    #[test]
    fn non_positive_total_yields_nothing() {
        let u = universe(&[("A", 1.0)]);
        assert!(band_filter(&u, &qty(&[("A", 1)]), &qty(&[("A", 1)]), 0.0, 1.0).is_empty());
        assert!(band_filter(&u, &qty(&[("A", 1)]), &qty(&[("A", 1)]), f64::NAN, 1.0).is_empty());
    }

    #[test]
    fn decisions_in_code_order() {
        let u = universe(&[("C", 1.0), ("A", 1.0), ("B", 1.0)]);
        let codes: Vec<Code> = band_filter(&u, &Positions::default(), &Positions::default(), 1.0, 1.0)
            .iter()
            .map(|d| d.code)
            .collect();
        assert_eq!(codes, vec![code("A"), code("B"), code("C")]);
    }
}
