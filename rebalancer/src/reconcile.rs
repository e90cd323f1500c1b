//! Post-execution reconciliation: compare actual holdings vs target.

use std::fmt;

use lotplan::{Code, PriceMap, TargetWeights};
use lotplan_broker::Holding;
use rustc_hash::FxHashMap;
use serde::Serialize;

/// Reconciliation report comparing actual vs target.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub entries: Vec<ReconcileEntry>,
    pub tracking_error_pct: f64,
}

/// One instrument's reconciliation entry.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileEntry {
    pub code: String,
    pub target_weight: f64,
    pub actual_weight: f64,
    pub diff_weight: f64,
    pub target_qty: i64,
    pub actual_qty: i64,
    pub diff_qty: i64,
}

/// Compare actual holdings against targets.
///
/// Weights are measured against `total_value`. Target quantities are the
/// whole units `total_value * weight` buys at the current price. Tracking
/// error is the root-mean-square weight difference, in percent.
pub fn reconcile(
    holdings: &[Holding],
    targets: &TargetWeights,
    prices: &PriceMap,
    total_value: f64,
) -> ReconcileReport {
    let actual: FxHashMap<Code, i64> = holdings.iter().map(|h| (h.code, h.qty)).collect();

    let mut codes: Vec<Code> = targets.keys().copied().collect();
    codes.extend(holdings.iter().map(|h| h.code));
    codes.sort();
    codes.dedup();

    let mut entries = Vec::with_capacity(codes.len());
    let mut sum_sq_diff = 0.0_f64;

    for code in &codes {
        let price = prices.get(code).copied().filter(|&p| p > 0.0);
        let target_weight = targets.get(code).copied().unwrap_or(0.0).max(0.0);
        let actual_qty = actual.get(code).copied().unwrap_or(0);

        let (actual_weight, target_qty) = match price {
            Some(p) if total_value > 0.0 => (
                actual_qty as f64 * p / total_value,
                (total_value * target_weight / p).floor() as i64,
            ),
            _ => (0.0, 0),
        };

        let diff_weight = actual_weight - target_weight;
        sum_sq_diff += diff_weight * diff_weight;

        entries.push(ReconcileEntry {
            code: code.to_string(),
            target_weight,
            actual_weight,
            diff_weight,
            target_qty,
            actual_qty,
            diff_qty: actual_qty - target_qty,
        });
    }

    let tracking_error_pct = (sum_sq_diff / codes.len().max(1) as f64).sqrt() * 100.0;

    ReconcileReport {
        entries,
        tracking_error_pct,
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RECONCILIATION:")?;
        writeln!(
            f,
            "  {:12} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "Code", "Target%", "Actual%", "Diff%", "TargetQty", "ActualQty"
        )?;
        for e in &self.entries {
            writeln!(
                f,
                "  {:12} {:>9.2}% {:>9.2}% {:>+9.2}% {:>10} {:>10}",
                e.code,
                e.target_weight * 100.0,
                e.actual_weight * 100.0,
                e.diff_weight * 100.0,
                e.target_qty,
                e.actual_qty,
            )?;
        }
        writeln!(f, "\n  Tracking error: {:.3}%", self.tracking_error_pct)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding(code: &str, qty: i64) -> Holding {
        Holding {
            code: Code::new(code),
            qty,
            avg_price: 0.0,
        }
    }

    fn map(pairs: &[(&str, f64)]) -> FxHashMap<Code, f64> {
        pairs.iter().map(|&(c, v)| (Code::new(c), v)).collect()
    }

    #[test]
    fn perfect_match() {
        let holdings = vec![holding("379810", 50)];
        let targets = map(&[("379810", 0.5)]);
        let prices = map(&[("379810", 10_000.0)]);

        let report = reconcile(&holdings, &targets, &prices, 1_000_000.0);
        assert!(report.tracking_error_pct < 1e-9);
        assert_eq!(report.entries[0].target_qty, 50);
        assert_eq!(report.entries[0].diff_qty, 0);
    }

    #[test]
    fn missing_position() {
        let targets = map(&[("379810", 0.5)]);
        let prices = map(&[("379810", 10_000.0)]);

        let report = reconcile(&[], &targets, &prices, 1_000_000.0);
        assert!((report.tracking_error_pct - 50.0).abs() < 1e-9);
        assert_eq!(report.entries[0].actual_qty, 0);
        assert_eq!(report.entries[0].diff_qty, -50);
    }

    #[test]
    fn extra_position() {
        let holdings = vec![holding("379810", 50), holding("458730", 10)];
        let targets = map(&[("379810", 0.5)]);
        let prices = map(&[("379810", 10_000.0), ("458730", 20_000.0)]);

        let report = reconcile(&holdings, &targets, &prices, 1_000_000.0);
        let extra = report.entries.iter().find(|e| e.code == "458730").unwrap();
        assert_eq!(extra.target_weight, 0.0);
        assert!((extra.actual_weight - 0.2).abs() < 1e-12);
        assert_eq!(extra.target_qty, 0);
    }

    #[test]
    fn unpriced_instrument_has_no_weight() {
        let holdings = vec![holding("A", 5)];
        let targets = map(&[("A", 0.3)]);

        let report = reconcile(&holdings, &targets, &FxHashMap::default(), 1_000.0);
        assert_eq!(report.entries[0].actual_weight, 0.0);
        assert_eq!(report.entries[0].target_qty, 0);
    }

    #[test]
    fn entries_sorted_by_code() {
        let holdings = vec![holding("B", 1)];
        let targets = map(&[("C", 0.2), ("A", 0.2)]);

        let report = reconcile(&holdings, &targets, &FxHashMap::default(), 1_000.0);
        let codes: Vec<&str> = report.entries.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["A", "B", "C"]);
    }

    #[test]
    fn display_format() {
        let report = ReconcileReport {
            entries: vec![ReconcileEntry {
                code: "379810".into(),
                target_weight: 0.5,
                actual_weight: 0.49,
                diff_weight: -0.01,
                target_qty: 50,
                actual_qty: 49,
                diff_qty: -1,
            }],
            tracking_error_pct: 1.0,
        };
        let s = format!("{report}");
        assert!(s.contains("379810"));
        assert!(s.contains("Tracking error"));
    }
}
