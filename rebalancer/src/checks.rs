//! Post-plan checks.
//!
//! Validates a computed plan against account and execution limits before
//! anything is submitted. Any FAIL aborts the run.

use std::fmt;

use lotplan::{insufficient_orders, projected_cash, OrderPlan, PlanOutcome, PlanPath, PriceMap};
use serde::Serialize;

use crate::config::Config;
use crate::target::TargetSpec;

/// Result of running all plan checks.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub checks: Vec<Check>,
}

/// A single check result.
#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub name: &'static str,
    pub status: CheckStatus,
    pub detail: String,
}

/// Whether a check passed, warned, or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Pass => write!(f, "PASS"),
            CheckStatus::Warn => write!(f, "WARN"),
            CheckStatus::Fail => write!(f, "FAIL"),
        }
    }
}

impl CheckReport {
    /// True if any check failed (not just warned).
    pub fn has_failures(&self) -> bool {
        self.checks.iter().any(|c| c.status == CheckStatus::Fail)
    }

    /// True if any check warned.
    pub fn has_warnings(&self) -> bool {
        self.checks.iter().any(|c| c.status == CheckStatus::Warn)
    }

    /// Names of failed checks, comma separated.
    pub fn failures(&self) -> String {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Fail)
            .map(|c| c.name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn push(&mut self, name: &'static str, status: CheckStatus, detail: String) {
        self.checks.push(Check {
            name,
            status,
            detail,
        });
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PLAN CHECKS:")?;
        for check in &self.checks {
            writeln!(f, "  [{}] {}: {}", check.status, check.name, check.detail)?;
        }
        Ok(())
    }
}

/// Run all post-plan checks.
///
/// Cash checks replay `orders` rather than the planner's own list, so limit
/// prices are costed at the limit.
///
/// # Arguments
/// - `outcome`: The planner result
/// - `orders`: Orders about to be submitted (limit prices applied)
/// - `starting_cash`: Cash the plan is replayed against (the deficit on the deficit path)
/// - `prices`: Last prices the plan was computed at
/// - `target`: The target file for this run
/// - `config`: Rebalancer configuration
pub fn check_plan(
    outcome: &PlanOutcome,
    orders: &[OrderPlan],
    starting_cash: f64,
    prices: &PriceMap,
    target: &TargetSpec,
    config: &Config,
) -> CheckReport {
    let mut report = CheckReport { checks: Vec::new() };

    // 1. Projected cash. A best-effort deficit plan is allowed to end short.
    let end_cash = projected_cash(orders, starting_cash, prices);
    let cash_status = if end_cash >= 0.0 {
        CheckStatus::Pass
    } else if outcome.path == PlanPath::Deficit {
        CheckStatus::Warn
    } else {
        CheckStatus::Fail
    };
    report.push(
        "Projected cash",
        cash_status,
        format!("{end_cash:.0} after all fills"),
    );

    // 2. Margin debt
    match outcome.path {
        PlanPath::Normal => report.push("Deficit", CheckStatus::Pass, "no margin debt".into()),
        PlanPath::Deficit if outcome.deficit_cleared => report.push(
            "Deficit",
            CheckStatus::Pass,
            format!(
                "cleared, reserve {:.1}%",
                outcome.reserve_ratio.unwrap_or(0.0) * 100.0
            ),
        ),
        PlanPath::Deficit => report.push(
            "Deficit",
            CheckStatus::Warn,
            "not fully cleared (best effort)".into(),
        ),
    }

    // 3. Every buy covered by cash on hand plus sell proceeds
    let bounced = insufficient_orders(orders, starting_cash, prices);
    if bounced.is_empty() {
        report.push("Cash coverage", CheckStatus::Pass, "all buys funded".into());
    } else {
        let names: Vec<String> = bounced.iter().map(|o| o.to_string()).collect();
        report.push(
            "Cash coverage",
            CheckStatus::Fail,
            format!("unfunded: {}", names.join(", ")),
        );
    }

    // 4. Per-order value cap (0 = unlimited)
    let cap = config.planning.max_order_value;
    let largest = orders
        .iter()
        .filter_map(|o| {
            prices
                .get(&o.code)
                .map(|&p| (o, o.notional(o.limit.unwrap_or(p))))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1));
    match largest {
        Some((order, value)) if cap > 0.0 && value > cap => report.push(
            "Order value",
            CheckStatus::Fail,
            format!("{} {value:.0} > {cap:.0} limit", order.code),
        ),
        Some((order, value)) if cap > 0.0 => report.push(
            "Order value",
            CheckStatus::Pass,
            format!("max {value:.0} ({}) <= {cap:.0} limit", order.code),
        ),
        _ => report.push("Order value", CheckStatus::Pass, "unlimited".into()),
    }

    // 5. Order count
    let max_orders = config.execution.max_orders_per_run;
    report.push(
        "Order count",
        if orders.len() <= max_orders {
            CheckStatus::Pass
        } else {
            CheckStatus::Fail
        },
        format!("{} orders, {max_orders} max per run", orders.len()),
    );

    // 6. Allocation summary; unquoted targets cannot be bought
    let unpriced: Vec<String> = target
        .codes()
        .iter()
        .filter(|c| prices.get(*c).is_none_or(|&p| p <= 0.0))
        .map(|c| c.to_string())
        .collect();
    let allocation = format!(
        "{:.1}% invested, {:.1}% cash",
        target.weight_sum() * 100.0,
        target.cash_weight() * 100.0
    );
    if unpriced.is_empty() {
        report.push("Allocation", CheckStatus::Pass, allocation);
    } else {
        report.push(
            "Allocation",
            CheckStatus::Warn,
            format!("{allocation}; no price for {}", unpriced.join(", ")),
        );
    }

    report
}
