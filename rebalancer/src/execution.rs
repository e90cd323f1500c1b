//! Execution orchestrator: cancel → plan → check → confirm → submit → reconcile.
//!
//! This is the main workflow that ties together all components.

use std::thread;
use std::time::Duration;

use log::{error, info, warn};
use lotplan::{
    estimate_cost, plan_rebalance_detailed, projected_cash, validate_cash_sufficiency, OrderPlan,
    PlanConfig, PlanOutcome, PlanPath, PriceMap, Side, Snapshot,
};
use lotplan_broker::{Broker, BrokerOrder, OrderType};
use rustc_hash::FxHashSet;

use crate::audit::{self, AuditLog};
use crate::broker::{self, AccountState};
use crate::checks::{self, CheckReport};
use crate::config::{Config, OrderStyle};
use crate::error::{Error, Result};
use crate::reconcile;
use crate::retry::RetryPolicy;
use crate::target::TargetSpec;

/// Options for a rebalance run.
pub struct RunOptions {
    pub dry_run: bool,
    pub force: bool,
    pub target_file: String,
}

/// What a run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub planned: usize,
    pub submitted: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// A computed plan with its checks, ready to submit.
pub struct PreparedPlan {
    pub outcome: PlanOutcome,
    /// Orders as they will be sent (limit prices applied).
    pub orders: Vec<OrderPlan>,
    /// Cash left once `orders` fill at their limits or last prices.
    pub projected_cash: f64,
    pub report: CheckReport,
    pub snapshot: Snapshot,
    pub plan_config: PlanConfig,
}

/// Execute a full rebalance run against the configured account.
pub fn run(config: &Config, target: &TargetSpec, opts: &RunOptions) -> Result<()> {
    let mut broker = broker::connect(config)?;

    let mut audit = AuditLog::open(&config.audit_path())?;
    audit::log_run_started(&mut audit, &opts.target_file, &config.account.id)?;

    let result = run_with(broker.as_ref(), config, target, opts, &mut audit);
    if let Err(e) = broker.disconnect() {
        warn!("disconnect failed: {e}");
    }
    let summary = result?;

    if summary.submitted + summary.failed > 0 {
        println!(
            "\n{} submitted, {} failed, {} skipped. Audit logged to {}",
            summary.submitted,
            summary.failed,
            summary.skipped,
            config.audit_path().display()
        );
    }
    Ok(())
}

/// The run workflow on an already connected broker.
pub fn run_with(
    broker: &dyn Broker,
    config: &Config,
    target: &TargetSpec,
    opts: &RunOptions,
    audit: &mut AuditLog,
) -> Result<RunSummary> {
    let retry = RetryPolicy::from_config(&config.execution);

    // 1. Clear resting orders so they cannot double up with the new plan
    if config.execution.cancel_pending {
        cancel_pending(broker, &retry, audit)?;
    }

    // 2. Account state
    let state = AccountState::fetch(broker, target)?;
    audit::log_positions(audit, &state.holdings, &state.balance)?;
    display_account(config, &state);

    // 3. Plan and check
    let prepared = prepare(&state, config, target)?;
    if prepared.orders.is_empty() {
        report_empty_plan(&prepared);
        audit.log_simple(if prepared.outcome.deficit_cleared {
            "no_rebalance_needed"
        } else {
            "deficit_unresolved"
        })?;
        return Ok(RunSummary::default());
    }

    audit::log_plan(audit, &prepared.outcome, &prepared.orders)?;
    display_plan(&prepared, config);
    println!();

    print!("{}", prepared.report);
    audit::log_checks(audit, &prepared.report)?;
    if prepared.report.has_warnings() {
        warn!("plan checks raised warnings, review before confirming");
    }

    if prepared.report.has_failures() {
        return Err(Error::CheckFailed(format!(
            "{}, aborting",
            prepared.report.failures()
        )));
    }

    let mut summary = RunSummary {
        planned: prepared.orders.len(),
        ..RunSummary::default()
    };

    // 4. Dry run stops here
    if opts.dry_run {
        println!("\n[DRY RUN] No orders submitted.");
        audit.log_simple("dry_run")?;
        return Ok(summary);
    }

    // 5. Confirm execution
    if !opts.force {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt("Execute?")
            .default(false)
            .interact()
            .map_err(|e| Error::Aborted(format!("confirmation prompt failed: {e}")))?;

        audit.log("user_confirmed", serde_json::json!({"approved": confirmed}))?;
        if !confirmed {
            println!("Aborted.");
            return Ok(summary);
        }
    }

    // 6. Submit
    enforce_max_orders_per_run(prepared.orders.len(), config.execution.max_orders_per_run)?;
    let (submitted, failed, skipped) =
        submit_orders(broker, &prepared.orders, config, &retry, audit)?;
    summary.submitted = submitted;
    summary.failed = failed;
    summary.skipped = skipped;
    audit::log_run_completed(audit, submitted, failed, skipped)?;

    // 7. Reconcile
    info!("Running post-execution reconciliation...");
    let final_state = AccountState::fetch(broker, target)?;
    let report = reconcile::reconcile(
        &final_state.holdings,
        &target.weights(),
        &final_state.prices,
        final_state.total_value(),
    );
    print!("\n{report}");
    audit::log_reconcile(audit, &report)?;

    Ok(summary)
}

/// Compute and print the plan without touching the account.
pub fn plan(config: &Config, target: &TargetSpec) -> Result<()> {
    let broker = broker::connect(config)?;
    let state = AccountState::fetch(broker.as_ref(), target)?;
    display_account(config, &state);

    let prepared = prepare(&state, config, target)?;
    if prepared.orders.is_empty() {
        report_empty_plan(&prepared);
        return Ok(());
    }
    display_plan(&prepared, config);
    println!();
    print!("{}", prepared.report);
    Ok(())
}

/// Run the planner on `state` and check the result.
///
/// With limit orders the plan is replayed at the limit prices, and any BUY
/// the limits make unaffordable is shrunk or dropped before the checks run.
pub fn prepare(state: &AccountState, config: &Config, target: &TargetSpec) -> Result<PreparedPlan> {
    let snapshot = state.snapshot(target);
    let plan_config = config.plan_config(target.band_pct);
    let outcome = plan_rebalance_detailed(&snapshot, &plan_config)?;
    info!(
        "{} path: {} orders, projected cash {:.0}",
        outcome.path,
        outcome.orders.len(),
        outcome.projected_cash
    );

    let starting_cash = snapshot.deficit().unwrap_or(outcome.cash.available_cash);
    let style = target.order_style.unwrap_or(config.execution.order_style);
    let orders = match style {
        OrderStyle::Market => outcome.orders.clone(),
        OrderStyle::Limit => {
            let limited = apply_limit_prices(
                &outcome.orders,
                &snapshot.prices,
                config.execution.limit_offset_bps,
            );
            let (funded, end_cash) =
                validate_cash_sufficiency(&limited, starting_cash, &snapshot.prices);
            if funded != limited {
                warn!("buys trimmed to fit limit prices, projected cash {end_cash:.0}");
            }
            funded
        }
    };
    let end_cash = projected_cash(&orders, starting_cash, &snapshot.prices);

    let report = checks::check_plan(
        &outcome,
        &orders,
        starting_cash,
        &snapshot.prices,
        target,
        config,
    );

    Ok(PreparedPlan {
        outcome,
        orders,
        projected_cash: end_cash,
        report,
        snapshot,
        plan_config,
    })
}

/// Show current holdings and cash.
pub fn show_positions(config: &Config) -> Result<()> {
    let broker = broker::connect(config)?;
    let balance = broker.balance()?;
    let holdings = broker.positions()?;
    let codes: Vec<_> = holdings.iter().map(|h| h.code).collect();
    let prices = broker.prices(&codes)?.into_iter().collect();

    let state = AccountState {
        balance,
        holdings,
        prices,
    };
    display_account(config, &state);
    Ok(())
}

/// List orders still open at the broker.
pub fn show_pending(config: &Config) -> Result<()> {
    let broker = broker::connect(config)?;
    let pending = broker.pending_orders()?;
    if pending.is_empty() {
        println!("No pending orders.");
        return Ok(());
    }

    println!("PENDING ORDERS ({}):", pending.len());
    println!(
        "  {:>6}  {:6} {:12} {:>8} {:>8} {:>8} {:>12}",
        "ID", "Side", "Code", "Qty", "Filled", "Left", "Limit"
    );
    for p in &pending {
        let limit = match p.order.order_type {
            OrderType::Limit(price) => format!("{price:.0}"),
            OrderType::Market => "MKT".to_string(),
        };
        println!(
            "  {:>6}  {:6} {:12} {:>8} {:>8} {:>8} {:>12}",
            p.id.0,
            p.order.side,
            p.order.code,
            p.order.qty,
            p.filled_qty,
            p.remaining_qty(),
            limit,
        );
    }
    Ok(())
}

/// Check the broker connection.
pub fn check_status(config: &Config) -> Result<()> {
    print!("Opening paper account {}... ", config.broker.snapshot);

    let broker = broker::connect(config)?;
    println!("OK");

    let balance = broker.balance()?;
    let pending = broker.pending_orders()?;
    println!(
        "Account {} ({}): {:.0} cash, {} pending orders",
        config.account.id,
        config.account.env,
        balance.cash,
        pending.len()
    );

    Ok(())
}

/// Compare current holdings against `target`.
pub fn run_reconcile(config: &Config, target: &TargetSpec) -> Result<()> {
    let broker = broker::connect(config)?;
    let state = AccountState::fetch(broker.as_ref(), target)?;

    let report = reconcile::reconcile(
        &state.holdings,
        &target.weights(),
        &state.prices,
        state.total_value(),
    );
    print!("{report}");

    Ok(())
}

// === Helpers ===

/// Cancel every pending order. Returns how many were cancelled.
///
/// A cancel that still fails after retries is logged and skipped; the order
/// stays pending and its key keeps a matching new order from being sent.
pub fn cancel_pending(
    broker: &dyn Broker,
    retry: &RetryPolicy,
    audit: &mut AuditLog,
) -> Result<usize> {
    let pending = broker.pending_orders()?;
    let mut cancelled = 0;
    for order in &pending {
        info!(
            "cancelling pending {} {} {} ({} left)",
            order.id,
            order.order.side,
            order.order.code,
            order.remaining_qty()
        );
        match retry.run("cancel", || broker.cancel_order(order.id)) {
            Ok(()) => {
                audit::log_pending_cancelled(audit, order)?;
                cancelled += 1;
            }
            Err(e) => {
                warn!("could not cancel {}: {e}", order.id);
                audit::log_pending_cancel_failed(audit, order, &e.to_string())?;
            }
        }
    }
    Ok(cancelled)
}

/// Attach limit prices offset from the last price: BUY above, SELL below.
///
/// Orders on instruments without a positive price stay market orders.
pub fn apply_limit_prices(orders: &[OrderPlan], prices: &PriceMap, offset_bps: u32) -> Vec<OrderPlan> {
    let offset = f64::from(offset_bps) / 10_000.0;
    orders
        .iter()
        .map(|order| match prices.get(&order.code).copied().filter(|&p| p > 0.0) {
            Some(price) => {
                let limit = match order.side {
                    Side::Buy => price * (1.0 + offset),
                    Side::Sell => price * (1.0 - offset),
                };
                order.with_limit(limit.round())
            }
            None => *order,
        })
        .collect()
}

/// Idempotency key: `SIDE:CODE:QTY:LIMIT` or `SIDE:CODE:QTY:MKT`.
pub fn order_key(order: &BrokerOrder) -> String {
    match order.order_type {
        OrderType::Limit(price) => {
            format!("{}:{}:{}:{price:.0}", order.side, order.code, order.qty)
        }
        OrderType::Market => format!("{}:{}:{}:MKT", order.side, order.code, order.qty),
    }
}

pub fn enforce_max_orders_per_run(order_count: usize, max_orders_per_run: usize) -> Result<()> {
    if order_count > max_orders_per_run {
        return Err(Error::CheckFailed(format!(
            "{order_count} orders exceeds max_orders_per_run {max_orders_per_run}"
        )));
    }
    Ok(())
}

/// Submit orders in plan order. Returns (submitted, failed, skipped).
///
/// Orders whose key matches one already sent this run, or one still pending
/// at the broker, are skipped. Transient errors are retried per `retry`; an
/// order that still fails does not stop the run.
pub fn submit_orders(
    broker: &dyn Broker,
    orders: &[OrderPlan],
    config: &Config,
    retry: &RetryPolicy,
    audit: &mut AuditLog,
) -> Result<(usize, usize, usize)> {
    let mut seen: FxHashSet<String> = broker
        .pending_orders()?
        .iter()
        .map(|p| order_key(&p.order))
        .collect();

    let interval = Duration::from_millis(config.execution.order_interval_ms);
    let mut submitted = 0;
    let mut failed = 0;
    let mut skipped = 0;

    for (i, order) in orders.iter().enumerate() {
        let broker_order = BrokerOrder::from(order);
        let key = order_key(&broker_order);
        if !seen.insert(key.clone()) {
            warn!("skipping duplicate order {key}");
            audit::log_order_skipped(audit, order, &key)?;
            skipped += 1;
            continue;
        }

        print!("[{}/{}] {broker_order} ... ", i + 1, orders.len());
        match retry.run("submit", || broker.submit_order(&broker_order)) {
            Ok(id) => {
                println!("SUBMITTED {id}");
                audit::log_order_submitted(audit, order, id)?;
                submitted += 1;
            }
            Err(e) => {
                println!("ERROR: {e}");
                error!("Order submission failed for {}: {e}", order.code);
                audit::log_order_failed(audit, order, &e.to_string())?;
                failed += 1;
            }
        }

        // Rate limiting between orders
        if i + 1 < orders.len() && !interval.is_zero() {
            thread::sleep(interval);
        }
    }

    Ok((submitted, failed, skipped))
}

fn display_account(config: &Config, state: &AccountState) {
    let balance = &state.balance;
    println!(
        "Account {} ({}): {:.0} total, {:.0} cash",
        config.account.id,
        config.account.env,
        state.total_value(),
        balance.cash,
    );
    if let Some(settlement) = balance.settlement_cash {
        println!("  settlement cash {settlement:.0}");
    }
    if let Some(orderable) = balance.orderable_cash {
        println!("  orderable cash {orderable:.0}");
    }

    if state.holdings.is_empty() {
        println!("No positions.");
        return;
    }

    let total = state.total_value();
    println!("\nCURRENT PORTFOLIO:");
    for h in &state.holdings {
        match state.prices.get(&h.code).copied().filter(|&p| p > 0.0) {
            Some(price) => {
                let value = h.qty as f64 * price;
                let weight = if total > 0.0 { value / total } else { 0.0 };
                println!(
                    "  {:12} {:>8} @ {:>10.0} = {:>14.0}  ({:.1}%)",
                    h.code,
                    h.qty,
                    price,
                    value,
                    weight * 100.0,
                );
            }
            None => println!("  {:12} {:>8}   (no quote)", h.code, h.qty),
        }
    }
}

fn display_plan(prepared: &PreparedPlan, config: &Config) {
    let outcome = &prepared.outcome;
    let prices = &prepared.snapshot.prices;
    println!("\nREBALANCE ORDERS ({} path):", outcome.path);
    println!(
        "  {:>3}  {:6} {:12} {:>8} {:>12} {:>14}",
        "#", "Side", "Code", "Qty", "Limit", "Notional"
    );

    for (i, order) in prepared.orders.iter().enumerate() {
        let notional = prices
            .get(&order.code)
            .map_or(0.0, |&p| order.notional(order.limit.unwrap_or(p)));
        let limit = order
            .limit
            .map_or_else(|| "MKT".to_string(), |l| format!("{l:.0}"));
        println!(
            "  {:>3}  {:6} {:12} {:>8} {:>12} {:>14.0}",
            i + 1,
            order.side,
            order.code,
            order.qty,
            limit,
            notional,
        );
    }

    let cost = estimate_cost(&prepared.orders, prices, config.cost.commission_rate);
    println!("\nEst. cost: {cost}");
    println!("Projected cash: {:.0}", prepared.projected_cash);

    let savings = outcome.netting();
    if savings.saved > 0 {
        println!("Netting: {savings}");
    }
}

fn report_empty_plan(prepared: &PreparedPlan) {
    let outcome = &prepared.outcome;
    if outcome.path == PlanPath::Deficit && !outcome.deficit_cleared {
        warn!("margin debt unresolved: nothing tradable to sell");
        println!(
            "\nNo orders possible: margin debt {:.0} remains.",
            -outcome.projected_cash
        );
    } else {
        println!("\nNo rebalancing needed: portfolio is within band of target.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotplan::Code;

    fn prices() -> PriceMap {
        [(Code::new("A"), 10_000.0), (Code::new("B"), 3_333.0)]
            .into_iter()
            .collect()
    }

    #[test]
    fn limit_prices_straddle_last() {
        let orders = vec![
            OrderPlan::market(Code::new("A"), Side::Sell, 3),
            OrderPlan::market(Code::new("B"), Side::Buy, 9),
        ];
        let limited = apply_limit_prices(&orders, &prices(), 5);
        assert_eq!(limited[0].limit, Some(9_995.0));
        // 3333 * 1.0005 = 3334.67 rounds up
        assert_eq!(limited[1].limit, Some(3_335.0));
        assert_eq!(limited[1].qty, 9);
    }

    #[test]
    fn limit_pricing_skips_unquoted() {
        let orders = vec![OrderPlan::market(Code::new("Z"), Side::Buy, 1)];
        let limited = apply_limit_prices(&orders, &prices(), 5);
        assert_eq!(limited[0].limit, None);
    }

    #[test]
    fn order_key_format() {
        let market = BrokerOrder::from(&OrderPlan::market(Code::new("A"), Side::Buy, 10));
        assert_eq!(order_key(&market), "BUY:A:10:MKT");

        let limit = BrokerOrder::from(
            &OrderPlan::market(Code::new("A"), Side::Sell, 4).with_limit(9_995.0),
        );
        assert_eq!(order_key(&limit), "SELL:A:4:9995");
    }

    #[test]
    fn max_orders_guard() {
        assert!(enforce_max_orders_per_run(50, 50).is_ok());
        assert!(matches!(
            enforce_max_orders_per_run(51, 50),
            Err(Error::CheckFailed(_))
        ));
    }
}
