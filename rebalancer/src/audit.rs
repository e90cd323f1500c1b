//! JSONL audit trail logging.
//!
//! Each rebalancer run appends events to an audit.jsonl file,
//! one JSON object per line.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use lotplan::{OrderPlan, PlanOutcome};
use lotplan_broker::{Balance, Holding, OrderId, PendingOrder};
use serde::Serialize;

use crate::checks::CheckReport;
use crate::error::Result;
use crate::reconcile::ReconcileReport;

/// An audit event written to the JSONL trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: BufWriter<std::fs::File>,
}

impl AuditLog {
    /// Open (or create) the audit log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Log an event with arbitrary JSON data.
    pub fn log(&mut self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            data,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Log a simple event with no additional data.
    pub fn log_simple(&mut self, event: &'static str) -> Result<()> {
        self.log(event, serde_json::json!({}))
    }
}

fn order_json(order: &OrderPlan) -> serde_json::Value {
    serde_json::json!({
        "code": order.code.as_str(),
        "side": order.side.to_string(),
        "qty": order.qty,
        "limit": order.limit,
    })
}

pub fn log_run_started(audit: &mut AuditLog, target_file: &str, account_id: &str) -> Result<()> {
    audit.log(
        "run_started",
        serde_json::json!({
            "target_file": target_file,
            "account": account_id,
        }),
    )
}

pub fn log_pending_cancelled(audit: &mut AuditLog, pending: &PendingOrder) -> Result<()> {
    audit.log(
        "pending_cancelled",
        serde_json::json!({
            "id": pending.id.0,
            "code": pending.order.code.as_str(),
            "side": pending.order.side.to_string(),
            "remaining": pending.remaining_qty(),
        }),
    )
}

pub fn log_pending_cancel_failed(
    audit: &mut AuditLog,
    pending: &PendingOrder,
    reason: &str,
) -> Result<()> {
    audit.log(
        "pending_cancel_failed",
        serde_json::json!({
            "id": pending.id.0,
            "code": pending.order.code.as_str(),
            "reason": reason,
        }),
    )
}

pub fn log_positions(audit: &mut AuditLog, holdings: &[Holding], balance: &Balance) -> Result<()> {
    let holding_data: Vec<_> = holdings
        .iter()
        .map(|h| {
            serde_json::json!({
                "code": h.code.as_str(),
                "qty": h.qty,
                "avg_price": h.avg_price,
            })
        })
        .collect();

    audit.log(
        "positions_fetched",
        serde_json::json!({
            "holdings": holding_data,
            "cash": balance.cash,
            "settlement_cash": balance.settlement_cash,
            "orderable_cash": balance.orderable_cash,
            "total_asset_value": balance.total_asset_value,
        }),
    )
}

pub fn log_plan(audit: &mut AuditLog, outcome: &PlanOutcome, orders: &[OrderPlan]) -> Result<()> {
    let order_data: Vec<_> = orders.iter().map(order_json).collect();

    audit.log(
        "plan_computed",
        serde_json::json!({
            "path": outcome.path.to_string(),
            "usable_cash": outcome.cash.usable_cash,
            "projected_cash": outcome.projected_cash,
            "reserve_ratio": outcome.reserve_ratio,
            "deficit_cleared": outcome.deficit_cleared,
            "orders": order_data,
        }),
    )
}

pub fn log_checks(audit: &mut AuditLog, report: &CheckReport) -> Result<()> {
    let check_data: Vec<_> = report
        .checks
        .iter()
        .map(|c| {
            serde_json::json!({
                "name": c.name,
                "status": c.status.to_string(),
                "detail": c.detail,
            })
        })
        .collect();

    audit.log(
        "plan_checks",
        serde_json::json!({
            "passed": !report.has_failures(),
            "checks": check_data,
        }),
    )
}

pub fn log_order_submitted(audit: &mut AuditLog, order: &OrderPlan, id: OrderId) -> Result<()> {
    let mut data = order_json(order);
    data["order_id"] = serde_json::json!(id.0);
    audit.log("order_submitted", data)
}

pub fn log_order_failed(audit: &mut AuditLog, order: &OrderPlan, reason: &str) -> Result<()> {
    let mut data = order_json(order);
    data["reason"] = serde_json::json!(reason);
    audit.log("order_failed", data)
}

pub fn log_order_skipped(audit: &mut AuditLog, order: &OrderPlan, key: &str) -> Result<()> {
    let mut data = order_json(order);
    data["key"] = serde_json::json!(key);
    audit.log("order_skipped_duplicate", data)
}

pub fn log_run_completed(
    audit: &mut AuditLog,
    submitted: usize,
    failed: usize,
    skipped: usize,
) -> Result<()> {
    audit.log(
        "run_completed",
        serde_json::json!({
            "submitted": submitted,
            "failed": failed,
            "skipped": skipped,
        }),
    )
}

pub fn log_reconcile(audit: &mut AuditLog, report: &ReconcileReport) -> Result<()> {
    audit.log(
        "reconciled",
        serde_json::json!({
            "tracking_error_pct": report.tracking_error_pct,
            "entries": serde_json::to_value(&report.entries)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?,
        }),
    )
}
