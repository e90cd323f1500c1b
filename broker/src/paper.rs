//! Paper broker: an in-memory account implementing the `Broker` trait.
//!
//! Loaded from a JSON account snapshot or assembled with a builder. Fills are
//! simulated against the stored quotes and applied to the in-memory holdings
//! and cash, so a run can be reconciled against the same broker afterwards.
//!
//! ```
//! use lotplan::Code;
//! use lotplan_broker::paper::{FillMode, PaperBroker};
//!
//! let broker = PaperBroker::builder()
//!     .fill_mode(FillMode::Immediate)
//!     .with_holding(Code::new("379810"), 100, 12_000.0)
//!     .with_price(Code::new("379810"), 12_500.0)
//!     .with_cash(1_000_000.0)
//!     .build();
//! ```

use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info};
use lotplan::{Code, Side};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::Broker;
use crate::error::BrokerError;
use crate::types::*;

/// How the paper broker handles submitted orders.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    /// Orders fill in full at the limit price (or last price for market).
    #[default]
    Immediate,
    /// Orders are accepted and rest as pending until cancelled.
    Resting,
    /// All orders are rejected.
    Reject,
}

/// On-disk account snapshot.
///
/// ```json
/// {
///   "balance": { "cash": 1000000, "settlement_cash": 1000000 },
///   "holdings": [ { "code": "379810", "qty": 100, "avg_price": 12000 } ],
///   "prices": { "379810": 12500 },
///   "fill_mode": "immediate"
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub balance: Balance,
    #[serde(default)]
    pub holdings: Vec<Holding>,
    #[serde(default)]
    pub prices: FxHashMap<Code, f64>,
    #[serde(default)]
    pub pending: Vec<PendingOrder>,
    #[serde(default)]
    pub fill_mode: FillMode,
}

/// Builder for `PaperBroker`.
pub struct PaperBrokerBuilder {
    snapshot: AccountSnapshot,
}

impl PaperBrokerBuilder {
    pub fn fill_mode(mut self, mode: FillMode) -> Self {
        self.snapshot.fill_mode = mode;
        self
    }

    pub fn with_holding(mut self, code: Code, qty: i64, avg_price: f64) -> Self {
        self.snapshot.holdings.push(Holding {
            code,
            qty,
            avg_price,
        });
        self
    }

    pub fn with_price(mut self, code: Code, price: f64) -> Self {
        self.snapshot.prices.insert(code, price);
        self
    }

    pub fn with_cash(mut self, cash: f64) -> Self {
        self.snapshot.balance.cash = cash;
        self
    }

    pub fn with_settlement_cash(mut self, settlement_cash: f64) -> Self {
        self.snapshot.balance.settlement_cash = Some(settlement_cash);
        self
    }

    pub fn with_pending(mut self, id: u64, order: BrokerOrder) -> Self {
        self.snapshot.pending.push(PendingOrder {
            id: OrderId(id),
            order,
            filled_qty: 0,
        });
        self
    }

    pub fn build(self) -> PaperBroker {
        PaperBroker::from_snapshot(self.snapshot)
    }
}

/// Mutable account state behind the broker's shared reference.
#[derive(Debug)]
struct Ledger {
    balance: Balance,
    holdings: FxHashMap<Code, Holding>,
    pending: Vec<PendingOrder>,
    submitted: Vec<BrokerOrder>,
    cancelled: Vec<OrderId>,
    next_order_id: u64,
}

/// An in-memory broker that records submitted orders and simulates fills.
pub struct PaperBroker {
    connected: bool,
    fill_mode: FillMode,
    prices: FxHashMap<Code, f64>,
    ledger: Mutex<Ledger>,
}

impl PaperBroker {
    pub fn builder() -> PaperBrokerBuilder {
        PaperBrokerBuilder {
            snapshot: AccountSnapshot::default(),
        }
    }

    pub fn from_snapshot(snapshot: AccountSnapshot) -> Self {
        let next_order_id = snapshot.pending.iter().map(|p| p.id.0).max().unwrap_or(0) + 1;
        let holdings = snapshot
            .holdings
            .into_iter()
            .map(|h| (h.code, h))
            .collect();
        Self {
            connected: false,
            fill_mode: snapshot.fill_mode,
            prices: snapshot.prices,
            ledger: Mutex::new(Ledger {
                balance: snapshot.balance,
                holdings,
                pending: snapshot.pending,
                submitted: Vec::new(),
                cancelled: Vec::new(),
                next_order_id,
            }),
        }
    }

    /// Load an account snapshot from a JSON file.
    pub fn load(path: &Path) -> Result<Self, BrokerError> {
        let content = fs::read_to_string(path)
            .map_err(|e| BrokerError::Snapshot(format!("{}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, BrokerError> {
        let snapshot: AccountSnapshot =
            serde_json::from_str(json).map_err(|e| BrokerError::Snapshot(e.to_string()))?;
        info!(
            "paper account: {} holdings, {} quotes, cash {:.0}",
            snapshot.holdings.len(),
            snapshot.prices.len(),
            snapshot.balance.cash
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// Orders submitted so far (for assertion in tests and reporting).
    pub fn submitted_orders(&self) -> Vec<BrokerOrder> {
        self.ledger().submitted.clone()
    }

    /// IDs cancelled so far.
    pub fn cancelled_orders(&self) -> Vec<OrderId> {
        self.ledger().cancelled.clone()
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_connected(&self) -> Result<(), BrokerError> {
        if self.connected {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }

    fn fill_price(&self, order: &BrokerOrder) -> Result<f64, BrokerError> {
        match order.order_type {
            OrderType::Limit(price) => Ok(price),
            OrderType::Market => self
                .prices
                .get(&order.code)
                .copied()
                .filter(|&p| p > 0.0)
                .ok_or_else(|| BrokerError::UnknownInstrument(order.code.to_string())),
        }
    }
}

impl Ledger {
    fn apply_fill(&mut self, order: &BrokerOrder, price: f64) -> Result<(), BrokerError> {
        let notional = order.qty as f64 * price;
        let qty = i64::try_from(order.qty)
            .map_err(|_| BrokerError::Order("quantity exceeds i64::MAX".into()))?;
        let held = self.holdings.get(&order.code).map_or(0, |h| h.qty);
        if order.side == Side::Sell && qty > held {
            return Err(BrokerError::Order(format!(
                "sell {} {} exceeds holding {held}",
                order.qty, order.code
            )));
        }

        let holding = self.holdings.entry(order.code).or_insert(Holding {
            code: order.code,
            qty: 0,
            avg_price: 0.0,
        });
        match order.side {
            Side::Buy => {
                let cost = holding.avg_price * holding.qty as f64 + notional;
                holding.qty += qty;
                holding.avg_price = cost / holding.qty as f64;
                self.balance.cash -= notional;
            }
            Side::Sell => {
                holding.qty -= qty;
                self.balance.cash += notional;
            }
        }
        if holding.qty == 0 {
            self.holdings.remove(&order.code);
        }
        // Settlement and orderable figures move with cash in a paper account
        if let Some(s) = self.balance.settlement_cash.as_mut() {
            *s += order.side.sign() as f64 * -notional;
        }
        if let Some(o) = self.balance.orderable_cash.as_mut() {
            *o += order.side.sign() as f64 * -notional;
        }
        Ok(())
    }
}

impl Broker for PaperBroker {
    fn connect(&mut self) -> Result<(), BrokerError> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.connected = false;
        Ok(())
    }

    fn positions(&self) -> Result<Vec<Holding>, BrokerError> {
        self.ensure_connected()?;
        let mut holdings: Vec<Holding> = self.ledger().holdings.values().cloned().collect();
        holdings.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(holdings)
    }

    fn balance(&self) -> Result<Balance, BrokerError> {
        self.ensure_connected()?;
        Ok(self.ledger().balance.clone())
    }

    fn quote(&self, code: &Code) -> Result<Quote, BrokerError> {
        self.ensure_connected()?;
        self.prices
            .get(code)
            .map(|&last| Quote {
                code: *code,
                bid: last,
                ask: last,
                last,
            })
            .ok_or_else(|| BrokerError::UnknownInstrument(code.to_string()))
    }

    fn pending_orders(&self) -> Result<Vec<PendingOrder>, BrokerError> {
        self.ensure_connected()?;
        Ok(self.ledger().pending.clone())
    }

    fn submit_order(&self, order: &BrokerOrder) -> Result<OrderId, BrokerError> {
        self.ensure_connected()?;
        if order.qty == 0 {
            return Err(BrokerError::Order("zero quantity".into()));
        }

        let mut ledger = self.ledger();
        ledger.submitted.push(order.clone());
        let id = OrderId(ledger.next_order_id);
        ledger.next_order_id += 1;

        match self.fill_mode {
            FillMode::Reject => Err(BrokerError::Order("paper: order rejected".into())),
            FillMode::Resting => {
                debug!("{id} resting: {order}");
                ledger.pending.push(PendingOrder {
                    id,
                    order: order.clone(),
                    filled_qty: 0,
                });
                Ok(id)
            }
            FillMode::Immediate => {
                let price = self.fill_price(order)?;
                ledger.apply_fill(order, price)?;
                debug!("{id} filled: {order} @ {price:.0}");
                Ok(id)
            }
        }
    }

    fn cancel_order(&self, id: OrderId) -> Result<(), BrokerError> {
        self.ensure_connected()?;
        let mut ledger = self.ledger();
        let before = ledger.pending.len();
        ledger.pending.retain(|p| p.id != id);
        if ledger.pending.len() == before {
            return Err(BrokerError::Order(format!("no pending order {id}")));
        }
        ledger.cancelled.push(id);
        Ok(())
    }
}
