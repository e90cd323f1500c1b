//! Shared broker types: holdings, balances, orders, quotes.

use std::fmt;

use lotplan::{Code, OrderPlan, Side};
use serde::{Deserialize, Serialize};

/// Broker-level holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub code: Code,
    pub qty: i64,
    #[serde(default)]
    pub avg_price: f64,
}

/// Cash figures as the broker reports them.
///
/// `cash` may be negative (margin debt). The optional fields are only
/// present when the broker supplies them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub cash: f64,
    /// Settlement (D+2) cash.
    #[serde(default)]
    pub settlement_cash: Option<f64>,
    /// Cash the broker will accept buy orders against right now.
    #[serde(default)]
    pub orderable_cash: Option<f64>,
    #[serde(default)]
    pub total_asset_value: Option<f64>,
}

/// Market or limit order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit(f64),
}

/// Order to submit to a broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerOrder {
    pub code: Code,
    pub side: Side,
    pub qty: u64,
    pub order_type: OrderType,
}

impl From<&OrderPlan> for BrokerOrder {
    fn from(plan: &OrderPlan) -> Self {
        Self {
            code: plan.code,
            side: plan.side,
            qty: plan.qty,
            order_type: plan.limit.map_or(OrderType::Market, OrderType::Limit),
        }
    }
}

impl fmt::Display for BrokerOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.order_type {
            OrderType::Market => write!(f, "{} {} {} MKT", self.side, self.qty, self.code),
            OrderType::Limit(p) => write!(f, "{} {} {} LMT {p:.0}", self.side, self.qty, self.code),
        }
    }
}

/// Quote from the broker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub code: Code,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
}

/// Opaque order ID returned by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Pending,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

/// An order resting at the broker, not yet fully filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub id: OrderId,
    pub order: BrokerOrder,
    #[serde(default)]
    pub filled_qty: u64,
}

impl PendingOrder {
    pub fn remaining_qty(&self) -> u64 {
        self.order.qty.saturating_sub(self.filled_qty)
    }
}
