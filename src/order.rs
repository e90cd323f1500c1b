//! Planned orders: the planner's only output.

use std::fmt;

use crate::side::Side;
use crate::types::Code;

/// A single instruction in a rebalance plan.
///
/// `qty` is always strictly positive in plans returned by the planner.
/// `limit` of `None` means a market order.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrderPlan {
    pub code: Code,
    pub side: Side,
    pub qty: u64,
    pub limit: Option<f64>,
}

impl OrderPlan {
    /// A market order.
    #[inline]
    pub fn market(code: Code, side: Side, qty: u64) -> Self {
        Self {
            code,
            side,
            qty,
            limit: None,
        }
    }

    /// The same order with a limit price attached.
    #[inline]
    pub fn with_limit(self, limit: f64) -> Self {
        Self {
            limit: Some(limit),
            ..self
        }
    }

    /// Order value at `price`.
    #[inline]
    pub fn notional(&self, price: f64) -> f64 {
        self.qty as f64 * price
    }

    /// Signed quantity: positive for buys, negative for sells.
    #[inline]
    pub fn signed_qty(&self) -> i64 {
        self.side.sign() * self.qty as i64
    }

    pub fn is_buy(&self) -> bool {
        self.side == Side::Buy
    }

    pub fn is_sell(&self) -> bool {
        self.side == Side::Sell
    }
}

impl fmt::Display for OrderPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.limit {
            Some(limit) => write!(f, "{} {} {} @ {limit:.0}", self.side, self.qty, self.code),
            None => write!(f, "{} {} {} @ MKT", self.side, self.qty, self.code),
        }
    }
}
