//! Planner input errors.
//!
//! Only malformed input is an error. Business outcomes such as "nothing is
//! tradeable" or "the deficit cannot be fully cleared" are returned as data.

use crate::types::Code;

/// Errors returned by [`plan_rebalance`](crate::plan_rebalance) and input validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("invalid instrument code {0:?}: expected 1..=12 ASCII bytes")]
    InvalidCode(String),

    #[error("price for {code} is not a finite number ({price})")]
    InvalidPrice { code: Code, price: f64 },

    #[error("{field} is not a finite number ({value})")]
    InvalidCash { field: &'static str, value: f64 },

    #[error("target weight for {code} is not a finite number ({weight})")]
    InvalidWeight { code: Code, weight: f64 },

    #[error("invalid plan config: {0}")]
    InvalidConfig(String),
}
