//! lotplan-rebalancer: runs the lotplan planner against a broker account.
//!
//! Reads target weights from a JSON file, fetches holdings, cash and quotes
//! from the broker, plans with [`lotplan::plan_rebalance_detailed`], checks
//! the plan, and submits orders one at a time with an audit trail.

pub mod audit;
pub mod broker;
pub mod checks;
pub mod config;
pub mod error;
pub mod execution;
pub mod reconcile;
pub mod retry;
pub mod target;
