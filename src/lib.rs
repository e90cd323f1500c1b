//! # lotplan
//!
//! A deterministic rebalance planner for retail brokerage accounts.
//!
//! Given holdings, prices, target weights and a cash figure (negative cash is
//! margin debt), lotplan produces an ordered list of whole-unit BUY/SELL
//! instructions that moves the account toward its targets.
//!
//! ## Features
//!
//! - **Lot rounding**: fractional weights become whole tradable units
//! - **Floor + remainder allocation**: never overspends, spends leftovers on the cheapest instruments
//! - **Tolerance band**: deviations inside `band_pct` percentage points are left alone
//! - **Sell-before-buy**: buys are only ever funded by cash known to be available
//! - **Deficit recovery**: margin debt is cleared with a minimal liquidation before rebuilding
//! - **Pure**: no I/O, no shared state; safe to call from any number of threads
//!
//! ## Quick Start
//!
//! ```
//! use lotplan::{plan_rebalance, Code, PlanConfig, Side, Snapshot};
//!
//! let a = Code::new("A");
//! let b = Code::new("B");
//!
//! let snapshot = Snapshot::new(0.0)
//!     .position(a, 20)
//!     .position(b, 0)
//!     .price(a, 100.0)
//!     .price(b, 50.0)
//!     .target(a, 0.5)
//!     .target(b, 0.5);
//!
//! let plan = plan_rebalance(&snapshot, &PlanConfig::default()).unwrap();
//!
//! // Sell half of A, then buy B with the proceeds
//! assert_eq!(plan.len(), 2);
//! assert_eq!((plan[0].side, plan[0].qty), (Side::Sell, 10));
//! assert_eq!((plan[1].side, plan[1].qty), (Side::Buy, 20));
//! ```
//!
//! ## Margin Debt
//!
//! When settlement cash (or cash) is negative the planner switches to the
//! deficit path. It sells just enough to clear the debt, most expensive
//! holdings first:
//!
//! ```
//! use lotplan::{plan_rebalance_detailed, Code, PlanConfig, PlanPath, Side, Snapshot};
//!
//! let a = Code::new("A");
//! let snapshot = Snapshot::new(-30_000.0)
//!     .position(a, 100)
//!     .price(a, 1_000.0)
//!     .target(a, 1.0);
//!
//! let outcome = plan_rebalance_detailed(&snapshot, &PlanConfig::default()).unwrap();
//! assert_eq!(outcome.path, PlanPath::Deficit);
//! assert!(outcome.deficit_cleared);
//! assert_eq!(outcome.orders[0].side, Side::Sell);
//! assert_eq!(outcome.orders[0].qty, 30);
//! ```
//!
//! ## Building Blocks
//!
//! Each stage is public and usable on its own:
//!
//! | Stage | Entry point |
//! |-------|-------------|
//! | Rounding | [`round_lot`], [`clamp_order_value`] |
//! | Cash | [`VirtualCash::compute`] |
//! | Allocation | [`allocate`] |
//! | Band | [`band_filter`] |
//! | Deficit | [`resolve_deficit`] |
//! | Assembly | [`assemble`], [`net_orders`] |
//! | Cash guard | [`validate_cash_sufficiency`], [`projected_cash`], [`insufficient_orders`] |
//! | Costs | [`estimate_cost`], [`NettingSavings`] |

mod allocate;
mod assemble;
mod band;
mod cash;
mod cash_guard;
mod config;
mod cost;
mod deficit;
mod error;
mod order;
mod planner;
mod rounding;
mod side;
mod types;
mod universe;

// Re-export public API
pub use allocate::allocate;
pub use assemble::{assemble, net_orders};
pub use band::{band_filter, BandDecision};
pub use cash::VirtualCash;
pub use cash_guard::{insufficient_orders, projected_cash, validate_cash_sufficiency};
pub use config::{Environment, PlanConfig};
pub use cost::{estimate_cost, CostEstimate, NettingSavings, DEFAULT_COMMISSION_RATE};
pub use deficit::{resolve_deficit, DeficitResolution, RESERVE_RATIOS};
pub use error::PlanError;
pub use order::OrderPlan;
pub use planner::{plan_rebalance, plan_rebalance_detailed, PlanOutcome, PlanPath, Snapshot};
pub use rounding::{clamp_order_value, round_lot};
pub use side::Side;
pub use types::{Code, Positions, PriceMap, TargetQuantities, TargetWeights, MAX_CODE_LEN};
pub use universe::Universe;
