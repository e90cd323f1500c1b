//! Broker trait and implementations for lotplan.
//!
//! Provides a generic `Broker` trait that abstracts over brokerages: the
//! balance and quote queries the planner's inputs come from, and the order
//! submission and cancellation its plans go to.
//!
//! Implementations:
//!
//! - **Paper** ([`paper::PaperBroker`]): in-memory account loaded from a JSON snapshot

pub mod error;
pub mod paper;
pub mod types;

pub use error::BrokerError;
pub use types::*;

use lotplan::Code;

/// A broker connection that can fetch balances, submit orders, and get quotes.
pub trait Broker {
    /// Connect to the broker.
    fn connect(&mut self) -> Result<(), BrokerError>;

    /// Disconnect gracefully.
    fn disconnect(&mut self) -> Result<(), BrokerError>;

    /// Get all current holdings.
    fn positions(&self) -> Result<Vec<Holding>, BrokerError>;

    /// Get cash figures.
    fn balance(&self) -> Result<Balance, BrokerError>;

    /// Get current quote for an instrument.
    fn quote(&self, code: &Code) -> Result<Quote, BrokerError>;

    /// Orders accepted by the broker but not yet fully filled.
    fn pending_orders(&self) -> Result<Vec<PendingOrder>, BrokerError>;

    /// Submit an order. Returns order ID.
    fn submit_order(&self, order: &BrokerOrder) -> Result<OrderId, BrokerError>;

    /// Cancel a pending order.
    fn cancel_order(&self, id: OrderId) -> Result<(), BrokerError>;

    /// Last prices for `codes`. Instruments without a quote are skipped.
    fn prices(&self, codes: &[Code]) -> Result<Vec<(Code, f64)>, BrokerError> {
        let mut prices = Vec::with_capacity(codes.len());
        for code in codes {
            match self.quote(code) {
                Ok(quote) => prices.push((*code, quote.last)),
                Err(BrokerError::UnknownInstrument(_)) => {
                    log::warn!("no quote for {code}");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(prices)
    }
}
