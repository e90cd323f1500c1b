//! Broker error types.

/// Errors that can occur during broker operations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("order error: {0}")]
    Order(String),

    #[error("not connected")]
    NotConnected,

    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("account snapshot error: {0}")]
    Snapshot(String),

    #[error("{0}")]
    Other(String),
}

impl BrokerError {
    /// Whether the same request may succeed if sent again.
    ///
    /// Connection drops are transient; rejections and bad input are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Connection(_))
    }
}
