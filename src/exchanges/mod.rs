//! Exchange collaborator boundaries consumed by the control plane.
//!
//! The concrete REST/WebSocket client lives outside this crate; it plugs in
//! by implementing [`AccountData`] and [`PriceFeed`].

use crate::domain::BalanceSnapshot;
use async_trait::async_trait;
use thiserror::Error;

/// Exchange errors.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The account source returned no usable data.
    #[error("no data: {0}")]
    NoData(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// API error from the exchange.
    #[error("API error: {0}")]
    Api(String),

    /// Symbol is not known to the price source.
    #[error("symbol {0} is not supported")]
    SymbolNotSupported(String),
}

/// Result type for exchange operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// AccountData supplies wallet balance snapshots.
#[async_trait]
pub trait AccountData: Send + Sync {
    /// GetWalletBalance fetches the current balance snapshot.
    /// Must return an error on transport failure, never a zeroed snapshot.
    async fn get_wallet_balance(&self) -> Result<BalanceSnapshot>;

    /// Name identifies the account in logs.
    fn name(&self) -> &str;
}

/// PriceFeed supplies reference prices for margin calculations.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// GetReferencePrice returns the latest trade price for the symbol.
    async fn get_reference_price(&self, symbol: &str) -> Result<f64>;
}
