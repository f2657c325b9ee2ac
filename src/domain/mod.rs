//! Domain models shared by the risk control plane.

mod account;
mod order;
mod position;
mod signal;

pub use account::BalanceSnapshot;
pub use order::{OrderAck, Side};
pub use position::ExchangePosition;
pub use signal::{Candle, MarketData, TradeSignal};
