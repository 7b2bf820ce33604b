pub mod binance;
pub mod error;

pub use binance::{BinanceClient, Kline, LotSize, OpenOrder, OrderFill, TickerStats};
pub use error::GatewayError;
