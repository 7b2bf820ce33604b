use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The most recently closed hourly candle for a symbol.
///
/// Captured exactly once per UTC hour and never overwritten mid-hour,
/// even if the same klines are fetched again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandleBaseline {
    pub open_time_ms: i64,
    pub close_price: f64,
    pub volume: f64,
}

/// The currently forming hourly candle for a symbol.
///
/// Overwritten on every refresh; `elapsed_minutes` is always in [0, 60].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveCandle {
    pub open_time_ms: i64,
    pub price: f64,
    pub volume: f64,
    pub elapsed_minutes: u32,
}

/// Lifecycle state of the open position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionState {
    Active,
    TrailingActive,
}

/// The single open position. At most one exists system-wide; the
/// PositionLedger is its exclusive owner and everyone else reads clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub entry_price: f64,
    pub quantity: f64,
    pub entry_time: DateTime<Utc>,
    pub quote_amount: f64, // quote currency committed at entry
    pub stop_loss: f64,
    pub tp_trigger: f64,
    pub trailing_stop: Option<f64>, // None until trailing is armed
    pub highest_price: f64,
    pub current_price: f64,
    pub pnl_percent: f64,
    pub state: PositionState,
}

impl Position {
    pub fn trailing_active(&self) -> bool {
        self.state == PositionState::TrailingActive
    }
}

/// Process-wide trade lock gating entry evaluation.
///
/// Invariant: `held` is true exactly while a Position exists. The two are
/// set and cleared together through the PositionLedger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeLock {
    pub held: bool,
    pub symbol: Option<String>,
}

impl TradeLock {
    pub fn released() -> Self {
        Self {
            held: false,
            symbol: None,
        }
    }

    pub fn held_for(symbol: &str) -> Self {
        Self {
            held: true,
            symbol: Some(symbol.to_string()),
        }
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TrailingStop,
    TimeLimit,
    Shutdown,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitReason::StopLoss => "stop loss hit",
            ExitReason::TrailingStop => "trailing stop hit",
            ExitReason::TimeLimit => "time exit",
            ExitReason::Shutdown => "closed on shutdown",
        };
        write!(f, "{}", s)
    }
}

/// Append-only record of a completed round trip. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub id: Uuid,
    pub symbol: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub pnl_percent: f64,
    pub exit_reason: ExitReason,
    pub quote_amount: f64,      // quote committed at entry
    pub exit_quote_amount: f64, // quote received on exit
}

/// Aggregate statistics over the closed-trade history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub average_pnl: f64,
    pub total_pnl: f64,
}

impl TradeStats {
    pub fn from_trades(trades: &[ClosedTrade]) -> Self {
        if trades.is_empty() {
            return Self {
                total_trades: 0,
                winning_trades: 0,
                losing_trades: 0,
                win_rate: 0.0,
                average_pnl: 0.0,
                total_pnl: 0.0,
            };
        }

        let winning = trades.iter().filter(|t| t.pnl_percent > 0.0).count();
        let total_pnl: f64 = trades.iter().map(|t| t.pnl_percent).sum();

        Self {
            total_trades: trades.len(),
            winning_trades: winning,
            losing_trades: trades.len() - winning,
            win_rate: (winning as f64 / trades.len() as f64) * 100.0,
            average_pnl: total_pnl / trades.len() as f64,
            total_pnl,
        }
    }
}
