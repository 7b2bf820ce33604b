use crate::config::BotConfig;
use crate::models::{ExitReason, Position, PositionState};
use chrono::{DateTime, Utc};

/// Stop-loss, take-profit and trailing-stop logic for the open position.
///
/// Exit precedence per evaluation: time exit > trailing stop > hard
/// stop-loss. The stop-loss stays live every cycle, trailing or not, and
/// an armed trailing stop only ever moves up.
pub struct RiskEngine {
    stop_loss_percent: f64,
    take_profit_percent: f64,
    trailing_stop_percent: f64,
    time_exit_enabled: bool,
    max_trade_duration_minutes: i64,
}

impl RiskEngine {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            stop_loss_percent: config.stop_loss_percent,
            take_profit_percent: config.take_profit_percent,
            trailing_stop_percent: config.trailing_stop_percent,
            time_exit_enabled: config.time_exit_enabled,
            max_trade_duration_minutes: config.max_trade_duration_minutes,
        }
    }

    pub fn stop_loss_price(&self, entry_price: f64) -> f64 {
        entry_price * (1.0 - self.stop_loss_percent / 100.0)
    }

    pub fn take_profit_trigger(&self, entry_price: f64) -> f64 {
        entry_price * (1.0 + self.take_profit_percent / 100.0)
    }

    pub fn trailing_stop_price(&self, highest_price: f64) -> f64 {
        highest_price * (1.0 - self.trailing_stop_percent / 100.0)
    }

    pub fn pnl_percent(entry_price: f64, current_price: f64) -> f64 {
        ((current_price - entry_price) / entry_price) * 100.0
    }

    /// Run one exit-evaluation cycle against the latest price.
    ///
    /// Mutates the position's tracking fields (highest price, trailing
    /// stop, PnL, state) and returns the exit reason when an exit fires.
    pub fn evaluate(
        &self,
        position: &mut Position,
        price: f64,
        now: DateTime<Utc>,
    ) -> Option<ExitReason> {
        position.current_price = price;

        if price > position.highest_price {
            position.highest_price = price;

            // Armed trailing stop only ever ratchets upward
            if position.trailing_active() {
                let candidate = self.trailing_stop_price(position.highest_price);
                if position.trailing_stop.map_or(true, |ts| candidate > ts) {
                    position.trailing_stop = Some(candidate);
                }
            }
        }

        position.pnl_percent = Self::pnl_percent(position.entry_price, price);

        // Time-based hard exit takes priority over every price check
        if self.time_exit_enabled && self.max_trade_duration_minutes > 0 {
            let elapsed = (now - position.entry_time).num_minutes();
            if elapsed >= self.max_trade_duration_minutes {
                tracing::warn!(
                    "Exit: time limit | elapsed={}m limit={}m",
                    elapsed,
                    self.max_trade_duration_minutes
                );
                return Some(ExitReason::TimeLimit);
            }
        }

        // One-time trailing activation
        if !position.trailing_active() && price >= position.tp_trigger {
            position.state = PositionState::TrailingActive;
            position.highest_price = price;
            position.trailing_stop = Some(self.trailing_stop_price(price));

            tracing::info!(
                "Trailing activated | price={} trailing_stop={:?}",
                price,
                position.trailing_stop
            );
        }

        if position.trailing_active() {
            if let Some(trailing_stop) = position.trailing_stop {
                if price <= trailing_stop {
                    tracing::warn!(
                        "Exit: trailing stop | price={} <= trailing_stop={}",
                        price,
                        trailing_stop
                    );
                    return Some(ExitReason::TrailingStop);
                }
            }
        }

        // Hard floor, checked every cycle regardless of trailing state
        if price <= position.stop_loss {
            tracing::warn!("Exit: stop loss | price={} <= stop_loss={}", price, position.stop_loss);
            return Some(ExitReason::StopLoss);
        }

        None
    }
}
