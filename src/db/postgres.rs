use crate::models::{ClosedTrade, ExitReason, Position, PositionState, TradeLock};
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::collections::HashMap;
use uuid::Uuid;

/// Postgres persistence for the recoverable bot state.
///
/// Four independent tables: the single active position, the trade lock,
/// the per-symbol cooldowns and the append-only trade history. Each loads
/// on its own with no ordering dependency; the position/lock pair is
/// written inside one transaction so the two can never diverge on disk.
#[derive(Clone)]
pub struct StateStore {
    pool: PgPool,
}

impl StateStore {
    /// Connect to Postgres and run pending migrations
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres at {}", database_url);

        Ok(Self { pool })
    }

    /// Write the position and the trade lock as one atomic unit.
    pub async fn save_active(&self, position: Option<&Position>, lock: &TradeLock) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM active_position").execute(&mut *tx).await?;

        if let Some(position) = position {
            let state_str = match position.state {
                PositionState::Active => "Active",
                PositionState::TrailingActive => "TrailingActive",
            };

            sqlx::query(
                r#"
                INSERT INTO active_position (
                    id, position_id, symbol, entry_price, quantity, entry_time,
                    quote_amount, stop_loss, tp_trigger, trailing_stop,
                    highest_price, current_price, pnl_percent, state
                )
                VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(position.id)
            .bind(&position.symbol)
            .bind(position.entry_price)
            .bind(position.quantity)
            .bind(position.entry_time)
            .bind(position.quote_amount)
            .bind(position.stop_loss)
            .bind(position.tp_trigger)
            .bind(position.trailing_stop)
            .bind(position.highest_price)
            .bind(position.current_price)
            .bind(position.pnl_percent)
            .bind(state_str)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO trade_lock (id, held, symbol, updated_at)
            VALUES (1, $1, $2, NOW())
            ON CONFLICT (id) DO UPDATE SET
                held = EXCLUDED.held,
                symbol = EXCLUDED.symbol,
                updated_at = NOW()
            "#,
        )
        .bind(lock.held)
        .bind(&lock.symbol)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!("Saved active position/lock state to Postgres");

        Ok(())
    }

    /// Load the active position, if one was persisted
    pub async fn load_position(&self) -> Result<Option<Position>> {
        let row = sqlx::query(
            r#"
            SELECT position_id, symbol, entry_price, quantity, entry_time,
                   quote_amount, stop_loss, tp_trigger, trailing_stop,
                   highest_price, current_price, pnl_percent, state
            FROM active_position
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let position_id: Uuid = row.get("position_id");
        let symbol: String = row.get("symbol");
        let entry_price: rust_decimal::Decimal = row.get("entry_price");
        let quantity: rust_decimal::Decimal = row.get("quantity");
        let entry_time: DateTime<Utc> = row.get("entry_time");
        let quote_amount: rust_decimal::Decimal = row.get("quote_amount");
        let stop_loss: rust_decimal::Decimal = row.get("stop_loss");
        let tp_trigger: rust_decimal::Decimal = row.get("tp_trigger");
        let trailing_stop: Option<rust_decimal::Decimal> = row.get("trailing_stop");
        let highest_price: rust_decimal::Decimal = row.get("highest_price");
        let current_price: rust_decimal::Decimal = row.get("current_price");
        let pnl_percent: rust_decimal::Decimal = row.get("pnl_percent");
        let state_str: String = row.get("state");

        let state = match state_str.as_str() {
            "Active" => PositionState::Active,
            "TrailingActive" => PositionState::TrailingActive,
            _ => return Err("Invalid position state".into()),
        };

        let position = Position {
            id: position_id,
            symbol,
            entry_price: entry_price.to_string().parse()?,
            quantity: quantity.to_string().parse()?,
            entry_time,
            quote_amount: quote_amount.to_string().parse()?,
            stop_loss: stop_loss.to_string().parse()?,
            tp_trigger: tp_trigger.to_string().parse()?,
            trailing_stop: trailing_stop.map(|v| v.to_string().parse()).transpose()?,
            highest_price: highest_price.to_string().parse()?,
            current_price: current_price.to_string().parse()?,
            pnl_percent: pnl_percent.to_string().parse()?,
            state,
        };

        tracing::info!("Loaded active position for {} from Postgres", position.symbol);

        Ok(Some(position))
    }

    /// Load the trade lock; absence means released
    pub async fn load_lock(&self) -> Result<TradeLock> {
        let row = sqlx::query("SELECT held, symbol FROM trade_lock WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(TradeLock {
                held: row.get("held"),
                symbol: row.get("symbol"),
            }),
            None => Ok(TradeLock::released()),
        }
    }

    /// Replace the persisted cooldown set
    pub async fn save_cooldowns(&self, cooldowns: &HashMap<String, DateTime<Utc>>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM cooldowns").execute(&mut *tx).await?;

        for (symbol, expires_at) in cooldowns {
            sqlx::query("INSERT INTO cooldowns (symbol, expires_at) VALUES ($1, $2)")
                .bind(symbol)
                .bind(expires_at)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::debug!("Saved {} cooldowns to Postgres", cooldowns.len());

        Ok(())
    }

    pub async fn load_cooldowns(&self) -> Result<HashMap<String, DateTime<Utc>>> {
        let rows = sqlx::query("SELECT symbol, expires_at FROM cooldowns")
            .fetch_all(&self.pool)
            .await?;

        let mut cooldowns = HashMap::new();
        for row in rows {
            let symbol: String = row.get("symbol");
            let expires_at: DateTime<Utc> = row.get("expires_at");
            cooldowns.insert(symbol, expires_at);
        }

        tracing::info!("Loaded {} cooldowns from Postgres", cooldowns.len());

        Ok(cooldowns)
    }

    /// Append a completed trade to the history. Insert-only.
    pub async fn append_trade(&self, trade: &ClosedTrade) -> Result<()> {
        let reason_str = exit_reason_str(trade.exit_reason);

        sqlx::query(
            r#"
            INSERT INTO trade_history (
                id, symbol, entry_price, exit_price, entry_time, exit_time,
                pnl_percent, exit_reason, quote_amount, exit_quote_amount
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(trade.id)
        .bind(&trade.symbol)
        .bind(trade.entry_price)
        .bind(trade.exit_price)
        .bind(trade.entry_time)
        .bind(trade.exit_time)
        .bind(trade.pnl_percent)
        .bind(reason_str)
        .bind(trade.quote_amount)
        .bind(trade.exit_quote_amount)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            "Trade added to history: {} - PnL: {:.2}%",
            trade.symbol,
            trade.pnl_percent
        );

        Ok(())
    }

    /// Full trade history, oldest first
    pub async fn load_trades(&self) -> Result<Vec<ClosedTrade>> {
        let rows = sqlx::query(
            r#"
            SELECT id, symbol, entry_price, exit_price, entry_time, exit_time,
                   pnl_percent, exit_reason, quote_amount, exit_quote_amount
            FROM trade_history
            ORDER BY exit_time ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut trades = Vec::new();

        for row in rows {
            let id: Uuid = row.get("id");
            let symbol: String = row.get("symbol");
            let entry_price: rust_decimal::Decimal = row.get("entry_price");
            let exit_price: rust_decimal::Decimal = row.get("exit_price");
            let entry_time: DateTime<Utc> = row.get("entry_time");
            let exit_time: DateTime<Utc> = row.get("exit_time");
            let pnl_percent: rust_decimal::Decimal = row.get("pnl_percent");
            let exit_reason_str: String = row.get("exit_reason");
            let quote_amount: rust_decimal::Decimal = row.get("quote_amount");
            let exit_quote_amount: rust_decimal::Decimal = row.get("exit_quote_amount");

            let exit_reason = match exit_reason_str.as_str() {
                "StopLoss" => ExitReason::StopLoss,
                "TrailingStop" => ExitReason::TrailingStop,
                "TimeLimit" => ExitReason::TimeLimit,
                "Shutdown" => ExitReason::Shutdown,
                _ => return Err("Invalid exit reason".into()),
            };

            trades.push(ClosedTrade {
                id,
                symbol,
                entry_price: entry_price.to_string().parse()?,
                exit_price: exit_price.to_string().parse()?,
                entry_time,
                exit_time,
                pnl_percent: pnl_percent.to_string().parse()?,
                exit_reason,
                quote_amount: quote_amount.to_string().parse()?,
                exit_quote_amount: exit_quote_amount.to_string().parse()?,
            });
        }

        tracing::info!("Loaded {} trades from history", trades.len());

        Ok(trades)
    }

    /// Delete everything (testing only)
    #[cfg(test)]
    pub async fn clear_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM active_position").execute(&self.pool).await?;
        sqlx::query("DELETE FROM trade_lock").execute(&self.pool).await?;
        sqlx::query("DELETE FROM cooldowns").execute(&self.pool).await?;
        sqlx::query("DELETE FROM trade_history").execute(&self.pool).await?;
        Ok(())
    }
}

fn exit_reason_str(reason: ExitReason) -> &'static str {
    match reason {
        ExitReason::StopLoss => "StopLoss",
        ExitReason::TrailingStop => "TrailingStop",
        ExitReason::TimeLimit => "TimeLimit",
        ExitReason::Shutdown => "Shutdown",
    }
}
