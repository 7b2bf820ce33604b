use crate::api::{BinanceClient, GatewayError};
use crate::db::StateStore;
use crate::execution::RiskEngine;
use crate::models::{ClosedTrade, ExitReason, Position, PositionState, TradeLock};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

// Policy constants, not strategy parameters
const MIN_QUOTE_BALANCE: f64 = 10.0;
const DUST_QUOTE_VALUE: f64 = 1.0;
const QUOTE_ASSET: &str = "USDT";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("a position is already open")]
    AlreadyOpen,

    #[error("no open position")]
    NoPosition,

    #[error("insufficient {asset} balance: {available:.2} (minimum {required:.2})")]
    InsufficientBalance {
        asset: String,
        available: f64,
        required: f64,
    },

    #[error("order for {symbol} was accepted but nothing executed")]
    FillMismatch { symbol: String },

    #[error("no {asset} balance available to sell")]
    EmptyBalance { asset: String },

    #[error("quantity {quantity} for {symbol} is below the exchange minimum {min_qty}")]
    BelowLotMinimum {
        symbol: String,
        quantity: f64,
        min_qty: f64,
    },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Exclusive owner of the single Position and the global TradeLock.
///
/// The two are always set and cleared together, in memory and in storage,
/// so `lock.held` holds exactly while a position exists. Everyone outside
/// this struct only ever sees clones.
pub struct PositionLedger {
    client: Arc<BinanceClient>,
    risk: RiskEngine,
    store: Option<StateStore>,
    position: Option<Position>,
    lock: TradeLock,
}

impl PositionLedger {
    pub fn new(client: Arc<BinanceClient>, risk: RiskEngine, store: Option<StateStore>) -> Self {
        Self {
            client,
            risk,
            store,
            position: None,
            lock: TradeLock::released(),
        }
    }

    /// Rebuild from persisted state and reconcile against the exchange
    /// before the trading cycle resumes. Orphaned lock/position pairs are
    /// repaired here rather than trusted.
    pub async fn restore(
        client: Arc<BinanceClient>,
        risk: RiskEngine,
        store: Option<StateStore>,
    ) -> Self {
        let (position, lock) = match &store {
            Some(store) => {
                let position = store.load_position().await.unwrap_or_else(|e| {
                    tracing::warn!("Failed to load persisted position: {}", e);
                    None
                });
                let lock = store.load_lock().await.unwrap_or_else(|e| {
                    tracing::warn!("Failed to load persisted trade lock: {}", e);
                    TradeLock::released()
                });
                (position, lock)
            }
            None => (None, TradeLock::released()),
        };

        let mut ledger = Self {
            client,
            risk,
            store,
            position,
            lock,
        };

        match (&ledger.position, ledger.lock.held) {
            (Some(position), false) => {
                tracing::warn!(
                    "Restored position {} without its lock. Re-acquiring.",
                    position.symbol
                );
                ledger.lock = TradeLock::held_for(&position.symbol);
                ledger.persist_active().await;
            }
            (None, true) => {
                tracing::warn!("Restored trade lock with no position. Releasing.");
                ledger.lock = TradeLock::released();
                ledger.persist_active().await;
            }
            _ => {}
        }

        if let Some(position) = &ledger.position {
            tracing::info!(
                "Restored active trade: {} @ {}. Reconciling against exchange...",
                position.symbol,
                position.entry_price
            );
            ledger.reconcile().await;
        }

        ledger
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    /// Read-only clone for the orchestrator and broadcast loop
    pub fn snapshot(&self) -> Option<Position> {
        self.position.clone()
    }

    pub fn lock_held(&self) -> bool {
        self.lock.held
    }

    pub fn lock(&self) -> &TradeLock {
        &self.lock
    }

    /// Open a position by market-buying the full quote balance.
    ///
    /// Entry price and quantity come from the confirmed fill, never the
    /// pre-trade signal price. Nothing is mutated unless the buy executed.
    pub async fn open(&mut self, symbol: &str, signal_price: f64) -> Result<Position, LedgerError> {
        if self.lock.held || self.position.is_some() {
            return Err(LedgerError::AlreadyOpen);
        }

        let balance = self.client.get_account_balance(QUOTE_ASSET).await?;
        if balance < MIN_QUOTE_BALANCE {
            return Err(LedgerError::InsufficientBalance {
                asset: QUOTE_ASSET.to_string(),
                available: balance,
                required: MIN_QUOTE_BALANCE,
            });
        }

        tracing::info!(
            "Executing buy order for {} with {:.2} {} (signal price {})",
            symbol,
            balance,
            QUOTE_ASSET,
            signal_price
        );

        let fill = self.client.place_market_buy(symbol, balance).await?;
        if fill.quantity <= 0.0 || fill.price <= 0.0 {
            return Err(LedgerError::FillMismatch {
                symbol: symbol.to_string(),
            });
        }

        let entry_price = fill.price;
        let position = Position {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            entry_price,
            quantity: fill.quantity,
            entry_time: Utc::now(),
            quote_amount: entry_price * fill.quantity,
            stop_loss: self.risk.stop_loss_price(entry_price),
            tp_trigger: self.risk.take_profit_trigger(entry_price),
            trailing_stop: None,
            highest_price: entry_price,
            current_price: entry_price,
            pnl_percent: 0.0,
            state: PositionState::Active,
        };

        self.set_active(position.clone()).await;
        tracing::info!("Trade opened: {} @ {}", symbol, entry_price);
        Ok(position)
    }

    /// Run one risk-engine cycle on the open position with the latest
    /// price, persisting the updated tracking state.
    pub async fn update_active(&mut self, price: f64) -> Option<ExitReason> {
        let exit = {
            let position = self.position.as_mut()?;
            self.risk.evaluate(position, price, Utc::now())
        };
        self.persist_active().await;
        exit
    }

    /// Close the open position with a market sell.
    ///
    /// Sells exactly what the exchange reports for the base asset (manual
    /// trades and lot rounding can drift the cached quantity), stepped
    /// down to a valid lot size, after cancelling any resting orders.
    /// On failure, position and lock are left exactly as they were.
    pub async fn close(&mut self, reason: ExitReason) -> Result<ClosedTrade, LedgerError> {
        let position = self.position.clone().ok_or(LedgerError::NoPosition)?;
        let symbol = position.symbol.clone();
        let base_asset = symbol
            .strip_suffix(QUOTE_ASSET)
            .unwrap_or(&symbol)
            .to_string();

        let balance = self.client.get_account_balance(&base_asset).await?;
        if balance <= 0.0 {
            return Err(LedgerError::EmptyBalance { asset: base_asset });
        }

        let quantity = match self.client.get_lot_size(&symbol).await {
            Ok(lot) => {
                // Round down so we never try to sell more than we hold
                let stepped = (balance / lot.step_size).floor() * lot.step_size;
                if stepped < lot.min_qty {
                    if balance < lot.min_qty {
                        return Err(LedgerError::BelowLotMinimum {
                            symbol: symbol.clone(),
                            quantity: balance,
                            min_qty: lot.min_qty,
                        });
                    }
                    lot.min_qty
                } else {
                    stepped
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Could not get lot size for {} ({}), using balance as-is",
                    symbol,
                    e
                );
                balance
            }
        };

        if (balance - position.quantity).abs() > position.quantity * 0.01 {
            tracing::info!(
                "Balance difference detected for {}: stored={} actual={}. Selling actual balance.",
                symbol,
                position.quantity,
                balance
            );
        }

        match self.client.get_open_orders(&symbol).await {
            Ok(orders) if !orders.is_empty() => {
                tracing::info!(
                    "Found {} open order(s) for {}, cancelling before market sell",
                    orders.len(),
                    symbol
                );
                if let Err(e) = self.client.cancel_all_orders(&symbol).await {
                    tracing::warn!(
                        "Failed to cancel orders for {} ({}), proceeding with market sell",
                        symbol,
                        e
                    );
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Could not list open orders for {}: {}", symbol, e),
        }

        tracing::info!(
            "Executing sell order for {}: {} (exchange-reported balance)",
            symbol,
            quantity
        );

        let fill = self.client.place_market_sell(&symbol, quantity).await?;
        if fill.quantity <= 0.0 {
            return Err(LedgerError::FillMismatch { symbol });
        }

        let exit_price = if fill.price > 0.0 {
            fill.price
        } else {
            tracing::warn!("No fill price for {}, falling back to last seen price", symbol);
            position.current_price
        };
        let pnl_percent = RiskEngine::pnl_percent(position.entry_price, exit_price);

        let trade = ClosedTrade {
            id: Uuid::new_v4(),
            symbol: symbol.clone(),
            entry_price: position.entry_price,
            exit_price,
            entry_time: position.entry_time,
            exit_time: Utc::now(),
            pnl_percent,
            exit_reason: reason,
            quote_amount: position.quote_amount,
            exit_quote_amount: exit_price * fill.quantity,
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.append_trade(&trade).await {
                tracing::error!("Failed to persist closed trade: {}", e);
            }
        }

        self.clear_active().await;
        tracing::info!(
            "Trade closed: {} @ {} | PnL {:+.2}% | {}",
            symbol,
            exit_price,
            pnl_percent,
            reason
        );
        Ok(trade)
    }

    /// Shutdown/stop path: close, and if the sell cannot be completed,
    /// clear the state anyway. A stuck lock silently halts all future
    /// trading and is the worse outcome than a lost reconciliation.
    pub async fn force_close(&mut self, reason: ExitReason) -> Option<ClosedTrade> {
        self.position.as_ref()?;

        match self.close(reason).await {
            Ok(trade) => Some(trade),
            Err(e) => {
                tracing::error!(
                    "Forced sell failed ({}). Clearing position and lock anyway.",
                    e
                );
                self.force_clear().await;
                None
            }
        }
    }

    pub async fn force_clear(&mut self) {
        self.position = None;
        self.lock = TradeLock::released();
        self.persist_active().await;
        tracing::warn!("Position and trade lock force-cleared");
    }

    /// Compare the locally believed position against the exchange's
    /// reported balance. Returns whether the position is still open.
    ///
    /// Conservative on failure: an inconclusive read never closes anything.
    pub async fn reconcile(&mut self) -> bool {
        let Some(position) = self.position.clone() else {
            if self.lock.held {
                tracing::warn!("Trade lock held with no position. Releasing lock.");
                self.lock = TradeLock::released();
                self.persist_active().await;
            }
            return false;
        };

        let base_asset = position
            .symbol
            .strip_suffix(QUOTE_ASSET)
            .unwrap_or(&position.symbol)
            .to_string();

        let balance = match self.client.get_account_balance(&base_asset).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!(
                    "Failed to fetch {} balance during reconcile ({}). Assuming position still open.",
                    base_asset,
                    e
                );
                return true;
            }
        };

        let price = match self.client.get_price(&position.symbol).await {
            Ok(price) => price,
            Err(e) => {
                tracing::warn!(
                    "Could not get current price for {} during reconcile ({}), valuing at entry price",
                    position.symbol,
                    e
                );
                position.entry_price
            }
        };

        let quote_value = balance * price;
        if quote_value < DUST_QUOTE_VALUE {
            tracing::info!(
                "Position {} holds {:.4} {} worth of {} (balance {}). Clearing as dust.",
                position.symbol,
                quote_value,
                QUOTE_ASSET,
                base_asset,
                balance
            );
            self.clear_active().await;
            return false;
        }

        let expected = position.quantity;
        if balance < expected * 0.01 {
            tracing::info!(
                "Position {} appears to have been closed manually (balance {} vs expected {}). Clearing.",
                position.symbol,
                balance,
                expected
            );
            self.clear_active().await;
            return false;
        }

        if balance < expected * 0.95 {
            tracing::warn!(
                "Quantity drift on {}: expected {}, exchange reports {}. Correcting in place.",
                position.symbol,
                expected,
                balance
            );
            self.correct_quantity(balance, price).await;
            return true;
        }

        if (balance - expected).abs() > expected * 0.01 {
            tracing::info!(
                "Updating {} quantity from {} to {}",
                position.symbol,
                expected,
                balance
            );
            self.correct_quantity(balance, price).await;
        }

        true
    }

    async fn correct_quantity(&mut self, balance: f64, price: f64) {
        if let Some(position) = self.position.as_mut() {
            position.quantity = balance;
            position.quote_amount = balance * price;
        }
        self.persist_active().await;
    }

    async fn set_active(&mut self, position: Position) {
        self.lock = TradeLock::held_for(&position.symbol);
        self.position = Some(position);
        self.persist_active().await;
        tracing::info!(
            "Trade lock activated for {}",
            self.lock.symbol.as_deref().unwrap_or("?")
        );
    }

    async fn clear_active(&mut self) {
        self.position = None;
        self.lock = TradeLock::released();
        self.persist_active().await;
        tracing::info!("Trade lock released");
    }

    /// Position and lock go to storage as one transactional unit. The
    /// exchange state is already real at this point, so a failed write is
    /// logged and retried on the next mutation instead of unwinding.
    async fn persist_active(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_active(self.position.as_ref(), &self.lock).await {
                tracing::error!("Failed to persist position/lock state: {}", e);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn install_position(&mut self, position: Position) {
        self.lock = TradeLock::held_for(&position.symbol);
        self.position = Some(position);
    }
}
