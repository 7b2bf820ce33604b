use clap::Parser;
use gainerbot::api::BinanceClient;
use gainerbot::config::BotConfig;
use gainerbot::db::StateStore;
use gainerbot::execution::{
    CooldownRegistry, EntryEvaluator, PositionLedger, RiskEngine, Verdict,
};
use gainerbot::market::{CandleTracker, MarketScanner};
use gainerbot::models::{ExitReason, Position, TradeStats};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(name = "gainerbot", about = "Single-position breakout trading bot")]
struct Args {
    /// Path to the strategy configuration file
    #[arg(long, default_value = "config/config.json")]
    config: PathBuf,
}

// ============================================================================
// Shared State
// ============================================================================

/// Read-only view published by the trading loop each cycle
#[derive(Default)]
struct BotSnapshot {
    position: Option<Position>,
    verdicts: HashMap<String, Verdict>,
}

struct SharedState {
    snapshot: RwLock<BotSnapshot>,
    stop: AtomicBool,
}

#[tokio::main]
async fn main() -> gainerbot::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();
    let args = Args::parse();

    tracing::info!("🚀 GainerBot starting");

    let config = BotConfig::load(&args.config)?;

    let api_key =
        std::env::var("BINANCE_API_KEY").expect("BINANCE_API_KEY not found in environment");
    let api_secret =
        std::env::var("BINANCE_API_SECRET").expect("BINANCE_API_SECRET not found in environment");

    let client = Arc::new(BinanceClient::new(&api_key, &api_secret));
    client.ping().await?;
    tracing::info!("✓ Connected to exchange");

    let store = connect_to_postgres().await;

    log_history_stats(store.as_ref()).await;

    let cooldowns = match &store {
        Some(store) => {
            let persisted = store.load_cooldowns().await.unwrap_or_else(|e| {
                tracing::warn!("Failed to load cooldowns: {}", e);
                HashMap::new()
            });
            CooldownRegistry::from_parts(persisted, config.cooldown_minutes)
        }
        None => CooldownRegistry::new(config.cooldown_minutes),
    };

    // The ledger reconciles any restored position against the exchange
    // before the first cycle runs.
    let risk = RiskEngine::from_config(&config);
    let ledger = PositionLedger::restore(client.clone(), risk, store.clone()).await;

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Top gainers: {}", config.top_gainers_count);
    tracing::info!(
        "  Entry: volume x{:.1} within {}m, price +{:.2}%",
        config.volume_multiplier,
        config.volume_time_limit,
        config.price_change_percent
    );
    tracing::info!(
        "  Exit: SL -{:.2}% | TP trigger +{:.2}% | trailing {:.2}%",
        config.stop_loss_percent,
        config.take_profit_percent,
        config.trailing_stop_percent
    );
    tracing::info!("  Cooldown: {}m", config.cooldown_minutes);

    let shared = Arc::new(SharedState {
        snapshot: RwLock::new(BotSnapshot::default()),
        stop: AtomicBool::new(false),
    });

    tracing::info!("\n🔄 Spawning loops...");

    // The trading loop owns every piece of mutable core state; nothing
    // else may touch the position, lock or cooldowns.
    let mut trading_task = {
        let shared = shared.clone();
        let client = client.clone();
        let config = config.clone();
        let store = store.clone();
        tokio::spawn(async move {
            trading_loop(config, client, ledger, cooldowns, store, shared).await;
        })
    };

    // Fast price readout; reads snapshots only
    let broadcast_task = {
        let shared = shared.clone();
        let client = client.clone();
        tokio::spawn(async move {
            price_broadcast_loop(client, shared).await;
        })
    };

    tracing::info!("✅ All loops spawned. Press Ctrl+C to stop...\n");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
            shared.stop.store(true, Ordering::SeqCst);

            // The trading loop force-closes any open position before it
            // returns; wait for that to finish.
            if let Err(e) = (&mut trading_task).await {
                tracing::error!("Trading loop ended abnormally: {:?}", e);
            }
        }
        result = &mut trading_task => {
            tracing::error!("Trading loop exited: {:?}", result);
        }
    }

    broadcast_task.abort();
    tracing::info!("👋 GainerBot stopped");
    Ok(())
}

// ============================================================================
// Initialization
// ============================================================================

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter("gainerbot=info")
        .init();
}

async fn connect_to_postgres() -> Option<StateStore> {
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/gainerbot".to_string());

    match StateStore::new(&database_url).await {
        Ok(store) => {
            tracing::info!("Postgres persistence enabled at {}", database_url);
            Some(store)
        }
        Err(e) => {
            tracing::warn!(
                "Failed to connect to Postgres ({}), continuing without persistence",
                e
            );
            None
        }
    }
}

async fn log_history_stats(store: Option<&StateStore>) {
    let Some(store) = store else { return };

    match store.load_trades().await {
        Ok(trades) if !trades.is_empty() => {
            let stats = TradeStats::from_trades(&trades);
            tracing::info!(
                "📊 History: {} trades | win rate {:.1}% | total PnL {:+.2}%",
                stats.total_trades,
                stats.win_rate,
                stats.total_pnl
            );
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("Failed to load trade history: {}", e),
    }
}

// ============================================================================
// Trading Loop
// ============================================================================

/// The single logical control loop: scan → refresh → evaluate → act.
/// One cycle at a time; the stop flag is honored at the top of each cycle.
async fn trading_loop(
    config: BotConfig,
    client: Arc<BinanceClient>,
    mut ledger: PositionLedger,
    mut cooldowns: CooldownRegistry,
    store: Option<StateStore>,
    shared: Arc<SharedState>,
) {
    tracing::info!(
        "💹 Trading loop starting (cycle every {}s)",
        config.scan_interval_secs
    );

    let evaluator = EntryEvaluator::from_config(&config);
    let mut scanner = MarketScanner::new();
    let mut tracker = CandleTracker::new();
    let mut monitored: Vec<String> = Vec::new();

    let mut ticker = interval(Duration::from_secs(config.scan_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        // Cooperative stop: the force-close runs to completion before the
        // loop reports itself stopped.
        if shared.stop.load(Ordering::SeqCst) {
            shutdown(&mut ledger, &mut cooldowns, store.as_ref()).await;
            return;
        }

        // Step 1: scan top gainers, with a buffer over the display count
        // so filtered-out symbols don't shrink the evaluated set
        let scan_count = usize::max(
            config.top_gainers_count * 3 / 2,
            config.top_gainers_count + 10,
        );
        match scanner.scan_top_gainers(&client, scan_count).await {
            Ok(symbols) if !symbols.is_empty() => monitored = symbols,
            Ok(_) => {}
            Err(e) => tracing::warn!("✗ Market scan failed: {}", e),
        }

        // Step 2: refresh candle windows (debounced per symbol)
        for symbol in &monitored {
            if let Err(e) = tracker.refresh(&client, symbol).await {
                tracing::debug!("Candle refresh failed for {}: {}", symbol, e);
            }
        }

        // Step 3: hunt for an entry, or manage the open position
        let mut verdicts = HashMap::new();
        if !ledger.lock_held() {
            check_entry_signals(
                &client,
                &evaluator,
                &tracker,
                &mut ledger,
                &mut cooldowns,
                &monitored,
                &mut verdicts,
            )
            .await;
        } else {
            report_locked_verdicts(&evaluator, &tracker, &mut cooldowns, &monitored, &mut verdicts);
            monitor_active_trade(&client, &mut ledger, &mut cooldowns, store.as_ref()).await;
        }

        // Step 4: publish the read-only snapshot
        {
            let mut snapshot = shared.snapshot.write().unwrap();
            snapshot.position = ledger.snapshot();
            snapshot.verdicts = verdicts;
        }
    }
}

async fn check_entry_signals(
    client: &BinanceClient,
    evaluator: &EntryEvaluator,
    tracker: &CandleTracker,
    ledger: &mut PositionLedger,
    cooldowns: &mut CooldownRegistry,
    monitored: &[String],
    verdicts: &mut HashMap<String, Verdict>,
) {
    for symbol in monitored {
        let (Some(baseline), Some(live)) = (tracker.baseline(symbol), tracker.live(symbol)) else {
            continue;
        };

        let price = match client.get_price(symbol).await {
            Ok(price) => price,
            Err(e) => {
                tracing::debug!("No price for {}: {}", symbol, e);
                continue;
            }
        };

        let in_cooldown = cooldowns.is_active(symbol);
        let verdict = evaluator.evaluate(
            symbol,
            baseline,
            live,
            price,
            ledger.lock_held(),
            in_cooldown,
        );
        let signal = verdict.signal;
        let reason = verdict.reason.clone();
        verdicts.insert(symbol.clone(), verdict);

        if signal {
            tracing::info!("🔥 Entry signal: {} @ {} - {}", symbol, price, reason);

            match ledger.open(symbol, price).await {
                Ok(position) => {
                    tracing::info!(
                        "✅ BUY executed @ {} | 🛡️ SL {:.8} | TP trigger {:.8}",
                        position.entry_price,
                        position.stop_loss,
                        position.tp_trigger
                    );
                    break; // one position at a time
                }
                Err(e) => {
                    tracing::error!("✗ Failed to execute entry for {}: {}", symbol, e);
                }
            }
        }
    }
}

/// While the lock is held, symbols still get verdicts for the snapshot
/// (all LOCKED by the evaluator's first gate; no price fetches needed).
fn report_locked_verdicts(
    evaluator: &EntryEvaluator,
    tracker: &CandleTracker,
    cooldowns: &mut CooldownRegistry,
    monitored: &[String],
    verdicts: &mut HashMap<String, Verdict>,
) {
    for symbol in monitored {
        let (Some(baseline), Some(live)) = (tracker.baseline(symbol), tracker.live(symbol)) else {
            continue;
        };

        let in_cooldown = cooldowns.is_active(symbol);
        let verdict = evaluator.evaluate(symbol, baseline, live, live.price, true, in_cooldown);
        verdicts.insert(symbol.clone(), verdict);
    }
}

async fn monitor_active_trade(
    client: &BinanceClient,
    ledger: &mut PositionLedger,
    cooldowns: &mut CooldownRegistry,
    store: Option<&StateStore>,
) {
    // Manual intervention first: never act on a position the exchange
    // says is gone.
    if !ledger.reconcile().await {
        tracing::info!("ℹ️ Active trade cleared by reconciliation");
        return;
    }

    let Some(symbol) = ledger.position().map(|p| p.symbol.clone()) else {
        return;
    };

    let price = match client.get_price(&symbol).await {
        Ok(price) => price,
        Err(e) => {
            tracing::warn!("✗ No price for {}: {}", symbol, e);
            return;
        }
    };

    if let Some(reason) = ledger.update_active(price).await {
        match ledger.close(reason).await {
            Ok(trade) => {
                let pnl_emoji = if trade.pnl_percent > 0.0 { "📈" } else { "📉" };
                tracing::info!("{} Trade closed - PnL: {:+.2}%", pnl_emoji, trade.pnl_percent);
                arm_cooldown(cooldowns, store, &trade.symbol).await;
            }
            Err(e) => {
                // State is untouched; the exit retries next cycle
                tracing::error!("✗ Exit failed for {} ({}), retrying next cycle", symbol, e);
            }
        }
    }
}

async fn arm_cooldown(
    cooldowns: &mut CooldownRegistry,
    store: Option<&StateStore>,
    symbol: &str,
) {
    cooldowns.arm(symbol);
    if let Some(store) = store {
        if let Err(e) = store.save_cooldowns(cooldowns.snapshot()).await {
            tracing::warn!("Failed to persist cooldowns: {}", e);
        }
    }
}

async fn shutdown(
    ledger: &mut PositionLedger,
    cooldowns: &mut CooldownRegistry,
    store: Option<&StateStore>,
) {
    if let Some(position) = ledger.snapshot() {
        tracing::info!(
            "🛑 Force closing active trade {} (bot stopping)...",
            position.symbol
        );

        match ledger.force_close(ExitReason::Shutdown).await {
            Some(trade) => {
                let pnl_emoji = if trade.pnl_percent > 0.0 { "📈" } else { "📉" };
                tracing::info!(
                    "{} Trade force-closed - PnL: {:+.2}%",
                    pnl_emoji,
                    trade.pnl_percent
                );
                arm_cooldown(cooldowns, store, &trade.symbol).await;
            }
            None => {
                tracing::error!(
                    "Force sell failed for {}. State cleared to prevent a stuck lock.",
                    position.symbol
                );
            }
        }
    }

    tracing::info!("⏹️ Trading loop stopped");
}

// ============================================================================
// Price Broadcast Loop
// ============================================================================

/// Independent fast price readout for the open position. Reads snapshots
/// only; never mutates position, lock or cooldown state.
async fn price_broadcast_loop(client: Arc<BinanceClient>, shared: Arc<SharedState>) {
    tracing::info!("🔄 Price broadcast loop starting...");

    let mut ticker = interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        if shared.stop.load(Ordering::SeqCst) {
            return;
        }

        let position = shared.snapshot.read().unwrap().position.clone();
        let Some(position) = position else { continue };

        match client.get_24h_tickers().await {
            Ok(tickers) => {
                if let Some(ticker) = tickers.iter().find(|t| t.symbol == position.symbol) {
                    let pnl = RiskEngine::pnl_percent(position.entry_price, ticker.last_price);
                    tracing::info!(
                        "⚡ {} @ {} | PnL {:+.2}%",
                        position.symbol,
                        ticker.last_price,
                        pnl
                    );
                }
            }
            Err(e) => tracing::debug!("Fast price fetch failed: {}", e),
        }
    }
}
