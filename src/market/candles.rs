use crate::api::{BinanceClient, GatewayError, Kline};
use crate::models::{CandleBaseline, LiveCandle};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

const FETCH_COOLDOWN_SECS: i64 = 10;
const HOUR_MS: i64 = 3_600_000;

/// Tracks the hourly candle window per symbol.
///
/// Guarantees:
/// - the baseline (previous closed candle) is captured once per UTC hour
///   and never overwritten mid-hour, regardless of fetch frequency
/// - the live candle is overwritten on every successful refresh
/// - elapsed minutes are always within [0, 60]; readings outside the range
///   reject the whole update without mutating anything
pub struct CandleTracker {
    baselines: HashMap<String, CandleBaseline>,
    live: HashMap<String, LiveCandle>,
    baseline_hour: HashMap<String, i64>,
    last_fetch: HashMap<String, DateTime<Utc>>,
}

impl CandleTracker {
    pub fn new() -> Self {
        Self {
            baselines: HashMap::new(),
            live: HashMap::new(),
            baseline_hour: HashMap::new(),
            last_fetch: HashMap::new(),
        }
    }

    /// Refresh the candle window for a symbol from the gateway.
    ///
    /// Fetches are debounced per symbol; inside the cooldown this returns
    /// success and keeps the last-known data.
    pub async fn refresh(
        &mut self,
        client: &BinanceClient,
        symbol: &str,
    ) -> Result<(), GatewayError> {
        let now = Utc::now();
        if !self.should_fetch(symbol, now) {
            return Ok(());
        }

        let klines = client.get_recent_klines(symbol, 2).await?;
        self.ingest(symbol, &klines, now)?;
        self.last_fetch.insert(symbol.to_string(), now);
        Ok(())
    }

    pub fn should_fetch(&self, symbol: &str, now: DateTime<Utc>) -> bool {
        match self.last_fetch.get(symbol) {
            Some(last) => (now - *last).num_seconds() >= FETCH_COOLDOWN_SECS,
            None => true,
        }
    }

    /// Apply a fetched kline pair at an explicit timestamp.
    pub fn ingest(
        &mut self,
        symbol: &str,
        klines: &[Kline],
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        if klines.len() < 2 {
            return Err(GatewayError::Malformed(format!(
                "expected 2 klines for {}, got {}",
                symbol,
                klines.len()
            )));
        }

        let prev = &klines[klines.len() - 2];
        let curr = &klines[klines.len() - 1];

        // Validate before any mutation: a stale current candle poisons the
        // live window and the baseline swap alike.
        let elapsed = match elapsed_minutes(curr.open_time_ms, now) {
            Some(minutes) => minutes,
            None => {
                return Err(GatewayError::Malformed(format!(
                    "stale live candle for {} (open_time {})",
                    symbol, curr.open_time_ms
                )))
            }
        };

        let hour_start = hour_start_ms(now);
        if self.baseline_hour.get(symbol) != Some(&hour_start) {
            self.baselines.insert(
                symbol.to_string(),
                CandleBaseline {
                    open_time_ms: prev.open_time_ms,
                    close_price: prev.close,
                    volume: prev.volume,
                },
            );
            self.baseline_hour.insert(symbol.to_string(), hour_start);
            tracing::info!("[{}] baseline candle locked", symbol);
        }

        self.live.insert(
            symbol.to_string(),
            LiveCandle {
                open_time_ms: curr.open_time_ms,
                price: curr.close,
                volume: curr.volume,
                elapsed_minutes: elapsed,
            },
        );

        Ok(())
    }

    pub fn baseline(&self, symbol: &str) -> Option<&CandleBaseline> {
        self.baselines.get(symbol)
    }

    pub fn live(&self, symbol: &str) -> Option<&LiveCandle> {
        self.live.get(symbol)
    }
}

impl Default for CandleTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn hour_start_ms(now: DateTime<Utc>) -> i64 {
    let ms = now.timestamp_millis();
    ms - ms.rem_euclid(HOUR_MS)
}

/// Minutes since the candle opened, clamped at the low end for clock skew.
/// More than 60 minutes means the reading is stale and must be discarded.
fn elapsed_minutes(open_time_ms: i64, now: DateTime<Utc>) -> Option<u32> {
    let minutes = (now.timestamp_millis() - open_time_ms) / 60_000;
    if minutes < 0 {
        Some(0)
    } else if minutes > 60 {
        None
    } else {
        Some(minutes as u32)
    }
}
