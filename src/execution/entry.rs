use crate::config::BotConfig;
use crate::models::{CandleBaseline, LiveCandle};
use serde::Serialize;

/// Outcome class of one entry evaluation
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum SignalStatus {
    Locked,
    Cooldown,
    Timeout,
    Wait,
    Signal,
}

impl std::fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignalStatus::Locked => "LOCKED",
            SignalStatus::Cooldown => "COOLDOWN",
            SignalStatus::Timeout => "TIME OUT",
            SignalStatus::Wait => "WAIT",
            SignalStatus::Signal => "SIGNAL",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub signal: bool,
    pub status: SignalStatus,
    pub reason: String,
}

impl Verdict {
    fn no_signal(status: SignalStatus, reason: String) -> Self {
        Self {
            signal: false,
            status,
            reason,
        }
    }
}

/// Thresholds a symbol must cross before a signal fires
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RequiredLevels {
    pub required_volume: f64,
    pub required_price: f64,
    pub volume_time_limit: u32,
}

/// Validates all entry conditions for a candidate symbol.
///
/// The gate order is a deliberate priority: lock, cooldown and timeout
/// disqualify before the economic thresholds are even looked at, so a
/// symbol outside its time window reports TIME OUT rather than WAIT.
pub struct EntryEvaluator {
    volume_multiplier: f64,
    volume_time_limit: u32,
    price_change_percent: f64,
    cooldown_minutes: i64,
}

impl EntryEvaluator {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            volume_multiplier: config.volume_multiplier,
            volume_time_limit: config.volume_time_limit,
            price_change_percent: config.price_change_percent,
            cooldown_minutes: config.cooldown_minutes,
        }
    }

    pub fn evaluate(
        &self,
        _symbol: &str,
        baseline: &CandleBaseline,
        live: &LiveCandle,
        live_price: f64,
        lock_held: bool,
        in_cooldown: bool,
    ) -> Verdict {
        if lock_held {
            return Verdict::no_signal(
                SignalStatus::Locked,
                "Another trade is active (global lock)".to_string(),
            );
        }

        if in_cooldown {
            return Verdict::no_signal(
                SignalStatus::Cooldown,
                format!("Coin in {}-minute cooldown", self.cooldown_minutes),
            );
        }

        // Strict greater-than: exactly at the limit is still eligible
        if live.elapsed_minutes > self.volume_time_limit {
            return Verdict::no_signal(
                SignalStatus::Timeout,
                format!("Exceeded {} minute time limit", self.volume_time_limit),
            );
        }

        let levels = self.required_levels(baseline);

        if live.volume < levels.required_volume {
            return Verdict::no_signal(
                SignalStatus::Wait,
                format!(
                    "Volume not reached (need {:.0}, have {:.0})",
                    levels.required_volume, live.volume
                ),
            );
        }

        if live_price < levels.required_price {
            return Verdict::no_signal(
                SignalStatus::Wait,
                format!(
                    "Price not reached (need {:.4}, have {:.4})",
                    levels.required_price, live_price
                ),
            );
        }

        Verdict {
            signal: true,
            status: SignalStatus::Signal,
            reason: format!(
                "All conditions met! Volume: {:.0}/{:.0}, Price: {:.4}/{:.4}",
                live.volume, levels.required_volume, live_price, levels.required_price
            ),
        }
    }

    pub fn required_levels(&self, baseline: &CandleBaseline) -> RequiredLevels {
        RequiredLevels {
            required_volume: baseline.volume * self.volume_multiplier,
            required_price: baseline.close_price * (1.0 + self.price_change_percent / 100.0),
            volume_time_limit: self.volume_time_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator() -> EntryEvaluator {
        EntryEvaluator {
            volume_multiplier: 2.0,
            volume_time_limit: 30,
            price_change_percent: 1.0,
            cooldown_minutes: 60,
        }
    }

    fn baseline() -> CandleBaseline {
        CandleBaseline {
            open_time_ms: 0,
            close_price: 100.0,
            volume: 1000.0,
        }
    }

    fn live(volume: f64, elapsed_minutes: u32) -> LiveCandle {
        LiveCandle {
            open_time_ms: 3_600_000,
            price: 0.0,
            volume,
            elapsed_minutes,
        }
    }

    #[test]
    fn test_lock_beats_everything() {
        // Volume and price conditions are both met, but the lock is held:
        // must report LOCKED, never SIGNAL or WAIT.
        let verdict = evaluator().evaluate("ABCUSDT", &baseline(), &live(5000.0, 5), 105.0, true, false);
        assert_eq!(verdict.status, SignalStatus::Locked);
        assert!(!verdict.signal);
    }

    #[test]
    fn test_cooldown_beats_timeout() {
        let verdict =
            evaluator().evaluate("ABCUSDT", &baseline(), &live(5000.0, 59), 105.0, false, true);
        assert_eq!(verdict.status, SignalStatus::Cooldown);
    }

    #[test]
    fn test_timeout_is_strictly_greater_than() {
        // Exactly at the limit: still eligible
        let verdict =
            evaluator().evaluate("ABCUSDT", &baseline(), &live(5000.0, 30), 105.0, false, false);
        assert_eq!(verdict.status, SignalStatus::Signal);

        // One past the limit: timed out even though thresholds are met
        let verdict =
            evaluator().evaluate("ABCUSDT", &baseline(), &live(5000.0, 31), 105.0, false, false);
        assert_eq!(verdict.status, SignalStatus::Timeout);
    }

    #[test]
    fn test_volume_gate() {
        // required_volume = 1000 * 2.0 = 2000
        let verdict =
            evaluator().evaluate("ABCUSDT", &baseline(), &live(1999.0, 5), 105.0, false, false);
        assert_eq!(verdict.status, SignalStatus::Wait);
        assert!(verdict.reason.contains("Volume"));
    }

    #[test]
    fn test_price_gate() {
        // required_price = 100 * 1.01 = 101
        let verdict =
            evaluator().evaluate("ABCUSDT", &baseline(), &live(5000.0, 5), 100.5, false, false);
        assert_eq!(verdict.status, SignalStatus::Wait);
        assert!(verdict.reason.contains("Price"));
    }

    #[test]
    fn test_signal_when_all_conditions_met() {
        let verdict =
            evaluator().evaluate("ABCUSDT", &baseline(), &live(2000.0, 5), 101.0, false, false);
        assert_eq!(verdict.status, SignalStatus::Signal);
        assert!(verdict.signal);
    }

    #[test]
    fn test_required_levels() {
        let levels = evaluator().required_levels(&baseline());
        assert_eq!(levels.required_volume, 2000.0);
        assert_eq!(levels.required_price, 101.0);
        assert_eq!(levels.volume_time_limit, 30);
    }
}
