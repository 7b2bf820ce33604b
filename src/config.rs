use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

fn default_scan_interval_secs() -> u64 {
    2
}

/// Strategy configuration, loaded from a JSON file with environment
/// overrides (`GAINERBOT_*`). API credentials are not part of this file;
/// they come from `BINANCE_API_KEY` / `BINANCE_API_SECRET`.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// How many top gainers to monitor per scan
    pub top_gainers_count: usize,
    /// Live volume must reach baseline volume times this multiplier
    pub volume_multiplier: f64,
    /// Minutes into the hour during which the volume condition may fire
    pub volume_time_limit: u32,
    /// Live price must exceed baseline close by this percentage
    pub price_change_percent: f64,
    pub stop_loss_percent: f64,
    pub take_profit_percent: f64,
    pub trailing_stop_percent: f64,
    /// Post-exit re-entry cooldown per symbol
    pub cooldown_minutes: i64,
    #[serde(default)]
    pub time_exit_enabled: bool,
    #[serde(default)]
    pub max_trade_duration_minutes: i64,
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
}

impl BotConfig {
    /// Load configuration from a JSON file, layered with environment
    /// overrides (e.g. `GAINERBOT_COOLDOWN_MINUTES=30`).
    pub fn load(path: &Path) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix("GAINERBOT"))
            .build()
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let config: BotConfig = settings
            .try_deserialize()
            .context("config file has missing or mistyped keys")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_gainers_count == 0 {
            bail!("top_gainers_count must be >= 1");
        }
        if self.volume_multiplier < 0.1 {
            bail!("volume_multiplier must be >= 0.1");
        }
        if self.volume_time_limit < 1 || self.volume_time_limit > 60 {
            bail!("volume_time_limit must be between 1 and 60 minutes");
        }
        if self.price_change_percent < 0.0 {
            bail!("price_change_percent must be >= 0");
        }
        if self.stop_loss_percent <= 0.0 {
            bail!("stop_loss_percent must be > 0");
        }
        if self.take_profit_percent <= 0.0 {
            bail!("take_profit_percent must be > 0");
        }
        if self.trailing_stop_percent <= 0.0 {
            bail!("trailing_stop_percent must be > 0");
        }
        if self.cooldown_minutes < 0 {
            bail!("cooldown_minutes must be >= 0");
        }
        if self.time_exit_enabled && self.max_trade_duration_minutes <= 0 {
            bail!("max_trade_duration_minutes must be > 0 when time_exit_enabled");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> BotConfig {
        BotConfig {
            top_gainers_count: 35,
            volume_multiplier: 1.5,
            volume_time_limit: 30,
            price_change_percent: 1.0,
            stop_loss_percent: 2.0,
            take_profit_percent: 5.0,
            trailing_stop_percent: 1.0,
            cooldown_minutes: 60,
            time_exit_enabled: false,
            max_trade_duration_minutes: 0,
            scan_interval_secs: 2,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_rejects_low_volume_multiplier() {
        let mut config = valid_config();
        config.volume_multiplier = 0.05;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_time_limit_out_of_range() {
        let mut config = valid_config();
        config.volume_time_limit = 0;
        assert!(config.validate().is_err());

        config.volume_time_limit = 61;
        assert!(config.validate().is_err());

        config.volume_time_limit = 60;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_time_exit_requires_duration() {
        let mut config = valid_config();
        config.time_exit_enabled = true;
        config.max_trade_duration_minutes = 0;
        assert!(config.validate().is_err());

        config.max_trade_duration_minutes = 120;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_json_file() {
        let dir = std::env::temp_dir().join("gainerbot_config_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(
            &path,
            r#"{
                "top_gainers_count": 20,
                "volume_multiplier": 2.0,
                "volume_time_limit": 25,
                "price_change_percent": 1.5,
                "stop_loss_percent": 2.0,
                "take_profit_percent": 5.0,
                "trailing_stop_percent": 1.0,
                "cooldown_minutes": 45
            }"#,
        )
        .unwrap();

        let config = BotConfig::load(&path).unwrap();
        assert_eq!(config.top_gainers_count, 20);
        assert_eq!(config.cooldown_minutes, 45);
        // Defaults applied for optional keys
        assert!(!config.time_exit_enabled);
        assert_eq!(config.scan_interval_secs, 2);

        std::fs::remove_file(&path).ok();
    }
}
