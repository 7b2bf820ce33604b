use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Per-symbol post-exit cooldown windows.
///
/// Expiry is lazy: entries are removed when a read finds them past their
/// end time. Changing the configured duration never touches cooldowns
/// that are already armed.
pub struct CooldownRegistry {
    cooldowns: HashMap<String, DateTime<Utc>>,
    duration_minutes: i64,
}

impl CooldownRegistry {
    pub fn new(duration_minutes: i64) -> Self {
        Self {
            cooldowns: HashMap::new(),
            duration_minutes,
        }
    }

    /// Rebuild from persisted state, dropping entries that expired while
    /// the process was down.
    pub fn from_parts(cooldowns: HashMap<String, DateTime<Utc>>, duration_minutes: i64) -> Self {
        let now = Utc::now();
        let live: HashMap<String, DateTime<Utc>> = cooldowns
            .into_iter()
            .filter(|(_, expires_at)| *expires_at > now)
            .collect();

        if !live.is_empty() {
            tracing::info!("Restored {} active cooldowns", live.len());
        }

        Self {
            cooldowns: live,
            duration_minutes,
        }
    }

    pub fn arm(&mut self, symbol: &str) {
        self.arm_at(symbol, Utc::now());
    }

    pub fn arm_at(&mut self, symbol: &str, now: DateTime<Utc>) {
        let expires_at = now + chrono::Duration::minutes(self.duration_minutes);
        self.cooldowns.insert(symbol.to_string(), expires_at);
        tracing::info!(
            "Cooldown applied to {} for {} minutes",
            symbol,
            self.duration_minutes
        );
    }

    pub fn is_active(&mut self, symbol: &str) -> bool {
        self.is_active_at(symbol, Utc::now())
    }

    pub fn is_active_at(&mut self, symbol: &str, now: DateTime<Utc>) -> bool {
        match self.cooldowns.get(symbol) {
            Some(expires_at) if now >= *expires_at => {
                self.cooldowns.remove(symbol);
                tracing::info!("Cooldown expired for {}", symbol);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn remaining_minutes(&self, symbol: &str) -> i64 {
        self.remaining_minutes_at(symbol, Utc::now())
    }

    pub fn remaining_minutes_at(&self, symbol: &str, now: DateTime<Utc>) -> i64 {
        match self.cooldowns.get(symbol) {
            Some(expires_at) if *expires_at > now => {
                let remaining = (*expires_at - now).num_seconds();
                remaining / 60 + 1
            }
            _ => 0,
        }
    }

    /// Applies to future cooldowns only
    pub fn set_duration(&mut self, duration_minutes: i64) {
        self.duration_minutes = duration_minutes;
        tracing::info!("Cooldown duration updated to {} minutes", duration_minutes);
    }

    pub fn snapshot(&self) -> &HashMap<String, DateTime<Utc>> {
        &self.cooldowns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_and_check() {
        let mut registry = CooldownRegistry::new(60);
        let now = Utc::now();

        registry.arm_at("ABCUSDT", now);
        assert!(registry.is_active_at("ABCUSDT", now));
        assert!(!registry.is_active_at("XYZUSDT", now));
    }

    #[test]
    fn test_lazy_expiry_removes_entry() {
        let mut registry = CooldownRegistry::new(60);
        let now = Utc::now();

        registry.arm_at("ABCUSDT", now);
        let later = now + chrono::Duration::minutes(61);

        assert!(!registry.is_active_at("ABCUSDT", later));
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_remaining_minutes_rounds_up() {
        let mut registry = CooldownRegistry::new(60);
        let now = Utc::now();

        registry.arm_at("ABCUSDT", now);

        let half_way = now + chrono::Duration::minutes(30) + chrono::Duration::seconds(30);
        assert_eq!(registry.remaining_minutes_at("ABCUSDT", half_way), 30);
        assert_eq!(registry.remaining_minutes_at("XYZUSDT", half_way), 0);
    }

    #[test]
    fn test_duration_update_is_not_retroactive() {
        let mut registry = CooldownRegistry::new(60);
        let now = Utc::now();

        registry.arm_at("ABCUSDT", now);
        registry.set_duration(5);

        // Existing cooldown still runs on the old 60-minute window
        let after_ten = now + chrono::Duration::minutes(10);
        assert!(registry.is_active_at("ABCUSDT", after_ten));

        // New cooldowns use the new duration
        registry.arm_at("XYZUSDT", now);
        assert!(!registry.is_active_at("XYZUSDT", after_ten));
    }

    #[test]
    fn test_restore_drops_expired_entries() {
        let now = Utc::now();
        let mut persisted = HashMap::new();
        persisted.insert("LIVEUSDT".to_string(), now + chrono::Duration::minutes(10));
        persisted.insert("DEADUSDT".to_string(), now - chrono::Duration::minutes(10));

        let mut registry = CooldownRegistry::from_parts(persisted, 60);
        assert!(registry.is_active_at("LIVEUSDT", now));
        assert!(!registry.is_active_at("DEADUSDT", now));
        assert_eq!(registry.snapshot().len(), 1);
    }
}
