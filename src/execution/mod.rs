// Position lifecycle module
pub mod cooldown;
pub mod entry;
pub mod ledger;
pub mod risk;

pub use cooldown::CooldownRegistry;
pub use entry::{EntryEvaluator, RequiredLevels, SignalStatus, Verdict};
pub use ledger::{LedgerError, PositionLedger};
pub use risk::RiskEngine;
