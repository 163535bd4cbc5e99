//! Data models for journal trades, strategy profile, notes, and snapshots.

mod snapshot;
mod strategy;
mod trade;

pub use snapshot::{BackupDocument, JournalSnapshot, PreMarketNotes};
pub use strategy::{StrategyProfile, TEMPLATE_MARKER};
pub use trade::{Trade, TradeDirection};
