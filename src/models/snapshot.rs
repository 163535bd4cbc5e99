//! Journal snapshot and its JSON backup form.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::{StrategyProfile, Trade};

/// Dated pre-market analysis note. Only one is kept at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreMarketNotes {
    pub date: NaiveDate,
    #[serde(default)]
    pub notes: String,
}

/// The unit of persistence: everything the journal syncs.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalSnapshot {
    /// Unique by `Trade::id`
    pub trades: Vec<Trade>,
    pub strategy: StrategyProfile,
    pub notes: Option<PreMarketNotes>,
    pub last_updated: DateTime<Utc>,
    /// Top-level backup fields this client does not model
    pub extra: Map<String, Value>,
}

impl JournalSnapshot {
    /// Build a snapshot, collapsing any duplicate trade ids.
    pub fn new(
        trades: Vec<Trade>,
        strategy: StrategyProfile,
        notes: Option<PreMarketNotes>,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            trades: dedup_trades(trades),
            strategy,
            notes,
            last_updated,
            extra: Map::new(),
        }
    }

    pub fn with_extra(mut self, extra: Map<String, Value>) -> Self {
        self.extra = extra;
        self
    }

    /// Empty journal with the seeded template strategy.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self::new(Vec::new(), StrategyProfile::default(), None, now)
    }

    pub fn trade(&self, id: &str) -> Option<&Trade> {
        self.trades.iter().find(|t| t.id == id)
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }
}

/// Collapse duplicate ids: the last occurrence wins, keeping the slot of the first.
pub fn dedup_trades(trades: Vec<Trade>) -> Vec<Trade> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(trades.len());
    let mut out: Vec<Trade> = Vec::with_capacity(trades.len());

    for trade in trades {
        match index.get(&trade.id) {
            Some(&slot) => out[slot] = trade,
            None => {
                index.insert(trade.id.clone(), out.len());
                out.push(trade);
            }
        }
    }

    out
}

/// Wire shape of the remote backup file.
///
/// Everything but `trades` may be missing. Unknown fields, at the top level
/// and inside trades and the strategy, are carried through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub trades: Vec<Trade>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyProfile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_market_notes: Option<PreMarketNotes>,

    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_updated: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BackupDocument {
    /// Wire form of `snapshot`. Same snapshot, same bytes.
    pub fn from_snapshot(snapshot: &JournalSnapshot) -> Self {
        Self {
            trades: snapshot.trades.clone(),
            strategy: Some(snapshot.strategy.clone()),
            pre_market_notes: snapshot.notes.clone(),
            last_updated: Some(snapshot.last_updated),
            extra: snapshot.extra.clone(),
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Parse a fetched payload. Anything that is not a backup document is `None`.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        match serde_json::from_slice::<BackupDocument>(bytes) {
            Ok(mut doc) => {
                doc.trades = dedup_trades(doc.trades);
                Some(doc)
            }
            Err(e) => {
                warn!(error = %e, bytes = bytes.len(), "Backup payload is not a journal document");
                None
            }
        }
    }

    /// Convert to a snapshot, seeding the template strategy when none was stored.
    pub fn into_snapshot(self, now: DateTime<Utc>) -> JournalSnapshot {
        JournalSnapshot::new(
            self.trades,
            self.strategy.unwrap_or_default(),
            self.pre_market_notes,
            self.last_updated.unwrap_or(now),
        )
        .with_extra(self.extra)
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}
