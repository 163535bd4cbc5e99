//! Field-by-field merge of the local journal with the remote backup.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::models::{BackupDocument, JournalSnapshot, PreMarketNotes, StrategyProfile, Trade};

/// Merge `local` with the downloaded `remote` document.
///
/// - trades: union by id, local wins on collision
/// - strategy: local unless it is the template and remote has one
/// - notes: the more recently dated one, local on a tie
/// - unmodelled top-level fields: union, remote on collision
/// - `last_updated` is `now`
pub fn merge_snapshots(
    local: &JournalSnapshot,
    remote: &BackupDocument,
    now: DateTime<Utc>,
    template_marker: &str,
) -> JournalSnapshot {
    JournalSnapshot::new(
        merge_trades(&remote.trades, &local.trades),
        merge_strategy(&local.strategy, remote.strategy.as_ref(), template_marker),
        merge_notes(local.notes.as_ref(), remote.pre_market_notes.as_ref()),
        now,
    )
    .with_extra(merge_extra(&local.extra, &remote.extra))
}

/// This client never edits these fields, so the remote copy is the fresher one.
pub fn merge_extra(local: &Map<String, Value>, remote: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = local.clone();
    for (key, value) in remote {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Remote trades in their order, each overwritten by the local trade with
/// the same id, followed by local-only trades in local order.
pub fn merge_trades(remote: &[Trade], local: &[Trade]) -> Vec<Trade> {
    let mut merged: Vec<Trade> = Vec::with_capacity(remote.len() + local.len());
    let mut slots: HashMap<&str, usize> = HashMap::with_capacity(remote.len() + local.len());

    for trade in remote.iter().chain(local.iter()) {
        match slots.get(trade.id.as_str()) {
            Some(&slot) => merged[slot] = trade.clone(),
            None => {
                slots.insert(trade.id.as_str(), merged.len());
                merged.push(trade.clone());
            }
        }
    }

    merged
}

pub fn merge_strategy(
    local: &StrategyProfile,
    remote: Option<&StrategyProfile>,
    template_marker: &str,
) -> StrategyProfile {
    match remote {
        Some(remote) if local.is_template(template_marker) => remote.clone(),
        _ => local.clone(),
    }
}

pub fn merge_notes(
    local: Option<&PreMarketNotes>,
    remote: Option<&PreMarketNotes>,
) -> Option<PreMarketNotes> {
    match (local, remote) {
        (Some(l), Some(r)) if r.date > l.date => Some(r.clone()),
        (Some(l), _) => Some(l.clone()),
        (None, r) => r.cloned(),
    }
}
