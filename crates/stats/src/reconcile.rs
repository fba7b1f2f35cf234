use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use common::config::ReconcileConfig;
use common::{ClosedTrade, Direction, Position};

/// Internal view of a trade, as the engine recorded it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: u64,
    pub pair: String,
    pub direction: Direction,
    pub units: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&Position> for TradeRecord {
    fn from(p: &Position) -> Self {
        Self {
            id: p.id,
            pair: p.pair.clone(),
            direction: p.direction,
            units: p.units,
            timestamp: p.entry_time,
        }
    }
}

impl From<&ClosedTrade> for TradeRecord {
    fn from(t: &ClosedTrade) -> Self {
        Self::from(&t.position)
    }
}

/// A trade as the external ledger reports it. The ledger carries its own
/// identifiers; nothing links the two sides except pair, side, size, and
/// time proximity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub ledger_id: String,
    pub pair: String,
    pub direction: Direction,
    pub units: f64,
    /// Fill price as the ledger reports it. Carried for the report; price
    /// slippage is not part of the match key.
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub matched: Vec<(u64, String)>,
    pub unmatched_internal: Vec<TradeRecord>,
    pub unmatched_external: Vec<LedgerEntry>,
    /// Matched fraction of the larger side, in [0, 1]. Both sides empty
    /// counts as fully in sync.
    pub sync_fraction: f64,
}

impl ReconcileReport {
    pub fn in_sync(&self) -> bool {
        self.unmatched_internal.is_empty() && self.unmatched_external.is_empty()
    }
}

fn matches(internal: &TradeRecord, entry: &LedgerEntry, cfg: &ReconcileConfig) -> bool {
    if internal.pair != entry.pair || internal.direction != entry.direction {
        return false;
    }
    let dt = (internal.timestamp - entry.timestamp).num_seconds().abs();
    if dt > cfg.time_window_secs {
        return false;
    }
    let scale = internal.units.abs().max(entry.units.abs());
    if scale == 0.0 {
        return true;
    }
    (internal.units - entry.units).abs() / scale <= cfg.unit_tolerance
}

/// Match internal records against an external ledger.
///
/// Greedy and deterministic: internal records are walked in timestamp order
/// (id breaks ties), and each takes the closest eligible ledger entry by
/// time distance, then by unit distance. An entry matches at most once.
/// Input order on either side does not change the outcome.
pub fn reconcile(
    internal: &[TradeRecord],
    external: &[LedgerEntry],
    cfg: &ReconcileConfig,
) -> ReconcileReport {
    let mut ordered: Vec<&TradeRecord> = internal.iter().collect();
    ordered.sort_by_key(|r| (r.timestamp, r.id));

    let mut claimed = vec![false; external.len()];
    let mut matched = Vec::new();
    let mut unmatched_internal = Vec::new();

    for record in ordered {
        let best = external
            .iter()
            .enumerate()
            .filter(|(i, entry)| !claimed[*i] && matches(record, entry, cfg))
            .min_by(|(_, a), (_, b)| {
                let ta = (record.timestamp - a.timestamp).num_seconds().abs();
                let tb = (record.timestamp - b.timestamp).num_seconds().abs();
                let ua = (record.units - a.units).abs();
                let ub = (record.units - b.units).abs();
                ta.cmp(&tb)
                    .then(ua.total_cmp(&ub))
                    .then(a.ledger_id.cmp(&b.ledger_id))
            });
        match best {
            Some((i, entry)) => {
                claimed[i] = true;
                matched.push((record.id, entry.ledger_id.clone()));
            }
            None => {
                warn!(
                    id = record.id,
                    pair = %record.pair,
                    "Internal trade has no ledger counterpart"
                );
                unmatched_internal.push(record.clone());
            }
        }
    }

    let unmatched_external: Vec<LedgerEntry> = external
        .iter()
        .zip(&claimed)
        .filter(|(_, claimed)| !**claimed)
        .map(|(entry, _)| entry.clone())
        .collect();
    for entry in &unmatched_external {
        warn!(
            ledger_id = %entry.ledger_id,
            pair = %entry.pair,
            "Ledger entry unknown to the engine"
        );
    }

    let denominator = internal.len().max(external.len());
    let sync_fraction = if denominator == 0 {
        1.0
    } else {
        matched.len() as f64 / denominator as f64
    };
    info!(
        matched = matched.len(),
        internal = internal.len(),
        external = external.len(),
        sync_fraction,
        "Reconciliation complete"
    );

    ReconcileReport { matched, unmatched_internal, unmatched_external, sync_fraction }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(mins: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 12, 0, 0).unwrap() + Duration::minutes(mins)
    }

    fn record(id: u64, pair: &str, units: f64, mins: i64) -> TradeRecord {
        TradeRecord {
            id,
            pair: pair.into(),
            direction: Direction::Buy,
            units,
            timestamp: at(mins),
        }
    }

    fn entry(ledger_id: &str, pair: &str, units: f64, mins: i64) -> LedgerEntry {
        LedgerEntry {
            ledger_id: ledger_id.into(),
            pair: pair.into(),
            direction: Direction::Buy,
            units,
            price: 1.10,
            timestamp: at(mins),
        }
    }

    fn cfg() -> ReconcileConfig {
        ReconcileConfig { time_window_secs: 300, unit_tolerance: 0.05 }
    }

    #[test]
    fn both_sides_empty_is_fully_in_sync() {
        let report = reconcile(&[], &[], &cfg());
        assert!(report.in_sync());
        assert_eq!(report.sync_fraction, 1.0);
    }

    #[test]
    fn tolerant_matching_within_window_and_units() {
        let internal = vec![record(1, "EUR/USD", 10_000.0, 0)];
        // 2 minutes later, 3% unit drift — still the same trade
        let external = vec![entry("L-1", "EUR/USD", 10_300.0, 2)];
        let report = reconcile(&internal, &external, &cfg());
        assert!(report.in_sync());
        assert_eq!(report.matched, vec![(1, "L-1".to_string())]);
    }

    #[test]
    fn drift_beyond_tolerance_does_not_match() {
        let internal = vec![record(1, "EUR/USD", 10_000.0, 0)];
        let external = vec![entry("L-1", "EUR/USD", 12_000.0, 2)];
        let report = reconcile(&internal, &external, &cfg());
        assert!(!report.in_sync());
        assert_eq!(report.unmatched_internal.len(), 1);
        assert_eq!(report.unmatched_external.len(), 1);
        assert_eq!(report.sync_fraction, 0.0);
    }

    #[test]
    fn ten_of_twelve_matched_reports_the_fraction() {
        let internal: Vec<TradeRecord> =
            (0..10).map(|i| record(i, "EUR/USD", 10_000.0, i as i64 * 30)).collect();
        let mut external: Vec<LedgerEntry> = (0..10)
            .map(|i| entry(&format!("L-{i}"), "EUR/USD", 10_000.0, i as i64 * 30))
            .collect();
        // Two ledger-only fills the engine never saw
        external.push(entry("L-X", "GBP/USD", 5_000.0, 600));
        external.push(entry("L-Y", "GBP/USD", 5_000.0, 660));

        let report = reconcile(&internal, &external, &cfg());
        assert_eq!(report.matched.len(), 10);
        assert_eq!(report.unmatched_external.len(), 2);
        assert!((report.sync_fraction - 10.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn each_ledger_entry_matches_at_most_once() {
        // Two internal records both within the window of one ledger entry
        let internal = vec![record(1, "EUR/USD", 10_000.0, 0), record(2, "EUR/USD", 10_000.0, 1)];
        let external = vec![entry("L-1", "EUR/USD", 10_000.0, 0)];
        let report = reconcile(&internal, &external, &cfg());
        assert_eq!(report.matched.len(), 1);
        assert_eq!(report.matched[0], (1, "L-1".to_string()));
        assert_eq!(report.unmatched_internal.len(), 1);
        assert_eq!(report.unmatched_internal[0].id, 2);
    }

    #[test]
    fn closest_in_time_wins_among_candidates() {
        let internal = vec![record(1, "EUR/USD", 10_000.0, 4)];
        let external = vec![
            entry("L-far", "EUR/USD", 10_000.0, 0),
            entry("L-near", "EUR/USD", 10_000.0, 5),
        ];
        let report = reconcile(&internal, &external, &cfg());
        assert_eq!(report.matched[0].1, "L-near");
    }

    #[test]
    fn outcome_is_independent_of_input_order() {
        let internal = vec![
            record(2, "EUR/USD", 10_000.0, 3),
            record(1, "EUR/USD", 10_000.0, 0),
        ];
        let mut reversed = internal.clone();
        reversed.reverse();
        let external = vec![
            entry("L-b", "EUR/USD", 10_000.0, 3),
            entry("L-a", "EUR/USD", 10_000.0, 0),
        ];

        let a = reconcile(&internal, &external, &cfg());
        let b = reconcile(&reversed, &external, &cfg());
        assert_eq!(a.matched, b.matched);
        assert_eq!(a.matched.len(), 2);
        // Each record took its nearest entry regardless of ordering
        assert!(a.matched.contains(&(1, "L-a".to_string())));
        assert!(a.matched.contains(&(2, "L-b".to_string())));
    }

    #[test]
    fn direction_mismatch_never_matches() {
        let internal = vec![record(1, "EUR/USD", 10_000.0, 0)];
        let mut e = entry("L-1", "EUR/USD", 10_000.0, 0);
        e.direction = Direction::Sell;
        let report = reconcile(&internal, &[e], &cfg());
        assert!(!report.in_sync());
    }
}
