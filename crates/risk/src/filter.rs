use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{AccountState, Position, PositionStatus, RejectReason, SignalCandidate};

/// Outcome of the accept/reject check for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Accept,
    Reject(RejectReason),
}

/// Signals generated vs. executed vs. rejected, broken down by reason.
/// Rejections are expected, frequent outcomes — these counters are the
/// observable surface for them.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FilterStats {
    pub generated: u64,
    pub executed: u64,
    pub below_threshold: u64,
    pub daily_cap: u64,
    pub concurrency_cap: u64,
    pub duplicate: u64,
}

impl FilterStats {
    pub fn record_rejection(&mut self, reason: RejectReason) {
        match reason {
            RejectReason::BelowThreshold => self.below_threshold += 1,
            RejectReason::DailyCapReached => self.daily_cap += 1,
            RejectReason::ConcurrencyCapReached => self.concurrency_cap += 1,
            RejectReason::DuplicatePairDirection => self.duplicate += 1,
        }
    }

    pub fn rejected(&self) -> u64 {
        self.below_threshold + self.daily_cap + self.concurrency_cap + self.duplicate
    }
}

/// Accepts or rejects a scored candidate against the confidence threshold
/// and the per-period trade caps.
///
/// The caller must hold the account lock across evaluate-then-open so the
/// cap checks and the open are atomic as a unit.
pub struct SignalFilter {
    min_confidence: f64,
    max_daily_trades: u32,
    max_concurrent: usize,
    hedging: bool,
}

impl SignalFilter {
    pub fn new(
        min_confidence: f64,
        max_daily_trades: u32,
        max_concurrent: usize,
        hedging: bool,
    ) -> Self {
        Self { min_confidence, max_daily_trades, max_concurrent, hedging }
    }

    /// Check a candidate against threshold and caps. Checks run in a fixed
    /// order so a candidate failing several rules reports one stable reason.
    pub fn evaluate(
        &self,
        candidate: &SignalCandidate,
        account: &AccountState,
        open_positions: &[Position],
    ) -> FilterDecision {
        if candidate.quality < self.min_confidence {
            return self.reject(candidate, RejectReason::BelowThreshold);
        }
        if account.daily_trades >= self.max_daily_trades {
            return self.reject(candidate, RejectReason::DailyCapReached);
        }
        let open_count = open_positions
            .iter()
            .filter(|p| p.status == PositionStatus::Open)
            .count();
        if open_count >= self.max_concurrent {
            return self.reject(candidate, RejectReason::ConcurrencyCapReached);
        }
        if !self.hedging {
            let duplicate = open_positions.iter().any(|p| {
                p.status == PositionStatus::Open
                    && p.pair == candidate.pair
                    && p.direction == candidate.direction
            });
            if duplicate {
                return self.reject(candidate, RejectReason::DuplicatePairDirection);
            }
        }
        FilterDecision::Accept
    }

    fn reject(&self, candidate: &SignalCandidate, reason: RejectReason) -> FilterDecision {
        debug!(
            pair = %candidate.pair,
            direction = %candidate.direction,
            quality = candidate.quality,
            reason = %reason,
            "Candidate rejected"
        );
        FilterDecision::Reject(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{Direction, ScoreFactors, TrailingState};

    fn candidate(quality: f64, direction: Direction) -> SignalCandidate {
        SignalCandidate {
            pair: "EUR/USD".into(),
            timestamp: Utc::now(),
            direction,
            quality,
            factors: ScoreFactors {
                agreement: quality,
                sentiment: 0.0,
                event_weight: 1.0,
                source_weight: 1.0,
            },
        }
    }

    fn open_position(pair: &str, direction: Direction) -> Position {
        Position {
            id: 1,
            pair: pair.into(),
            direction,
            entry_price: 1.1,
            entry_time: Utc::now(),
            units: 1_000.0,
            stop_price: 1.07,
            target_price: 1.15,
            entry_risk: 30.0,
            trailing: TrailingState::default(),
            status: PositionStatus::Open,
        }
    }

    fn filter() -> SignalFilter {
        SignalFilter::new(0.55, 12, 5, false)
    }

    fn account() -> AccountState {
        let mut a = AccountState::new(10_000.0);
        a.roll_day(Utc::now());
        a
    }

    #[test]
    fn low_quality_is_rejected_below_threshold() {
        let d = filter().evaluate(&candidate(0.4, Direction::Buy), &account(), &[]);
        assert_eq!(d, FilterDecision::Reject(RejectReason::BelowThreshold));
    }

    #[test]
    fn high_quality_passes_with_room() {
        let d = filter().evaluate(&candidate(0.8, Direction::Buy), &account(), &[]);
        assert_eq!(d, FilterDecision::Accept);
    }

    #[test]
    fn thirteenth_trade_of_the_day_hits_daily_cap() {
        let mut acct = account();
        for _ in 0..12 {
            acct.record_open(10.0);
        }
        // Quality is irrelevant once the cap is reached
        let d = filter().evaluate(&candidate(0.99, Direction::Buy), &acct, &[]);
        assert_eq!(d, FilterDecision::Reject(RejectReason::DailyCapReached));
    }

    #[test]
    fn concurrency_cap_counts_open_positions() {
        let open: Vec<Position> = (0..5)
            .map(|i| {
                let mut p = open_position(&format!("PAIR{i}"), Direction::Buy);
                p.id = i;
                p
            })
            .collect();
        let d = filter().evaluate(&candidate(0.9, Direction::Sell), &account(), &open);
        assert_eq!(d, FilterDecision::Reject(RejectReason::ConcurrencyCapReached));
    }

    #[test]
    fn duplicate_pair_direction_rejected_without_hedging() {
        let open = vec![open_position("EUR/USD", Direction::Buy)];
        let d = filter().evaluate(&candidate(0.9, Direction::Buy), &account(), &open);
        assert_eq!(d, FilterDecision::Reject(RejectReason::DuplicatePairDirection));

        // Opposite direction on the same pair is fine
        let d = filter().evaluate(&candidate(0.9, Direction::Sell), &account(), &open);
        assert_eq!(d, FilterDecision::Accept);
    }

    #[test]
    fn hedging_allows_same_pair_same_direction() {
        let hedged = SignalFilter::new(0.55, 12, 5, true);
        let open = vec![open_position("EUR/USD", Direction::Buy)];
        let d = hedged.evaluate(&candidate(0.9, Direction::Buy), &account(), &open);
        assert_eq!(d, FilterDecision::Accept);
    }

    #[test]
    fn stats_break_down_by_reason() {
        let mut stats = FilterStats::default();
        stats.generated = 4;
        stats.record_rejection(RejectReason::BelowThreshold);
        stats.record_rejection(RejectReason::BelowThreshold);
        stats.record_rejection(RejectReason::DailyCapReached);
        stats.executed = 1;
        assert_eq!(stats.rejected(), 3);
        assert_eq!(stats.below_threshold, 2);
        assert_eq!(stats.generated, stats.executed + stats.rejected());
    }
}
