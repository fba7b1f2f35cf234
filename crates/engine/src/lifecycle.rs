use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use common::config::ExitConfig;
use common::{
    pip_size, ClosedTrade, Direction, ExitReason, Position, PositionStatus, PriceBar,
    SignalCandidate, TrailingState,
};

/// What one bar did to an open position.
#[derive(Debug, Clone, PartialEq)]
pub enum BarOutcome {
    /// An exit condition matched. The first matching condition wins; the
    /// position closes exactly once.
    Exit { price: f64, reason: ExitReason },
    /// The trailing ratchet tightened the stop.
    StopAdjusted { from: f64, to: f64 },
    Hold,
}

/// Owns the per-position state machine: entry pricing, trailing-stop
/// ratchet, and exit-condition evaluation.
pub struct LifecycleManager {
    cfg: ExitConfig,
}

impl LifecycleManager {
    pub fn new(cfg: ExitConfig) -> Self {
        Self { cfg }
    }

    /// Price distance from entry to the initial stop, volatility-adjusted.
    pub fn stop_distance(&self, entry_price: f64) -> f64 {
        entry_price * self.cfg.stop_pct * self.cfg.volatility_mult
    }

    fn target_distance(&self, entry_price: f64) -> f64 {
        entry_price * self.cfg.target_pct * self.cfg.volatility_mult
    }

    /// Open a position from an accepted, sized candidate.
    pub fn open(
        &self,
        candidate: &SignalCandidate,
        units: f64,
        entry_price: f64,
        entry_time: DateTime<Utc>,
        id: u64,
    ) -> Position {
        let sign = candidate.direction.sign();
        let stop_distance = self.stop_distance(entry_price);
        Position {
            id,
            pair: candidate.pair.clone(),
            direction: candidate.direction,
            entry_price,
            entry_time,
            units,
            stop_price: entry_price - sign * stop_distance,
            target_price: entry_price + sign * self.target_distance(entry_price),
            entry_risk: units * stop_distance,
            trailing: TrailingState::default(),
            status: PositionStatus::Open,
        }
    }

    /// Evaluate one bar against an open position.
    ///
    /// Exit conditions are checked in priority order — stop, target,
    /// timeout — against the stop as it stood at the start of the bar. The
    /// ratchet runs only when no exit fired, so a bar cannot both tighten
    /// the stop and close on it.
    pub fn on_bar(&self, position: &mut Position, bar: &PriceBar) -> BarOutcome {
        if position.status != PositionStatus::Open {
            return BarOutcome::Hold;
        }

        let touched_stop = match position.direction {
            Direction::Buy => bar.low <= position.stop_price,
            Direction::Sell => bar.high >= position.stop_price,
        };
        if touched_stop {
            return BarOutcome::Exit {
                price: position.stop_price,
                reason: ExitReason::StopLoss,
            };
        }

        let touched_target = match position.direction {
            Direction::Buy => bar.high >= position.target_price,
            Direction::Sell => bar.low <= position.target_price,
        };
        if touched_target {
            return BarOutcome::Exit {
                price: position.target_price,
                reason: ExitReason::TargetHit,
            };
        }

        if bar.timestamp - position.entry_time >= Duration::hours(self.cfg.timeout_hours) {
            return BarOutcome::Exit {
                price: bar.close,
                reason: ExitReason::Timeout,
            };
        }

        self.ratchet(position, bar)
    }

    /// Tighten the stop once unrealized profit reaches the configured
    /// fraction of the distance-to-target. The stop only ever moves in the
    /// position's favor, even if price retraces afterwards.
    fn ratchet(&self, position: &mut Position, bar: &PriceBar) -> BarOutcome {
        let sign = position.direction.sign();
        let excursion = match position.direction {
            Direction::Buy => bar.high - position.entry_price,
            Direction::Sell => position.entry_price - bar.low,
        };
        let target_dist = (position.target_price - position.entry_price).abs();
        if excursion <= 0.0 || target_dist <= 0.0 {
            return BarOutcome::Hold;
        }
        if excursion < self.cfg.trail_trigger * target_dist {
            return BarOutcome::Hold;
        }

        let candidate_stop = position.entry_price + sign * self.cfg.trail_lock * excursion;
        let tighter = match position.direction {
            Direction::Buy => candidate_stop > position.stop_price,
            Direction::Sell => candidate_stop < position.stop_price,
        };
        if !tighter {
            return BarOutcome::Hold;
        }

        let from = position.stop_price;
        position.stop_price = candidate_stop;
        position.trailing.armed = true;
        debug!(
            pair = %position.pair,
            id = position.id,
            from,
            to = candidate_stop,
            "Trailing stop ratcheted"
        );
        BarOutcome::StopAdjusted { from, to: candidate_stop }
    }

    /// Turn an exiting position into its immutable closed-trade record.
    pub fn close(
        &self,
        mut position: Position,
        exit_price: f64,
        exit_time: DateTime<Utc>,
        reason: ExitReason,
    ) -> ClosedTrade {
        position.status = PositionStatus::Closed;
        let sign = position.direction.sign();
        let pnl = (exit_price - position.entry_price) * sign * position.units;
        let pips = (exit_price - position.entry_price) * sign / pip_size(&position.pair);
        let hold_secs = (exit_time - position.entry_time).num_seconds();
        ClosedTrade {
            position,
            exit_price,
            exit_time,
            reason,
            hold_secs,
            pnl,
            pips,
        }
    }
}
