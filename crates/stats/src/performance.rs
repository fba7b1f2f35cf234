use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{ClosedTrade, Direction};

/// Gross profit over gross loss, with the all-winners case kept distinct
/// instead of collapsing into infinity or an arbitrary sentinel number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ProfitFactor {
    Ratio(f64),
    /// No losing trades recorded; the ratio is undefined, not infinite.
    NoLosses,
}

impl std::fmt::Display for ProfitFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfitFactor::Ratio(r) => write!(f, "{r:.2}"),
            ProfitFactor::NoLosses => write!(f, "no losses"),
        }
    }
}

/// Running totals for one slice of the trade history (a pair, a direction,
/// or the whole account).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Bucket {
    pub trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub breakeven: u64,
    pub total_pnl: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
}

impl Bucket {
    fn record(&mut self, pnl: f64) {
        self.trades += 1;
        self.total_pnl += pnl;
        if pnl > 0.0 {
            self.wins += 1;
            self.gross_profit += pnl;
        } else if pnl < 0.0 {
            self.losses += 1;
            self.gross_loss += -pnl;
        } else {
            self.breakeven += 1;
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.trades == 0 {
            0.0
        } else {
            self.wins as f64 / self.trades as f64
        }
    }

    pub fn profit_factor(&self) -> ProfitFactor {
        if self.gross_loss > 0.0 {
            ProfitFactor::Ratio(self.gross_profit / self.gross_loss)
        } else {
            ProfitFactor::NoLosses
        }
    }

    pub fn avg_winner(&self) -> f64 {
        if self.wins == 0 {
            0.0
        } else {
            self.gross_profit / self.wins as f64
        }
    }

    pub fn avg_loser(&self) -> f64 {
        if self.losses == 0 {
            0.0
        } else {
            self.gross_loss / self.losses as f64
        }
    }

    /// Average winner over average loser; 0 when either side is empty.
    pub fn risk_reward(&self) -> f64 {
        let loser = self.avg_loser();
        if loser == 0.0 {
            0.0
        } else {
            self.avg_winner() / loser
        }
    }

    /// Expected P/L per trade given the observed rates and averages.
    pub fn expectancy(&self) -> f64 {
        if self.trades == 0 {
            0.0
        } else {
            self.total_pnl / self.trades as f64
        }
    }
}

/// Point-in-time derived view over the tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub overall: Bucket,
    pub win_rate: f64,
    pub profit_factor: ProfitFactor,
    pub avg_winner: f64,
    pub avg_loser: f64,
    pub risk_reward: f64,
    pub expectancy: f64,
    pub by_pair: HashMap<String, Bucket>,
    pub by_direction: HashMap<Direction, Bucket>,
}

/// Accumulates closed trades into overall, per-pair, and per-direction
/// buckets. Derived metrics are recomputed on demand — the tracker itself
/// only ever adds.
#[derive(Debug, Default)]
pub struct PerformanceTracker {
    overall: Bucket,
    by_pair: HashMap<String, Bucket>,
    by_direction: HashMap<Direction, Bucket>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, trade: &ClosedTrade) {
        self.overall.record(trade.pnl);
        self.by_pair
            .entry(trade.position.pair.clone())
            .or_default()
            .record(trade.pnl);
        self.by_direction
            .entry(trade.position.direction)
            .or_default()
            .record(trade.pnl);
        debug!(
            pair = %trade.position.pair,
            pnl = trade.pnl,
            trades = self.overall.trades,
            "Trade recorded"
        );
    }

    pub fn trades(&self) -> u64 {
        self.overall.trades
    }

    pub fn snapshot(&self) -> PerformanceSnapshot {
        PerformanceSnapshot {
            overall: self.overall,
            win_rate: self.overall.win_rate(),
            profit_factor: self.overall.profit_factor(),
            avg_winner: self.overall.avg_winner(),
            avg_loser: self.overall.avg_loser(),
            risk_reward: self.overall.risk_reward(),
            expectancy: self.overall.expectancy(),
            by_pair: self.by_pair.clone(),
            by_direction: self.by_direction.clone(),
        }
    }
}
