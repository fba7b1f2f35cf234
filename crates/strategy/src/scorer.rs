use tracing::trace;

use common::config::SignalConfig;
use common::{Direction, IndicatorSnapshot, ScoreFactors, Sentiment, SignalCandidate};

/// Combines indicator votes and optional sentiment into a single confluence
/// quality score in [0, 1].
///
/// Deterministic: identical inputs always yield identical score and direction.
pub struct SignalScorer {
    cfg: SignalConfig,
}

/// Technical component used when indicator votes split evenly.
const NEUTRAL_MIDPOINT: f64 = 0.5;

impl SignalScorer {
    pub fn new(cfg: SignalConfig) -> Self {
        Self { cfg }
    }

    /// Score one snapshot. Returns `None` when no indicator casts a vote.
    pub fn score(
        &self,
        snapshot: &IndicatorSnapshot,
        sentiment: Option<&Sentiment>,
    ) -> Option<SignalCandidate> {
        let voters: Vec<(Direction, f64)> = snapshot
            .readings
            .iter()
            .filter_map(|r| r.vote.map(|d| (d, r.strength)))
            .collect();
        if voters.is_empty() {
            return None;
        }

        let buys = voters.iter().filter(|(d, _)| *d == Direction::Buy).count();
        let sells = voters.len() - buys;

        let (direction, agreement, tied) = if buys == sells {
            // Even split: direction follows the single strongest vote
            // (first-in-snapshot order breaks exact strength ties), and the
            // technical component defaults to the neutral midpoint.
            let strongest = voters
                .iter()
                .copied()
                .reduce(|best, cur| if cur.1 > best.1 { cur } else { best })?;
            (strongest.0, NEUTRAL_MIDPOINT, true)
        } else if buys > sells {
            (Direction::Buy, buys as f64 / voters.len() as f64, false)
        } else {
            (Direction::Sell, sells as f64 / voters.len() as f64, false)
        };

        let mut factors = ScoreFactors {
            agreement,
            sentiment: 0.0,
            event_weight: 1.0,
            source_weight: 1.0,
        };

        let quality = if tied {
            // Neutral midpoint by definition; sentiment does not tip a tie.
            NEUTRAL_MIDPOINT
        } else {
            let mut q = self.cfg.tech_weight * agreement;
            if let Some(s) = sentiment {
                let magnitude = s.score.abs().min(1.0);
                let event_weight = self.cfg.event_weights.get(&s.event_type).copied().unwrap_or(1.0);
                let source_weight = self.cfg.source_weights.get(&s.source).copied().unwrap_or(1.0);
                // Sentiment opposing the technical direction subtracts.
                let aligned = (s.score >= 0.0) == (direction == Direction::Buy);
                let signed = if aligned { magnitude } else { -magnitude };
                q += self.cfg.sentiment_weight * signed * event_weight * source_weight;
                factors.sentiment = s.score;
                factors.event_weight = event_weight;
                factors.source_weight = source_weight;
            }
            q.clamp(0.0, 1.0)
        };

        trace!(
            pair = %snapshot.pair,
            direction = %direction,
            quality,
            agreement,
            "Signal scored"
        );

        Some(SignalCandidate {
            pair: snapshot.pair.clone(),
            timestamp: snapshot.timestamp,
            direction,
            quality,
            factors,
        })
    }
}
