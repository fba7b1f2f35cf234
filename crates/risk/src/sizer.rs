use tracing::debug;

use common::config::RiskConfig;
use common::{AccountState, Session, SignalCandidate};

/// Converts account state, quality score, and session context into a trade
/// size in units.
///
/// Base size risks `base_risk_fraction` of the balance over the stop
/// distance, then quality, session, and compound-growth multipliers scale
/// it. The final clamp to `max_risk_fraction` runs last and dominates every
/// multiplier above it.
pub struct PositionSizer {
    cfg: RiskConfig,
}

impl PositionSizer {
    pub fn new(cfg: RiskConfig) -> Self {
        Self { cfg }
    }

    /// Size a trade. `stop_distance` is the price distance to the initial
    /// stop. Returns `None` when the risk-clamped size falls below the
    /// broker minimum — such a trade cannot be opened without breaking the
    /// per-trade risk ceiling.
    pub fn units(
        &self,
        candidate: &SignalCandidate,
        account: &AccountState,
        stop_distance: f64,
        session: Session,
    ) -> Option<f64> {
        if stop_distance <= 0.0 || !stop_distance.is_finite() {
            return None;
        }

        let base = account.balance * self.cfg.base_risk_fraction / stop_distance;
        let quality_mult = self.quality_multiplier(candidate.quality);
        let session_mult = self.cfg.session_multipliers.get(session);
        let compound_mult = self.compound_multiplier(account);

        let scaled = base * quality_mult * session_mult * compound_mult;

        // The hard ceiling: whatever the multipliers produced, resulting
        // risk may not exceed max_risk_fraction of the balance.
        let risk_ceiling = account.balance * self.cfg.max_risk_fraction / stop_distance;
        let units = scaled.min(risk_ceiling).min(self.cfg.max_units).floor();

        debug!(
            pair = %candidate.pair,
            base,
            quality_mult,
            session_mult,
            compound_mult,
            units,
            "Position sized"
        );

        if units < self.cfg.min_units {
            return None;
        }
        Some(units)
    }

    /// Linear map: quality 0 -> min multiplier, quality 1 -> max.
    fn quality_multiplier(&self, quality: f64) -> f64 {
        let q = quality.clamp(0.0, 1.0);
        self.cfg.quality_mult_min + q * (self.cfg.quality_mult_max - self.cfg.quality_mult_min)
    }

    /// Monotone in realized account growth, bounded to [floor, cap].
    fn compound_multiplier(&self, account: &AccountState) -> f64 {
        account
            .growth()
            .clamp(self.cfg.compound_floor, self.cfg.compound_cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{Direction, ScoreFactors};

    fn candidate(quality: f64) -> SignalCandidate {
        SignalCandidate {
            pair: "EUR/USD".into(),
            timestamp: Utc::now(),
            direction: Direction::Buy,
            quality,
            factors: ScoreFactors {
                agreement: quality,
                sentiment: 0.0,
                event_weight: 1.0,
                source_weight: 1.0,
            },
        }
    }

    fn sizer() -> PositionSizer {
        PositionSizer::new(RiskConfig::default())
    }

    #[test]
    fn higher_quality_sizes_larger() {
        let account = AccountState::new(100_000.0);
        let low = sizer()
            .units(&candidate(0.2), &account, 0.033, Session::London)
            .unwrap();
        let high = sizer()
            .units(&candidate(0.9), &account, 0.033, Session::London)
            .unwrap();
        assert!(high > low);
    }

    #[test]
    fn peak_session_sizes_larger_than_off_hours() {
        let account = AccountState::new(100_000.0);
        let overlap = sizer()
            .units(&candidate(0.7), &account, 0.033, Session::Overlap)
            .unwrap();
        let off = sizer()
            .units(&candidate(0.7), &account, 0.033, Session::OffHours)
            .unwrap();
        assert!(overlap > off);
    }

    #[test]
    fn risk_clamp_dominates_all_multipliers() {
        // Stack every multiplier at its maximum
        let mut account = AccountState::new(100_000.0);
        account.balance = 500_000.0; // 5x growth, clamped to compound_cap
        let cfg = RiskConfig::default();
        let stop_distance = 0.033;
        let units = PositionSizer::new(cfg.clone())
            .units(&candidate(1.0), &account, stop_distance, Session::Overlap)
            .unwrap();
        let risk = units * stop_distance;
        assert!(
            risk <= account.balance * cfg.max_risk_fraction + 1e-6,
            "risk {risk} exceeds ceiling"
        );
    }

    #[test]
    fn compound_multiplier_caps_and_floors() {
        let cfg = RiskConfig::default();
        let s = PositionSizer::new(cfg.clone());

        let mut grown = AccountState::new(10_000.0);
        grown.balance = 100_000.0;
        assert_eq!(s.compound_multiplier(&grown), cfg.compound_cap);

        let mut drawn = AccountState::new(10_000.0);
        drawn.balance = 1_000.0;
        assert_eq!(s.compound_multiplier(&drawn), cfg.compound_floor);
    }

    #[test]
    fn tiny_account_cannot_meet_broker_minimum() {
        let account = AccountState::new(50.0);
        // 1% of 50 over a 0.033 stop is ~15 units, far below min_units
        assert!(sizer()
            .units(&candidate(0.9), &account, 0.033, Session::London)
            .is_none());
    }

    #[test]
    fn broker_maximum_bounds_the_size() {
        let cfg = RiskConfig {
            max_units: 2_000.0,
            ..RiskConfig::default()
        };
        let account = AccountState::new(10_000_000.0);
        let units = PositionSizer::new(cfg)
            .units(&candidate(1.0), &account, 0.033, Session::Overlap)
            .unwrap();
        assert!(units <= 2_000.0);
    }

    #[test]
    fn degenerate_stop_distance_is_refused() {
        let account = AccountState::new(10_000.0);
        assert!(sizer()
            .units(&candidate(0.9), &account, 0.0, Session::London)
            .is_none());
        assert!(sizer()
            .units(&candidate(0.9), &account, f64::NAN, Session::London)
            .is_none());
    }
}
