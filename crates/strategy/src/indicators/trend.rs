use common::{Direction, IndicatorReading};

/// Fast/slow simple-moving-average trend filter.
///
/// Votes BUY while the fast average sits above the slow one; strength grows
/// with the relative gap, saturating at `FULL_STRENGTH_GAP`.
#[derive(Debug, Clone)]
pub struct SmaTrendIndicator {
    pub fast: usize,
    pub slow: usize,
}

impl SmaTrendIndicator {
    /// Relative fast/slow gap treated as a full-strength trend (0.5%).
    const FULL_STRENGTH_GAP: f64 = 0.005;

    pub fn new(fast: usize, slow: usize) -> Self {
        assert!(fast < slow, "SMA fast period must be less than slow period");
        Self { fast, slow }
    }

    pub fn min_bars(&self) -> usize {
        self.slow
    }

    pub fn reading(&self, closes: &[f64]) -> Option<IndicatorReading> {
        if closes.len() < self.slow {
            return None;
        }
        let fast = sma(&closes[closes.len() - self.fast..]);
        let slow = sma(&closes[closes.len() - self.slow..]);
        if slow == 0.0 {
            return None;
        }
        let gap = (fast - slow) / slow;
        let vote = if gap > 0.0 {
            Some(Direction::Buy)
        } else if gap < 0.0 {
            Some(Direction::Sell)
        } else {
            None
        };
        let strength = (gap.abs() / Self::FULL_STRENGTH_GAP).min(1.0);
        Some(IndicatorReading { name: "sma_trend", value: gap, vote, strength })
    }
}

/// Rate-of-change momentum over a trailing period.
#[derive(Debug, Clone)]
pub struct MomentumIndicator {
    pub period: usize,
}

impl MomentumIndicator {
    /// Rate of change treated as full-strength momentum (1%).
    const FULL_STRENGTH_ROC: f64 = 0.01;

    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "momentum period must be >= 1");
        Self { period }
    }

    pub fn min_bars(&self) -> usize {
        self.period + 1
    }

    pub fn reading(&self, closes: &[f64]) -> Option<IndicatorReading> {
        if closes.len() < self.period + 1 {
            return None;
        }
        let latest = *closes.last()?;
        let past = closes[closes.len() - 1 - self.period];
        if past == 0.0 {
            return None;
        }
        let roc = (latest - past) / past;
        let vote = if roc > 0.0 {
            Some(Direction::Buy)
        } else if roc < 0.0 {
            Some(Direction::Sell)
        } else {
            None
        };
        let strength = (roc.abs() / Self::FULL_STRENGTH_ROC).min(1.0);
        Some(IndicatorReading { name: "momentum", value: roc, vote, strength })
    }
}

fn sma(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
