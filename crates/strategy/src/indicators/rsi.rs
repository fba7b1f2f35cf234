use common::{Direction, IndicatorReading};

/// RSI (Relative Strength Index) indicator.
///
/// Uses Wilder's smoothed moving average (same as TradingView / standard RSI).
/// Returns `None` until at least `period + 1` closed price values are available.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    pub period: usize,
    pub overbought: f64,
    pub oversold: f64,
}

impl RsiIndicator {
    pub fn new(period: usize, overbought: f64, oversold: f64) -> Self {
        assert!(period >= 2, "RSI period must be >= 2");
        Self { period, overbought, oversold }
    }

    pub fn min_bars(&self) -> usize {
        self.period + 1
    }

    /// Compute RSI from a slice of close prices (oldest first).
    /// Returns `None` if there are fewer than `period + 1` values.
    pub fn compute(&self, closes: &[f64]) -> Option<f64> {
        if closes.len() < self.period + 1 {
            return None;
        }

        // First average gain/loss over the initial `period` changes
        let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
        let initial = &changes[..self.period];

        let mut avg_gain = initial.iter().filter(|&&c| c > 0.0).sum::<f64>() / self.period as f64;
        let mut avg_loss = initial.iter().filter(|&&c| c < 0.0).map(|c| c.abs()).sum::<f64>()
            / self.period as f64;

        // Wilder smoothing over remaining changes
        for &change in &changes[self.period..] {
            let gain = if change > 0.0 { change } else { 0.0 };
            let loss = if change < 0.0 { change.abs() } else { 0.0 };
            avg_gain = (avg_gain * (self.period - 1) as f64 + gain) / self.period as f64;
            avg_loss = (avg_loss * (self.period - 1) as f64 + loss) / self.period as f64;
        }

        if avg_loss == 0.0 {
            return Some(100.0);
        }

        let rs = avg_gain / avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }

    /// RSI as a directional vote: oversold argues for BUY, overbought for
    /// SELL, strength grows with the distance past the band.
    pub fn reading(&self, closes: &[f64]) -> Option<IndicatorReading> {
        let rsi = self.compute(closes)?;
        let (vote, strength) = if rsi <= self.oversold {
            let depth = ((self.oversold - rsi) / self.oversold).clamp(0.0, 1.0);
            (Some(Direction::Buy), depth)
        } else if rsi >= self.overbought {
            let depth = ((rsi - self.overbought) / (100.0 - self.overbought)).clamp(0.0, 1.0);
            (Some(Direction::Sell), depth)
        } else {
            (None, 0.0)
        };
        Some(IndicatorReading { name: "rsi", value: rsi, vote, strength })
    }
}
