use common::{Direction, IndicatorReading};

/// MACD (Moving Average Convergence/Divergence) indicator.
///
/// Computes: MACD line = EMA(fast) - EMA(slow), Signal = EMA(macd_line, signal_period).
/// Votes on crossover events of the MACD line against the signal line.
#[derive(Debug, Clone)]
pub struct MacdIndicator {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

/// The result of a MACD computation.
#[derive(Debug, Clone, PartialEq)]
pub enum MacdSignal {
    Bullish, // MACD crossed above signal line
    Bearish, // MACD crossed below signal line
    Neutral, // No crossover on the latest bar
}

impl MacdIndicator {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast < slow, "MACD fast period must be less than slow period");
        Self { fast, slow, signal }
    }

    pub fn min_bars(&self) -> usize {
        self.slow + self.signal
    }

    /// Compute the crossover state and latest histogram value from a slice
    /// of close prices (oldest first). Returns `None` without enough data.
    pub fn compute(&self, closes: &[f64]) -> Option<(MacdSignal, f64)> {
        if closes.len() < self.min_bars() {
            return None;
        }

        // Compute MACD line for the last `signal + 1` bars (need prev + current)
        let macd_series_len = self.signal + 1;
        let start = closes.len().saturating_sub(self.slow + macd_series_len - 1);
        let window = &closes[start..];

        let macd_line: Vec<f64> = (self.slow - 1..window.len())
            .map(|i| {
                let slice = &window[..=i];
                ema(slice, self.fast) - ema(slice, self.slow)
            })
            .collect();

        if macd_line.len() < self.signal + 1 {
            return None;
        }

        let signal_line: Vec<f64> = (self.signal - 1..macd_line.len())
            .map(|i| ema(&macd_line[..=i], self.signal))
            .collect();

        if signal_line.len() < 2 {
            return None;
        }

        let n = signal_line.len();
        let prev_macd = macd_line[macd_line.len() - 2];
        let curr_macd = *macd_line.last()?;
        let prev_sig = signal_line[n - 2];
        let curr_sig = signal_line[n - 1];
        let histogram = curr_macd - curr_sig;

        let state = if prev_macd <= prev_sig && curr_macd > curr_sig {
            MacdSignal::Bullish
        } else if prev_macd >= prev_sig && curr_macd < curr_sig {
            MacdSignal::Bearish
        } else {
            MacdSignal::Neutral
        };
        Some((state, histogram))
    }

    /// MACD as a directional vote: crossovers vote at full strength, a
    /// quiet histogram abstains.
    pub fn reading(&self, closes: &[f64]) -> Option<IndicatorReading> {
        let (state, histogram) = self.compute(closes)?;
        let (vote, strength) = match state {
            MacdSignal::Bullish => (Some(Direction::Buy), 1.0),
            MacdSignal::Bearish => (Some(Direction::Sell), 1.0),
            MacdSignal::Neutral => (None, 0.0),
        };
        Some(IndicatorReading { name: "macd", value: histogram, vote, strength })
    }
}

/// Exponential Moving Average of the last `period` values in `data`.
fn ema(data: &[f64], period: usize) -> f64 {
    if data.is_empty() || period == 0 {
        return 0.0;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let start = data.len().saturating_sub(period * 3); // enough history
    let slice = &data[start..];

    // Seed with SMA of first `period` values
    let seed_len = period.min(slice.len());
    let mut ema_val: f64 = slice[..seed_len].iter().sum::<f64>() / seed_len as f64;

    for &price in &slice[seed_len..] {
        ema_val = price * k + ema_val * (1.0 - k);
    }
    ema_val
}
