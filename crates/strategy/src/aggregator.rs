use std::collections::HashMap;

use tracing::debug;

use common::config::IndicatorConfig;
use common::{IndicatorSnapshot, PriceBar};

use crate::indicators::{MacdIndicator, MomentumIndicator, RsiIndicator, SmaTrendIndicator};

/// Computes one `IndicatorSnapshot` per incoming bar, per pair, from a
/// bounded trailing window of closes.
///
/// Produces nothing until the longest indicator window is satisfied.
/// Indicators are pure functions of the window — no lookahead. Timestamp
/// gaps are tolerated: the window simply holds whatever bars arrived.
pub struct IndicatorAggregator {
    rsi: RsiIndicator,
    macd: MacdIndicator,
    trend: SmaTrendIndicator,
    momentum: MomentumIndicator,
    /// Per-pair rolling window of recent closes.
    history: HashMap<String, Vec<f64>>,
    max_history: usize,
}

impl IndicatorAggregator {
    const DEFAULT_MAX_HISTORY: usize = 200;

    pub fn new(cfg: &IndicatorConfig) -> Self {
        let rsi = RsiIndicator::new(cfg.rsi_period, cfg.rsi_overbought, cfg.rsi_oversold);
        let macd = MacdIndicator::new(cfg.macd_fast, cfg.macd_slow, cfg.macd_signal);
        let trend = SmaTrendIndicator::new(cfg.sma_fast, cfg.sma_slow);
        let momentum = MomentumIndicator::new(cfg.momentum_period);
        let min_bars = rsi
            .min_bars()
            .max(macd.min_bars())
            .max(trend.min_bars())
            .max(momentum.min_bars());
        Self {
            rsi,
            macd,
            trend,
            momentum,
            history: HashMap::new(),
            max_history: Self::DEFAULT_MAX_HISTORY.max(min_bars),
        }
    }

    /// Bars required before the first snapshot can be emitted.
    pub fn min_bars(&self) -> usize {
        self.rsi
            .min_bars()
            .max(self.macd.min_bars())
            .max(self.trend.min_bars())
            .max(self.momentum.min_bars())
    }

    /// Ingest one bar and, once the window is full, emit a snapshot.
    pub fn on_bar(&mut self, bar: &PriceBar) -> Option<IndicatorSnapshot> {
        let min_bars = self.min_bars();
        let history = self.history.entry(bar.pair.clone()).or_default();
        history.push(bar.close);
        if history.len() > self.max_history {
            history.remove(0);
        }

        if history.len() < min_bars {
            debug!(
                pair = %bar.pair,
                bars = history.len(),
                needed = min_bars,
                "Indicator window still filling"
            );
            return None;
        }

        let readings = vec![
            self.rsi.reading(history)?,
            self.macd.reading(history)?,
            self.trend.reading(history)?,
            self.momentum.reading(history)?,
        ];

        Some(IndicatorSnapshot {
            pair: bar.pair.clone(),
            timestamp: bar.timestamp,
            readings,
        })
    }
}
