use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Session;

/// Top-level engine config file (TOML).
///
/// Example `config/pipcore.toml`:
/// ```toml
/// pairs = ["EUR/USD", "GBP/USD", "USD/JPY"]
/// initial_balance = 10000.0
/// hedging = false
///
/// [signal]
/// min_confidence = 0.55
///
/// [risk]
/// max_daily_trades = 12
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub pairs: Vec<String>,
    pub initial_balance: f64,
    /// Allow simultaneous BUY and SELL positions on the same pair.
    #[serde(default)]
    pub hedging: bool,
    #[serde(default)]
    pub indicators: IndicatorConfig,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub exits: ExitConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Trailing window lengths for each indicator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub sma_fast: usize,
    pub sma_slow: usize,
    pub momentum_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            sma_fast: 10,
            sma_slow: 50,
            momentum_period: 10,
        }
    }
}

/// Scorer weights and the filter's confidence threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Minimum quality a candidate must reach to pass the filter.
    pub min_confidence: f64,
    /// Weight of normalized indicator agreement in the quality score.
    pub tech_weight: f64,
    /// Weight of sentiment magnitude in the quality score.
    pub sentiment_weight: f64,
    /// Multiplier per news event type; unknown types default to 1.0.
    pub event_weights: HashMap<String, f64>,
    /// Multiplier per news source credibility; unknown sources default to 1.0.
    pub source_weights: HashMap<String, f64>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.55,
            tech_weight: 0.6,
            sentiment_weight: 0.4,
            event_weights: HashMap::new(),
            source_weights: HashMap::new(),
        }
    }
}

/// Sizing parameters and the hard caps the filter enforces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Fraction of balance risked by the base position size.
    pub base_risk_fraction: f64,
    /// Hard per-trade risk ceiling. The final size clamp; dominates all
    /// multipliers.
    pub max_risk_fraction: f64,
    pub max_concurrent: usize,
    pub max_daily_trades: u32,
    /// Broker unit bounds.
    pub min_units: f64,
    pub max_units: f64,
    /// Quality multiplier range: quality 0 maps to min, 1 to max.
    pub quality_mult_min: f64,
    pub quality_mult_max: f64,
    /// Compound-growth multiplier bounds applied to balance / initial.
    pub compound_floor: f64,
    pub compound_cap: f64,
    pub session_multipliers: SessionMultipliers,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            base_risk_fraction: 0.01,
            max_risk_fraction: 0.02,
            max_concurrent: 5,
            max_daily_trades: 12,
            min_units: 1_000.0,
            max_units: 100_000.0,
            quality_mult_min: 0.5,
            quality_mult_max: 1.5,
            compound_floor: 0.5,
            compound_cap: 2.0,
            session_multipliers: SessionMultipliers::default(),
        }
    }
}

/// Sizing multiplier per trading session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionMultipliers {
    pub sydney: f64,
    pub tokyo: f64,
    pub london: f64,
    pub new_york: f64,
    pub overlap: f64,
    pub off_hours: f64,
}

impl Default for SessionMultipliers {
    fn default() -> Self {
        Self {
            sydney: 0.8,
            tokyo: 0.9,
            london: 1.1,
            new_york: 1.1,
            overlap: 1.2,
            off_hours: 0.8,
        }
    }
}

impl SessionMultipliers {
    pub fn get(&self, session: Session) -> f64 {
        match session {
            Session::Sydney => self.sydney,
            Session::Tokyo => self.tokyo,
            Session::London => self.london,
            Session::NewYork => self.new_york,
            Session::Overlap => self.overlap,
            Session::OffHours => self.off_hours,
        }
    }
}

/// Exit-policy parameters for the position lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitConfig {
    /// Stop distance as a fraction of entry price.
    pub stop_pct: f64,
    /// Target distance as a fraction of entry price.
    pub target_pct: f64,
    /// Widens or narrows both distances together.
    pub volatility_mult: f64,
    /// Fraction of the distance-to-target that arms the trailing ratchet.
    pub trail_trigger: f64,
    /// Fraction of the favorable excursion locked in by the ratchet.
    pub trail_lock: f64,
    pub timeout_hours: i64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            stop_pct: 0.03,
            target_pct: 0.05,
            volatility_mult: 1.0,
            trail_trigger: 0.5,
            trail_lock: 0.5,
            timeout_hours: 48,
        }
    }
}

/// Tolerances for matching internal records against the broker ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub time_window_secs: i64,
    /// Allowed relative unit mismatch, e.g. 0.05 = 5%.
    pub unit_tolerance: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            time_window_secs: 300,
            unit_tolerance: 0.05,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let cfg: EngineConfig = toml::from_str(&content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Fail-fast startup validation. Rejects configs that could open a
    /// position under broken constraints.
    pub fn validate(&self) -> Result<()> {
        fn fail(msg: impl Into<String>) -> Result<()> {
            Err(Error::Config(msg.into()))
        }

        if self.pairs.is_empty() {
            return fail("at least one pair is required");
        }
        if self.initial_balance <= 0.0 {
            return fail("initial_balance must be positive");
        }
        if !(0.0..=1.0).contains(&self.signal.min_confidence) {
            return fail("signal.min_confidence must be in [0, 1]");
        }
        let r = &self.risk;
        if r.base_risk_fraction <= 0.0 || r.base_risk_fraction > 1.0 {
            return fail("risk.base_risk_fraction must be in (0, 1]");
        }
        if r.max_risk_fraction <= 0.0 || r.max_risk_fraction > 1.0 {
            return fail("risk.max_risk_fraction must be in (0, 1]");
        }
        if r.max_concurrent == 0 {
            return fail("risk.max_concurrent must be at least 1");
        }
        if r.max_daily_trades == 0 {
            return fail("risk.max_daily_trades must be at least 1");
        }
        if r.min_units <= 0.0 || r.max_units < r.min_units {
            return fail("risk unit bounds must satisfy 0 < min_units <= max_units");
        }
        if r.quality_mult_min <= 0.0 || r.quality_mult_max < r.quality_mult_min {
            return fail("risk quality multiplier range is inverted");
        }
        if r.compound_floor <= 0.0 || r.compound_cap < r.compound_floor {
            return fail("risk compound multiplier bounds are inverted");
        }
        let e = &self.exits;
        if e.stop_pct <= 0.0 || e.target_pct <= 0.0 {
            return fail("exits.stop_pct and exits.target_pct must be positive");
        }
        if e.volatility_mult <= 0.0 {
            return fail("exits.volatility_mult must be positive");
        }
        if !(0.0..=1.0).contains(&e.trail_trigger) || !(0.0..=1.0).contains(&e.trail_lock) {
            return fail("exits trailing fractions must be in [0, 1]");
        }
        if e.timeout_hours <= 0 {
            return fail("exits.timeout_hours must be positive");
        }
        let i = &self.indicators;
        if i.rsi_period < 2 {
            return fail("indicators.rsi_period must be >= 2");
        }
        if i.macd_fast >= i.macd_slow {
            return fail("indicators.macd_fast must be less than macd_slow");
        }
        if i.sma_fast >= i.sma_slow {
            return fail("indicators.sma_fast must be less than sma_slow");
        }
        if i.momentum_period == 0 {
            return fail("indicators.momentum_period must be >= 1");
        }
        let rc = &self.reconcile;
        if rc.time_window_secs < 0 || rc.unit_tolerance < 0.0 {
            return fail("reconcile tolerances must be non-negative");
        }
        Ok(())
    }
}
