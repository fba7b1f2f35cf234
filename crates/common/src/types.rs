use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One completed candle for a currency pair.
/// Per-pair sequences are expected to carry strictly increasing timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBar {
    pub pair: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

impl PriceBar {
    /// A bar with non-finite or non-positive prices is unusable and the
    /// step that carried it must be skipped.
    pub fn is_well_formed(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|p| p.is_finite() && *p > 0.0)
            && self.low <= self.high
    }
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }

    /// +1 for long, -1 for short. Multiplied into price deltas for P/L.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Buy => 1.0,
            Direction::Sell => -1.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

/// Smallest standard price increment for a pair.
/// JPY-quoted pairs tick in 0.01, everything else in 0.0001.
pub fn pip_size(pair: &str) -> f64 {
    if pair.contains("JPY") {
        0.01
    } else {
        0.0001
    }
}

/// One indicator's contribution to a snapshot: the raw value, the direction
/// it votes for (if any), and a normalized vote strength in [0, 1].
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorReading {
    pub name: &'static str,
    pub value: f64,
    pub vote: Option<Direction>,
    pub strength: f64,
}

/// All indicator readings for one pair at one bar.
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorSnapshot {
    pub pair: String,
    pub timestamp: DateTime<Utc>,
    pub readings: Vec<IndicatorReading>,
}

/// Optional sentiment input supplied by a news collaborator.
/// Absence is valid and treated as zero weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sentiment {
    /// Polarity in [-1, 1]; positive favors BUY.
    pub score: f64,
    pub event_type: String,
    pub source: String,
}

/// Named components that went into a quality score, kept for auditing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreFactors {
    pub agreement: f64,
    pub sentiment: f64,
    pub event_weight: f64,
    pub source_weight: f64,
}

/// A scored trade candidate. Lives for one engine step unless accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalCandidate {
    pub pair: String,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    /// Confluence quality in [0, 1].
    pub quality: f64,
    pub factors: ScoreFactors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Trailing-stop ratchet state. Once armed, the stop only ever tightens.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TrailingState {
    pub armed: bool,
}

/// An open trading position tracked by the lifecycle manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: u64,
    pub pair: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub units: f64,
    pub stop_price: f64,
    pub target_price: f64,
    /// Risk taken at entry: units x distance to the initial stop.
    /// Used to release open-risk on close even after the stop has ratcheted.
    pub entry_risk: f64,
    pub trailing: TrailingState,
    pub status: PositionStatus,
}

/// Why a position left the OPEN state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    TargetHit,
    Timeout,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "STOP_LOSS"),
            ExitReason::TargetHit => write!(f, "TARGET_HIT"),
            ExitReason::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

/// Why the signal filter turned a candidate away.
/// Rejections are expected, frequent outcomes — not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    BelowThreshold,
    DailyCapReached,
    ConcurrencyCapReached,
    DuplicatePairDirection,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::BelowThreshold => write!(f, "below confidence threshold"),
            RejectReason::DailyCapReached => write!(f, "daily trade cap reached"),
            RejectReason::ConcurrencyCapReached => write!(f, "concurrent position cap reached"),
            RejectReason::DuplicatePairDirection => write!(f, "duplicate pair/direction"),
        }
    }
}

/// Immutable record of a completed trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub position: Position,
    pub exit_price: f64,
    pub exit_time: DateTime<Utc>,
    pub reason: ExitReason,
    pub hold_secs: i64,
    /// Realized profit/loss in account currency, direction-aware.
    pub pnl: f64,
    /// Realized move in pips, direction-aware.
    pub pips: f64,
}

/// The single mutable account record. Owned by the engine behind a lock;
/// every open/close mutates it atomically with the cap checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: f64,
    pub initial_balance: f64,
    /// Sum of entry risk across currently open positions.
    pub open_risk: f64,
    pub daily_trades: u32,
    pub current_day: NaiveDate,
}

impl AccountState {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            balance: initial_balance,
            initial_balance,
            open_risk: 0.0,
            daily_trades: 0,
            current_day: NaiveDate::MIN,
        }
    }

    /// Reset the daily trade counter when the UTC day rolls over.
    pub fn roll_day(&mut self, now: DateTime<Utc>) {
        let day = now.date_naive();
        if day != self.current_day {
            self.daily_trades = 0;
            self.current_day = day;
        }
    }

    /// Realized growth relative to the starting balance (1.0 = unchanged).
    pub fn growth(&self) -> f64 {
        if self.initial_balance > 0.0 {
            self.balance / self.initial_balance
        } else {
            1.0
        }
    }

    pub fn record_open(&mut self, entry_risk: f64) {
        self.open_risk += entry_risk;
        self.daily_trades += 1;
    }

    pub fn record_close(&mut self, pnl: f64, entry_risk: f64) {
        self.balance += pnl;
        self.open_risk = (self.open_risk - entry_risk).max(0.0);
    }
}

/// Named trading-hours bucket used for sizing multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Session {
    Sydney,
    Tokyo,
    London,
    NewYork,
    /// London and New York both open — peak liquidity.
    Overlap,
    OffHours,
}

impl Session {
    /// Bucket a UTC timestamp. Overlap wins where London and NY coincide.
    pub fn at(ts: DateTime<Utc>) -> Self {
        use chrono::Timelike;
        match ts.hour() {
            13..=16 => Session::Overlap,
            8..=12 => Session::London,
            17..=20 => Session::NewYork,
            0..=6 => Session::Tokyo,
            21..=23 => Session::Sydney,
            _ => Session::OffHours,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn pip_size_distinguishes_jpy_pairs() {
        assert_eq!(pip_size("USD/JPY"), 0.01);
        assert_eq!(pip_size("EUR/JPY"), 0.01);
        assert_eq!(pip_size("EUR/USD"), 0.0001);
        assert_eq!(pip_size("GBP/USD"), 0.0001);
    }

    #[test]
    fn direction_sign_and_opposite() {
        assert_eq!(Direction::Buy.sign(), 1.0);
        assert_eq!(Direction::Sell.sign(), -1.0);
        assert_eq!(Direction::Buy.opposite(), Direction::Sell);
    }

    #[test]
    fn daily_counter_resets_on_new_day() {
        let mut account = AccountState::new(10_000.0);
        let day1 = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        account.roll_day(day1);
        account.record_open(50.0);
        account.record_open(50.0);
        assert_eq!(account.daily_trades, 2);

        // Same day — no reset
        account.roll_day(Utc.with_ymd_and_hms(2025, 3, 1, 23, 0, 0).unwrap());
        assert_eq!(account.daily_trades, 2);

        // Next day — counter clears
        account.roll_day(Utc.with_ymd_and_hms(2025, 3, 2, 0, 1, 0).unwrap());
        assert_eq!(account.daily_trades, 0);
    }

    #[test]
    fn account_close_releases_risk_and_books_pnl() {
        let mut account = AccountState::new(1_000.0);
        account.record_open(20.0);
        account.record_close(35.0, 20.0);
        assert!((account.balance - 1_035.0).abs() < 1e-9);
        assert_eq!(account.open_risk, 0.0);
        assert!(account.growth() > 1.0);
    }

    #[test]
    fn session_buckets_cover_the_clock() {
        let at = |h| Session::at(Utc.with_ymd_and_hms(2025, 3, 3, h, 30, 0).unwrap());
        assert_eq!(at(3), Session::Tokyo);
        assert_eq!(at(9), Session::London);
        assert_eq!(at(14), Session::Overlap);
        assert_eq!(at(18), Session::NewYork);
        assert_eq!(at(22), Session::Sydney);
        assert_eq!(at(7), Session::OffHours);
    }

    #[test]
    fn malformed_bars_are_detected() {
        let bar = PriceBar {
            pair: "EUR/USD".into(),
            timestamp: Utc::now(),
            open: 1.1,
            high: f64::NAN,
            low: 1.09,
            close: 1.1,
            volume: None,
        };
        assert!(!bar.is_well_formed());
    }
}
