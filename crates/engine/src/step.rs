use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use common::{
    AccountState, ClosedTrade, EngineConfig, ExitReason, Position, PriceBar, RejectReason,
    Result, Sentiment, Session, SignalCandidate,
};
use risk::{FilterDecision, FilterStats, PositionSizer, SignalFilter};
use strategy::{IndicatorAggregator, SignalScorer};

use crate::lifecycle::{BarOutcome, LifecycleManager};

/// Everything a step can emit, in the order it happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    SignalRejected {
        candidate: SignalCandidate,
        reason: RejectReason,
    },
    PositionOpened(Position),
    StopAdjusted {
        position_id: u64,
        pair: String,
        from: f64,
        to: f64,
    },
    PositionClosed(ClosedTrade),
}

/// Indicator-side state, advanced per pair.
struct FeedState {
    aggregator: IndicatorAggregator,
    last_seen: HashMap<String, DateTime<Utc>>,
}

/// Account-side state. One lock guards the whole record so every
/// check-then-act sequence (caps, duplicate check, open, close) is atomic
/// as a unit — parallel pair advances cannot race it.
struct Book {
    account: AccountState,
    open: Vec<Position>,
    stats: FilterStats,
    next_id: u64,
}

/// The deterministic decision core: one call to `advance` per arriving bar.
///
/// Pull-based by design — an external scheduler (the tokio runner, a
/// backtest loop, a test) feeds bars in; no step ever observes data from a
/// later step. Replaying an identical bar sequence through a fresh engine
/// with identical configuration yields identical closed trades.
pub struct Engine {
    cfg: EngineConfig,
    scorer: SignalScorer,
    filter: SignalFilter,
    sizer: PositionSizer,
    lifecycle: LifecycleManager,
    feed: Mutex<FeedState>,
    book: Mutex<Book>,
}

impl Engine {
    /// Build an engine. Fails fast on configuration errors, before any
    /// position can be opened.
    pub fn new(cfg: EngineConfig) -> Result<Self> {
        cfg.validate()?;
        let scorer = SignalScorer::new(cfg.signal.clone());
        let filter = SignalFilter::new(
            cfg.signal.min_confidence,
            cfg.risk.max_daily_trades,
            cfg.risk.max_concurrent,
            cfg.hedging,
        );
        let sizer = PositionSizer::new(cfg.risk.clone());
        let lifecycle = LifecycleManager::new(cfg.exits.clone());
        let feed = Mutex::new(FeedState {
            aggregator: IndicatorAggregator::new(&cfg.indicators),
            last_seen: HashMap::new(),
        });
        let book = Mutex::new(Book {
            account: AccountState::new(cfg.initial_balance),
            open: Vec::new(),
            stats: FilterStats::default(),
            next_id: 1,
        });
        Ok(Self { cfg, scorer, filter, sizer, lifecycle, feed, book })
    }

    /// Advance one step with no sentiment input.
    pub fn advance(&self, bar: &PriceBar) -> Vec<EngineEvent> {
        self.advance_with_sentiment(bar, None)
    }

    /// Advance one step. Data errors skip the step for the affected pair —
    /// logged, never fatal. Exit evaluation for pairs without a bar this
    /// step is simply not performed; it resumes on their next bar.
    pub fn advance_with_sentiment(
        &self,
        bar: &PriceBar,
        sentiment: Option<&Sentiment>,
    ) -> Vec<EngineEvent> {
        if !bar.is_well_formed() {
            warn!(pair = %bar.pair, "Malformed bar — skipping step");
            return Vec::new();
        }
        if !self.cfg.pairs.iter().any(|p| p == &bar.pair) {
            warn!(pair = %bar.pair, "Bar for unwatched pair — skipping step");
            return Vec::new();
        }

        // Indicator phase. The ordering check and window update happen
        // under the feed lock; a stale bar never reaches the book.
        let snapshot = {
            let mut feed = lock(&self.feed);
            if let Some(last) = feed.last_seen.get(&bar.pair) {
                if bar.timestamp <= *last {
                    warn!(
                        pair = %bar.pair,
                        ts = %bar.timestamp,
                        last = %last,
                        "Out-of-order bar — skipping step"
                    );
                    return Vec::new();
                }
            }
            feed.last_seen.insert(bar.pair.clone(), bar.timestamp);
            feed.aggregator.on_bar(bar)
        };

        let mut events = Vec::new();
        let mut book = lock(&self.book);
        book.account.roll_day(bar.timestamp);

        self.evaluate_exits(&mut book, bar, &mut events);

        if let Some(snapshot) = snapshot {
            if let Some(candidate) = self.scorer.score(&snapshot, sentiment) {
                self.consider_entry(&mut book, bar, candidate, &mut events);
            }
        }

        events
    }

    /// Run exit evaluation for every open position on this bar's pair.
    /// Every position leaving OPEN produces exactly one ClosedTrade.
    fn evaluate_exits(&self, book: &mut Book, bar: &PriceBar, events: &mut Vec<EngineEvent>) {
        let mut exits: HashMap<u64, (f64, ExitReason)> = HashMap::new();
        for position in book.open.iter_mut().filter(|p| p.pair == bar.pair) {
            match self.lifecycle.on_bar(position, bar) {
                BarOutcome::Exit { price, reason } => {
                    exits.insert(position.id, (price, reason));
                }
                BarOutcome::StopAdjusted { from, to } => {
                    events.push(EngineEvent::StopAdjusted {
                        position_id: position.id,
                        pair: position.pair.clone(),
                        from,
                        to,
                    });
                }
                BarOutcome::Hold => {}
            }
        }
        if exits.is_empty() {
            return;
        }

        let mut still_open = Vec::with_capacity(book.open.len());
        for position in book.open.drain(..) {
            match exits.get(&position.id) {
                Some(&(price, reason)) => {
                    let trade = self.lifecycle.close(position, price, bar.timestamp, reason);
                    book.account.record_close(trade.pnl, trade.position.entry_risk);
                    info!(
                        pair = %trade.position.pair,
                        id = trade.position.id,
                        reason = %trade.reason,
                        pnl = trade.pnl,
                        pips = trade.pips,
                        balance = book.account.balance,
                        "Position closed"
                    );
                    events.push(EngineEvent::PositionClosed(trade));
                }
                None => still_open.push(position),
            }
        }
        book.open = still_open;
    }

    /// Filter, size, and open — one atomic sequence under the book lock.
    fn consider_entry(
        &self,
        book: &mut Book,
        bar: &PriceBar,
        candidate: SignalCandidate,
        events: &mut Vec<EngineEvent>,
    ) {
        book.stats.generated += 1;

        match self.filter.evaluate(&candidate, &book.account, &book.open) {
            FilterDecision::Reject(reason) => {
                book.stats.record_rejection(reason);
                events.push(EngineEvent::SignalRejected { candidate, reason });
            }
            FilterDecision::Accept => {
                let stop_distance = self.lifecycle.stop_distance(bar.close);
                let session = Session::at(bar.timestamp);
                match self.sizer.units(&candidate, &book.account, stop_distance, session) {
                    Some(units) => {
                        let id = book.next_id;
                        book.next_id += 1;
                        let position =
                            self.lifecycle.open(&candidate, units, bar.close, bar.timestamp, id);
                        book.account.record_open(position.entry_risk);
                        info!(
                            pair = %position.pair,
                            id = position.id,
                            direction = %position.direction,
                            units = position.units,
                            entry = position.entry_price,
                            stop = position.stop_price,
                            target = position.target_price,
                            quality = candidate.quality,
                            "Position opened"
                        );
                        book.stats.executed += 1;
                        book.open.push(position.clone());
                        events.push(EngineEvent::PositionOpened(position));
                    }
                    None => {
                        warn!(
                            pair = %candidate.pair,
                            quality = candidate.quality,
                            "Accepted candidate could not be sized within risk bounds"
                        );
                    }
                }
            }
        }
    }

    pub fn account(&self) -> AccountState {
        lock(&self.book).account.clone()
    }

    pub fn open_positions(&self) -> Vec<Position> {
        lock(&self.book).open.clone()
    }

    pub fn filter_stats(&self) -> FilterStats {
        lock(&self.book).stats
    }
}

/// Take a guard even if a previous holder panicked; the book stays usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
