use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use common::PriceBar;

use crate::step::{Engine, EngineEvent};

/// Source of bars for the runner. Live feeds, replay files, and test
/// fixtures all plug in here.
#[async_trait]
pub trait BarFeed: Send {
    /// Next bar, or `None` when the feed is exhausted.
    async fn next_bar(&mut self) -> Option<PriceBar>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerCommand {
    Stop,
}

/// Handle to a spawned runner: event subscription plus shutdown.
pub struct RunnerHandle {
    commands: mpsc::Sender<RunnerCommand>,
    events: broadcast::Sender<EngineEvent>,
    task: JoinHandle<()>,
}

impl RunnerHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Request a stop. The runner finishes the step in flight, so no bar is
    /// ever half-applied.
    pub async fn stop(self) {
        if self.commands.send(RunnerCommand::Stop).await.is_err() {
            // Runner already exited on its own
        }
        if let Err(err) = self.task.await {
            error!(?err, "Runner task panicked");
        }
    }

    pub async fn join(self) {
        if let Err(err) = self.task.await {
            error!(?err, "Runner task panicked");
        }
    }
}

/// Drives the deterministic engine from an async bar feed.
///
/// The engine itself never waits on the network; all scheduling concerns —
/// feed timeouts, shutdown, event fan-out — live here.
pub struct Runner {
    engine: Arc<Engine>,
    /// How long to wait for a bar before logging a data gap.
    feed_timeout: Duration,
}

const EVENT_CHANNEL_CAPACITY: usize = 256;
/// Consecutive feed timeouts before a gap is escalated from warn to error.
const GAP_ESCALATION: u32 = 3;

impl Runner {
    pub fn new(engine: Arc<Engine>, feed_timeout: Duration) -> Self {
        Self { engine, feed_timeout }
    }

    /// Spawn the run loop. Events from every step are broadcast to all
    /// subscribers; a lagging subscriber drops old events, never blocks the
    /// loop.
    pub fn spawn<F>(self, mut feed: F) -> RunnerHandle
    where
        F: BarFeed + 'static,
    {
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<RunnerCommand>(8);
        let (event_tx, _) = broadcast::channel::<EngineEvent>(EVENT_CHANNEL_CAPACITY);
        let events = event_tx.clone();
        let engine = self.engine;
        let feed_timeout = self.feed_timeout;

        let task = tokio::spawn(async move {
            let mut consecutive_gaps: u32 = 0;
            loop {
                // biased: a pending stop always wins over the next bar, so
                // shutdown latency is bounded by one step.
                tokio::select! {
                    biased;

                    cmd = cmd_rx.recv() => {
                        match cmd {
                            Some(RunnerCommand::Stop) | None => {
                                info!("Runner stopping");
                                break;
                            }
                        }
                    }

                    next = tokio::time::timeout(feed_timeout, feed.next_bar()) => {
                        match next {
                            Ok(Some(bar)) => {
                                consecutive_gaps = 0;
                                for event in engine.advance(&bar) {
                                    // Err just means nobody is subscribed
                                    let _ = event_tx.send(event);
                                }
                            }
                            Ok(None) => {
                                info!("Bar feed exhausted; runner exiting");
                                break;
                            }
                            Err(_) => {
                                consecutive_gaps += 1;
                                if consecutive_gaps >= GAP_ESCALATION {
                                    error!(
                                        gaps = consecutive_gaps,
                                        timeout_secs = feed_timeout.as_secs(),
                                        "Sustained data gap — feed unavailable"
                                    );
                                } else {
                                    warn!(
                                        timeout_secs = feed_timeout.as_secs(),
                                        "No bar within timeout — data gap"
                                    );
                                }
                            }
                        }
                    }
                }
            }
        });

        RunnerHandle { commands: cmd_tx, events, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use common::EngineConfig;

    struct VecFeed {
        bars: std::vec::IntoIter<PriceBar>,
    }

    #[async_trait]
    impl BarFeed for VecFeed {
        async fn next_bar(&mut self) -> Option<PriceBar> {
            self.bars.next()
        }
    }

    /// Yields nothing until dropped; exercises the stop path.
    struct PendingFeed;

    #[async_trait]
    impl BarFeed for PendingFeed {
        async fn next_bar(&mut self) -> Option<PriceBar> {
            std::future::pending().await
        }
    }

    fn bars(n: usize) -> Vec<PriceBar> {
        let start = Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| PriceBar {
                pair: "EUR/USD".into(),
                timestamp: start + ChronoDuration::hours(i as i64),
                open: 1.10,
                high: 1.101,
                low: 1.099,
                close: 1.10,
                volume: None,
            })
            .collect()
    }

    fn engine() -> Arc<Engine> {
        let cfg = EngineConfig {
            pairs: vec!["EUR/USD".into()],
            initial_balance: 10_000.0,
            hedging: false,
            indicators: Default::default(),
            signal: Default::default(),
            risk: Default::default(),
            exits: Default::default(),
            reconcile: Default::default(),
        };
        Arc::new(Engine::new(cfg).unwrap())
    }

    #[tokio::test]
    async fn runner_drains_a_finite_feed_and_exits() {
        let engine = engine();
        let runner = Runner::new(Arc::clone(&engine), Duration::from_secs(5));
        let handle = runner.spawn(VecFeed { bars: bars(10).into_iter() });
        handle.join().await;
        // All ten bars were applied in order
        let stats = engine.filter_stats();
        assert_eq!(stats.executed, 0, "flat bars must not open positions");
    }

    #[tokio::test]
    async fn stop_interrupts_a_stalled_feed() {
        let engine = engine();
        let runner = Runner::new(engine, Duration::from_secs(30));
        let handle = runner.spawn(PendingFeed);
        // Must return promptly even though the feed never yields
        tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .expect("stop should not hang on a stalled feed");
    }
}
