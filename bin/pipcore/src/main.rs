use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{EngineConfig, PriceBar};
use engine::{BarFeed, Engine, EngineEvent, Runner};
use stats::PerformanceTracker;

/// Reads one JSON-encoded `PriceBar` per line from stdin. Unparseable
/// lines are logged and skipped, not fatal.
struct JsonLineFeed {
    lines: Lines<BufReader<Stdin>>,
}

impl JsonLineFeed {
    fn stdin() -> Self {
        Self { lines: BufReader::new(tokio::io::stdin()).lines() }
    }
}

#[async_trait]
impl BarFeed for JsonLineFeed {
    async fn next_bar(&mut self) -> Option<PriceBar> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<PriceBar>(line) {
                        Ok(bar) => return Some(bar),
                        Err(err) => warn!(%err, "Skipping unparseable bar line"),
                    }
                }
                Ok(None) => return None,
                Err(err) => {
                    warn!(%err, "Stdin read failed; closing feed");
                    return None;
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PIPCORE_CONFIG").ok())
        .unwrap_or_else(|| "config/pipcore.toml".to_string());
    let cfg = EngineConfig::load(&config_path)
        .with_context(|| format!("loading config from {config_path}"))?;
    info!(config = %config_path, pairs = ?cfg.pairs, "PipCore starting");

    // ── Engine ────────────────────────────────────────────────────────────────
    let engine = Arc::new(Engine::new(cfg)?);

    // ── Runner + event sink ───────────────────────────────────────────────────
    let runner = Runner::new(Arc::clone(&engine), Duration::from_secs(60));
    let handle = runner.spawn(JsonLineFeed::stdin());
    let mut events = handle.subscribe();

    let tracker_task = tokio::spawn(async move {
        let mut tracker = PerformanceTracker::new();
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let EngineEvent::PositionClosed(trade) = &event {
                        tracker.record(trade);
                    }
                    match serde_json::to_string(&event) {
                        Ok(line) => println!("{line}"),
                        Err(err) => warn!(%err, "Failed to serialize event"),
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(dropped = n, "Event consumer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
        tracker
    });

    // ── Shutdown: feed exhaustion or Ctrl-C, whichever first ──────────────────
    tokio::select! {
        _ = handle.join() => info!("Feed drained"),
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
    }

    let tracker = tracker_task.await?;
    let snapshot = tracker.snapshot();
    let stats = engine.filter_stats();
    info!(
        trades = snapshot.overall.trades,
        win_rate = snapshot.win_rate,
        profit_factor = %snapshot.profit_factor,
        expectancy = snapshot.expectancy,
        generated = stats.generated,
        executed = stats.executed,
        rejected = stats.rejected(),
        balance = engine.account().balance,
        "Run complete"
    );
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
