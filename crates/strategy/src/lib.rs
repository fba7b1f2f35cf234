pub mod aggregator;
pub mod indicators;
pub mod scorer;

pub use aggregator::IndicatorAggregator;
pub use scorer::SignalScorer;
