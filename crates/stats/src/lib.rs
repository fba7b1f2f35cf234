pub mod performance;
pub mod reconcile;

pub use performance::{PerformanceSnapshot, PerformanceTracker, ProfitFactor};
pub use reconcile::{reconcile, LedgerEntry, ReconcileReport, TradeRecord};
