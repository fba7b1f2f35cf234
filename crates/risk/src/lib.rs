pub mod filter;
pub mod sizer;

pub use filter::{FilterDecision, FilterStats, SignalFilter};
pub use sizer::PositionSizer;
