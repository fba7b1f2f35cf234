pub mod macd;
pub mod rsi;
pub mod trend;

pub use macd::{MacdIndicator, MacdSignal};
pub use rsi::RsiIndicator;
pub use trend::{MomentumIndicator, SmaTrendIndicator};
