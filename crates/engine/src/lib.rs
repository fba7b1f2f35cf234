pub mod lifecycle;
pub mod runner;
pub mod step;

pub use lifecycle::{BarOutcome, LifecycleManager};
pub use runner::{BarFeed, Runner, RunnerCommand, RunnerHandle};
pub use step::{Engine, EngineEvent};
