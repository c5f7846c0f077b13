mod interval;
mod runner;

pub use interval::{IntervalTaskRunner, TokioScheduler};
pub use runner::*;
