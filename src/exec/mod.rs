//! The executor contract and its invocation context.

mod context;
mod executor;

pub use context::{DebugValue, ExecContext, ExecRecords, TimerGuard, TimerRecord};
pub use executor::Executor;
