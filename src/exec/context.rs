//! Execution context handed to executors.
//!
//! The context exposes the generation being processed (fence index, shared
//! fence object, the pipe's option store) and a recording API: named scoped
//! timers with nesting depth, and typed debug values. Records are drained
//! after the invocation into the pipe's stats snapshot, where observability
//! tooling picks them up.

use crate::fence::{FenceIndex, FenceObject};
use crate::options::OptionStore;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::sync::Arc;
use std::time::{Duration, Instant};

// =============================================================================
// Debug Records
// =============================================================================

/// A value recorded by an executor for observability tooling.
#[derive(Clone)]
pub enum DebugValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// An arbitrary shared payload for tooling that knows its concrete type.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl std::fmt::Debug for DebugValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "Bool({})", v),
            Self::Int(v) => write!(f, "Int({})", v),
            Self::Float(v) => write!(f, "Float({})", v),
            Self::Text(v) => write!(f, "Text({:?})", v),
            Self::Opaque(_) => write!(f, "Opaque(..)"),
        }
    }
}

impl From<bool> for DebugValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for DebugValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for DebugValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for DebugValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for DebugValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// A completed named timer interval.
#[derive(Clone, Debug)]
pub struct TimerRecord {
    pub name: String,
    /// Nesting depth at the time the timer started (0 = outermost).
    pub depth: usize,
    pub duration: Duration,
}

/// Everything an invocation recorded, drained into the stats snapshot.
#[derive(Clone, Debug, Default)]
pub struct ExecRecords {
    pub timers: Vec<TimerRecord>,
    pub values: Vec<(String, DebugValue)>,
}

// =============================================================================
// Execution Context
// =============================================================================

/// Context passed to each executor invocation.
pub struct ExecContext {
    fence: FenceIndex,
    fence_object: Arc<FenceObject>,
    options: Arc<OptionStore>,
    records: RefCell<ExecRecords>,
    timer_depth: Cell<usize>,
}

impl ExecContext {
    pub(crate) fn new(
        fence: FenceIndex,
        fence_object: Arc<FenceObject>,
        options: Arc<OptionStore>,
    ) -> Self {
        Self {
            fence,
            fence_object,
            options,
            records: RefCell::new(ExecRecords::default()),
            timer_depth: Cell::new(0),
        }
    }

    /// The generation being processed.
    pub fn fence(&self) -> FenceIndex {
        self.fence
    }

    /// The shared per-generation context object.
    pub fn fence_object(&self) -> &Arc<FenceObject> {
        &self.fence_object
    }

    /// The pipe's option store.
    pub fn options(&self) -> &Arc<OptionStore> {
        &self.options
    }

    /// Starts a named timer; the interval is recorded when the guard drops.
    ///
    /// Timers nest: a timer started while another runs records a deeper
    /// depth, letting tooling reconstruct the interval tree.
    pub fn start_timer(&self, name: impl Into<String>) -> TimerGuard<'_> {
        let depth = self.timer_depth.get();
        self.timer_depth.set(depth + 1);
        TimerGuard {
            ctx: self,
            name: name.into(),
            depth,
            started: Instant::now(),
        }
    }

    /// Records a named debug value.
    pub fn store_debug_value(&self, name: impl Into<String>, value: impl Into<DebugValue>) {
        self.records
            .borrow_mut()
            .values
            .push((name.into(), value.into()));
    }

    pub(crate) fn into_records(self) -> ExecRecords {
        self.records.into_inner()
    }

    fn finish_timer(&self, name: String, depth: usize, duration: Duration) {
        self.timer_depth.set(depth);
        self.records.borrow_mut().timers.push(TimerRecord {
            name,
            depth,
            duration,
        });
    }
}

/// Scoped handle returned by [`ExecContext::start_timer`].
///
/// Stops the timer on drop.
pub struct TimerGuard<'a> {
    ctx: &'a ExecContext,
    name: String,
    depth: usize,
    started: Instant,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.ctx.finish_timer(
            std::mem::take(&mut self.name),
            self.depth,
            self.started.elapsed(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ExecContext {
        let options = Arc::new(OptionStore::new());
        let fence_object = Arc::new(FenceObject::new(Arc::clone(&options)));
        ExecContext::new(FenceIndex::FIRST, fence_object, options)
    }

    #[test]
    fn test_debug_values_recorded() {
        let ctx = context();
        ctx.store_debug_value("hits", 3i64);
        ctx.store_debug_value("ratio", 0.75f64);
        ctx.store_debug_value("label", "warm");

        let records = ctx.into_records();
        assert_eq!(records.values.len(), 3);
        assert_eq!(records.values[0].0, "hits");
        assert!(matches!(records.values[0].1, DebugValue::Int(3)));
    }

    #[test]
    fn test_timer_records_on_drop() {
        let ctx = context();
        {
            let _t = ctx.start_timer("total");
        }
        let records = ctx.into_records();
        assert_eq!(records.timers.len(), 1);
        assert_eq!(records.timers[0].name, "total");
        assert_eq!(records.timers[0].depth, 0);
    }

    #[test]
    fn test_timer_nesting_depth() {
        let ctx = context();
        {
            let _outer = ctx.start_timer("outer");
            {
                let _inner = ctx.start_timer("inner");
            }
            {
                let _inner2 = ctx.start_timer("inner2");
            }
        }

        let records = ctx.into_records();
        // Inner timers finish first.
        assert_eq!(records.timers[0].name, "inner");
        assert_eq!(records.timers[0].depth, 1);
        assert_eq!(records.timers[1].name, "inner2");
        assert_eq!(records.timers[1].depth, 1);
        assert_eq!(records.timers[2].name, "outer");
        assert_eq!(records.timers[2].depth, 0);
    }

    #[test]
    fn test_fence_accessors() {
        let ctx = context();
        assert_eq!(ctx.fence(), FenceIndex::FIRST);
        ctx.fence_object().set("frame", 9u64);
        assert_eq!(ctx.fence_object().get::<u64>("frame"), Some(9));
    }
}
