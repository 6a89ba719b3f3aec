//! Telemetry for pipeline execution observability.
//!
//! The runtime emits structured events via a sink abstraction and does not
//! know how they are consumed. This follows the "emit, don't present"
//! pattern: external tooling (dashboards, log pipelines) subscribes by
//! installing a sink on the pipeline; the engine never formats or
//! aggregates.
//!
//! # Example
//!
//! ```ignore
//! use fenceflow::telemetry::{TelemetryEvent, TelemetrySink};
//!
//! struct CountingSink(std::sync::atomic::AtomicU64);
//!
//! impl TelemetrySink for CountingSink {
//!     fn emit(&self, _event: TelemetryEvent) {
//!         self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!     }
//! }
//! ```

use crate::error::Severity;
use crate::fence::FenceIndex;
use crate::pipeline::PipeId;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Telemetry Events
// =============================================================================

/// Events emitted during pipeline execution.
#[derive(Clone, Debug)]
pub enum TelemetryEvent {
    /// A pipe was launched with its executor pool.
    PipeLaunched {
        pipe: PipeId,
        name: Arc<str>,
        executors: usize,
    },

    /// A new generation was admitted at the front pipe.
    FenceSupplied { pipe: PipeId, fence: FenceIndex },

    /// An executor slot began processing a generation.
    ExecStarted {
        pipe: PipeId,
        fence: FenceIndex,
        slot: usize,
    },

    /// An executor slot finished processing a generation.
    ExecCompleted {
        pipe: PipeId,
        fence: FenceIndex,
        slot: usize,
        severity: Severity,
        duration: Duration,
    },

    /// An output was accepted by a downstream pipe.
    OutputDelivered {
        from: PipeId,
        to: PipeId,
        fence: FenceIndex,
    },

    /// An output was dropped because the downstream generation had passed.
    OutputDropped {
        from: PipeId,
        to: PipeId,
        fence: FenceIndex,
    },

    /// A pipe invalidated a generation without producing output.
    FenceAborted { pipe: PipeId, fence: FenceIndex },
}

impl TelemetryEvent {
    /// Returns the pipe this event originated at.
    pub fn pipe(&self) -> PipeId {
        match self {
            Self::PipeLaunched { pipe, .. }
            | Self::FenceSupplied { pipe, .. }
            | Self::ExecStarted { pipe, .. }
            | Self::ExecCompleted { pipe, .. }
            | Self::FenceAborted { pipe, .. } => *pipe,
            Self::OutputDelivered { from, .. } | Self::OutputDropped { from, .. } => *from,
        }
    }
}

// =============================================================================
// Telemetry Sinks
// =============================================================================

/// Consumer of [`TelemetryEvent`]s.
///
/// Implementations must be cheap and non-blocking; they are called from the
/// runtime's hot paths.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// Sink that discards all events. The default.
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// Sink that forwards events to `tracing` at debug level.
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn emit(&self, event: TelemetryEvent) {
        tracing::debug!(?event, "pipeline event");
    }
}

/// Sink that fans events out to several sinks.
pub struct MultiplexTelemetrySink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl MultiplexTelemetrySink {
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }
}

impl TelemetrySink for MultiplexTelemetrySink {
    fn emit(&self, event: TelemetryEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
