//! fenceflow: a typed data-flow execution engine.
//!
//! A pipeline is a directed acyclic graph of processing stages ("pipes"),
//! each backed by a pool of interchangeable executors, connected by typed
//! output-to-input adapters. Every unit of work admitted into the graph is
//! versioned by a monotonically increasing *fence* (generation) index and
//! carries a shared per-generation context object.
//!
//! # Architecture
//!
//! ```text
//! supply → [front pipe] → adapter → [pipe] → adapter → [pipe] → handlers
//!              │ N executors          │ N executors       │
//!              └─ fence admission ────┴─ round-robin ─────┴─ abort
//!                 (input slot)           output turns        propagation
//! ```
//!
//! Each pipe assembles a complete input from all upstream links before
//! dispatching it to an idle executor. Executors run fully in parallel;
//! a round-robin output turn keeps downstream delivery in launch order.
//! A generation can be aborted at any pipe, which propagates forward so
//! downstream pipes never stall waiting for data that will not arrive.
//!
//! # Example
//!
//! ```ignore
//! use fenceflow::{ExecContext, Executor, Pipeline, Severity};
//!
//! #[derive(Default)]
//! struct AddOne;
//!
//! impl Executor for AddOne {
//!     type Input = i64;
//!     type Output = i64;
//!
//!     fn invoke(&mut self, _ctx: &mut ExecContext, input: &i64, output: &mut i64) -> Severity {
//!         *output = input + 1;
//!         Severity::Ok
//!     }
//! }
//!
//! # async fn run() -> Result<(), fenceflow::ProtocolError> {
//! let pipeline = Pipeline::new();
//! let first = pipeline.add_pipe::<AddOne>("first");
//! let second = pipeline.add_pipe::<AddOne>("second");
//! pipeline.connect(&first, &second, |_fence, out, input| *input = *out)?;
//! second.add_output_handler(|fence, _severity, value| {
//!     println!("fence {fence}: {value}");
//! });
//!
//! first.launch(2, || AddOne)?;
//! second.launch(1, || AddOne)?;
//!
//! let front = pipeline.front_proxy::<AddOne>()?;
//! front.supply(41)?;
//! pipeline.sync().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod exec;
pub mod fence;
pub mod logging;
pub mod options;
pub mod pipe;
pub mod pipeline;
pub mod telemetry;

mod inflight;

pub use config::EngineConfig;
pub use error::{ProtocolError, Severity};
pub use exec::{DebugValue, ExecContext, ExecRecords, Executor, TimerGuard, TimerRecord};
pub use fence::{FenceIndex, FenceObject};
pub use options::{OptionStore, OptionValue};
pub use pipe::{Pipe, PipeProxy, PipeStats, SubmitOutcome};
pub use pipeline::{FrontProxy, PipeId, Pipeline, PipelineProxy};
pub use telemetry::{
    MultiplexTelemetrySink, NullTelemetrySink, TelemetryEvent, TelemetrySink,
    TracingTelemetrySink,
};

/// Version of the fenceflow library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
