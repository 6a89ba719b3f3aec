//! Pipes: the stages of the data-flow graph.
//!
//! A pipe owns one input slot, a pool of executor slots, and its links. The
//! [`Pipe`] handle is what `Pipeline::add_pipe` returns; construction-time
//! operations (linking, launching, handlers) go through it, runtime
//! observation goes through the weak [`PipeProxy`].

mod core;
mod exec_slot;
mod input_slot;
mod link;
mod proxy;
mod runtime;

pub use self::core::{OutputHandler, PipeStats};
pub use link::{LinkAdapter, SubmitOutcome};
pub use proxy::PipeProxy;

pub(crate) use self::core::{AnyPipe, PipeCore};
pub(crate) use link::AdaptedPort;

use crate::error::{ProtocolError, Severity};
use crate::exec::Executor;
use crate::fence::FenceIndex;
use crate::options::OptionStore;
use crate::pipeline::{PipeId, PipelineCore};
use std::sync::{Arc, Weak};

/// Owning handle to a pipe, returned by `Pipeline::add_pipe`.
///
/// Cloneable; all clones refer to the same pipe. Dropping every handle does
/// not destroy the pipe; the pipeline owns it.
pub struct Pipe<E: Executor> {
    pub(crate) core: Arc<PipeCore<E>>,
    pub(crate) pipeline: Weak<PipelineCore>,
}

impl<E: Executor> Pipe<E> {
    pub fn id(&self) -> PipeId {
        self.core.id()
    }

    pub fn name(&self) -> &str {
        self.core.name().as_ref()
    }

    /// Whether this pipe may skip generations.
    pub fn is_optional(&self) -> bool {
        self.core.is_optional()
    }

    pub fn is_launched(&self) -> bool {
        self.core.is_launched()
    }

    /// Number of executor slots (0 before launch).
    pub fn executor_count(&self) -> usize {
        self.core.executor_count()
    }

    /// Number of upstream links.
    pub fn input_link_count(&self) -> usize {
        self.core.input_link_count()
    }

    /// The pipe's option store.
    pub fn options(&self) -> &Arc<OptionStore> {
        self.core.options()
    }

    /// Latest execution snapshot.
    pub fn stats(&self) -> PipeStats {
        self.core.stats()
    }

    /// Instantiates `executors` slots from `factory` and opens the pipe.
    ///
    /// Freezes this pipe's topology: no further links may be added to or
    /// from it. Each executor's `initialize` hook runs here; a non-success
    /// severity fails the launch.
    pub fn launch(
        &self,
        executors: usize,
        factory: impl FnMut() -> E,
    ) -> Result<(), ProtocolError> {
        let pipeline = self
            .pipeline
            .upgrade()
            .ok_or(ProtocolError::StalePipeline)?;
        // The topology lock serializes launch against connect, so a link
        // can never slip in between the launched check and the flag.
        let mut topology = pipeline.topology.lock();
        self.core.launch(executors, factory)?;
        topology.mark_launched(self.core.id());
        Ok(())
    }

    /// Registers a side-effect callback invoked after each generation with
    /// the final severity and output value.
    pub fn add_output_handler(
        &self,
        handler: impl Fn(FenceIndex, Severity, &E::Output) + Send + Sync + 'static,
    ) {
        self.core.add_output_handler(Box::new(handler));
    }

    /// Invalidates a generation at this pipe; see [`PipeProxy::submit_abort`].
    pub fn submit_abort(&self, fence: FenceIndex) -> Result<SubmitOutcome, ProtocolError> {
        self.core.submit_abort(fence)
    }

    /// Creates a weak observer handle.
    pub fn proxy(&self) -> PipeProxy<E> {
        PipeProxy::new(&self.core)
    }
}

impl<E: Executor> Clone for Pipe<E> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            pipeline: Weak::clone(&self.pipeline),
        }
    }
}

impl<E: Executor> std::fmt::Debug for Pipe<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipe")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("optional", &self.is_optional())
            .field("launched", &self.is_launched())
            .finish()
    }
}
