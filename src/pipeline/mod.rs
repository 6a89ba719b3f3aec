//! The pipeline: owner of pipes, fence pool, and global options.
//!
//! A [`Pipeline`] is the single owner of everything in one graph. Pipes are
//! created through it, linked through it, and torn down with it. Work enters
//! through the typed [`FrontProxy`] of the front pipe (the first pipe
//! added), flows through the graph asynchronously, and surfaces through
//! output handlers on whichever pipes the embedder cares about.
//!
//! The runtime requires an ambient tokio runtime: supplying input and
//! delivering outputs spawn tasks.
//!
//! # Example
//!
//! ```ignore
//! use fenceflow::{Pipeline, Executor, ExecContext, Severity};
//!
//! let pipeline = Pipeline::new();
//! let decode = pipeline.add_pipe::<Decode>("decode");
//! let analyze = pipeline.add_pipe::<Analyze>("analyze");
//! pipeline.connect(&decode, &analyze, |_fence, out, input| *input = out.frame)?;
//!
//! decode.launch(2, || Decode::default())?;
//! analyze.launch(1, || Analyze::default())?;
//!
//! let front = pipeline.front_proxy::<Decode>()?;
//! while !front.can_supply() {}
//! front.supply(raw_frame)?;
//! pipeline.sync().await;
//! ```

mod proxy;
mod topology;

pub use proxy::PipelineProxy;
pub use topology::PipeId;

pub(crate) use topology::Topology;

use crate::config::EngineConfig;
use crate::error::ProtocolError;
use crate::exec::Executor;
use crate::fence::{FenceObject, FencePool};
use crate::options::OptionStore;
use crate::pipe::{AdaptedPort, AnyPipe, Pipe, PipeCore, SubmitOutcome};
use crate::telemetry::{NullTelemetrySink, TelemetrySink};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The front pipe, stored type-erased; `front_proxy` recovers the type.
struct FrontEntry {
    id: PipeId,
    name: Arc<str>,
    handle: Box<dyn Any + Send + Sync>,
}

pub(crate) struct PipelineCore {
    pub(crate) topology: Mutex<Topology>,
    pipes: Mutex<Vec<Arc<dyn AnyPipe>>>,
    front: Mutex<Option<FrontEntry>>,
    fence_pool: FencePool,
    options: Arc<OptionStore>,
    telemetry: Arc<dyn TelemetrySink>,
    config: EngineConfig,
    shutdown: CancellationToken,
}

impl PipelineCore {
    pub(crate) fn pipe_snapshot(&self) -> Vec<Arc<dyn AnyPipe>> {
        self.pipes.lock().clone()
    }

    pub(crate) fn options(&self) -> &Arc<OptionStore> {
        &self.options
    }

    /// Waits until no pipe has an in-flight asynchronous operation.
    pub(crate) async fn wait_quiescent(&self) {
        loop {
            let pipes = self.pipe_snapshot();
            if pipes.iter().all(|p| p.inflight_count() == 0) {
                return;
            }
            tokio::time::sleep(self.config.sync_poll_interval).await;
        }
    }
}

/// Owner of a complete data-flow graph.
pub struct Pipeline {
    core: Arc<PipelineCore>,
}

impl Pipeline {
    /// Creates a pipeline with default configuration and no telemetry.
    pub fn new() -> Self {
        Self::with_telemetry(EngineConfig::default(), Arc::new(NullTelemetrySink))
    }

    /// Creates a pipeline with the given configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_telemetry(config, Arc::new(NullTelemetrySink))
    }

    /// Creates a pipeline with a telemetry sink.
    pub fn with_telemetry(config: EngineConfig, telemetry: Arc<dyn TelemetrySink>) -> Self {
        let options = Arc::new(OptionStore::new());
        let core = Arc::new(PipelineCore {
            topology: Mutex::new(Topology::new()),
            pipes: Mutex::new(Vec::new()),
            front: Mutex::new(None),
            fence_pool: FencePool::new(Arc::clone(&options), config.fence_pool_max_idle),
            options,
            telemetry,
            config,
            shutdown: CancellationToken::new(),
        });
        Self { core }
    }

    /// Adds a pipe running executors of type `E`.
    ///
    /// The first pipe added becomes the front: the entry point for
    /// [`FrontProxy::supply`]. The executor type's default options are
    /// registered on the pipe's option store here.
    pub fn add_pipe<E: Executor>(&self, name: &str) -> Pipe<E> {
        self.insert_pipe(name, false)
    }

    /// Adds an optional pipe: one whose input need not arrive every
    /// generation. Busy optional pipes are offered aborts instead of data,
    /// and joins downstream of one must agree on it as their branch point.
    pub fn add_optional_pipe<E: Executor>(&self, name: &str) -> Pipe<E> {
        self.insert_pipe(name, true)
    }

    fn insert_pipe<E: Executor>(&self, name: &str, optional: bool) -> Pipe<E> {
        let (id, interned) = self.core.topology.lock().register(name, optional);
        let core = Arc::new(PipeCore::<E>::new(
            id,
            Arc::clone(&interned),
            optional,
            Arc::clone(&self.core.telemetry),
            self.core.config.clone(),
            self.core.shutdown.clone(),
        ));

        self.core
            .pipes
            .lock()
            .push(Arc::clone(&core) as Arc<dyn AnyPipe>);

        let mut front = self.core.front.lock();
        if front.is_none() {
            *front = Some(FrontEntry {
                id,
                name: interned,
                handle: Box::new(Arc::clone(&core)),
            });
        }
        drop(front);

        Pipe {
            core,
            pipeline: Arc::downgrade(&self.core),
        }
    }

    /// Connects `src`'s output to `dst`'s input through `adapter`.
    ///
    /// The adapter folds the upstream output into the downstream input:
    /// `(fence_object, &src_output, &mut dst_input)`. It must be a pure
    /// data transform with no pipeline side effects.
    ///
    /// Fails on self-links, duplicates, launched endpoints, cycles, and
    /// optional-ancestor disagreement at fan-in joins.
    pub fn connect<U, D, F>(
        &self,
        src: &Pipe<U>,
        dst: &Pipe<D>,
        adapter: F,
    ) -> Result<(), ProtocolError>
    where
        U: Executor,
        D: Executor,
        F: Fn(&FenceObject, &U::Output, &mut D::Input) + Send + Sync + 'static,
    {
        self.check_ownership(&src.pipeline, src.name())?;
        self.check_ownership(&dst.pipeline, dst.name())?;

        // Held for the whole operation: validation, ready growth, and link
        // registration must be atomic with respect to launch.
        let mut topology = self.core.topology.lock();
        topology.validate_link(src.id(), dst.id())?;

        let link_index = dst.core.add_input_link(src.id());
        let port = Arc::new(AdaptedPort::<U::Output, D> {
            target: Arc::clone(&dst.core),
            link_index,
            adapter: Arc::new(adapter),
        });
        src.core.add_output_port(port);
        topology.add_link(src.id(), dst.id());

        info!(from = %src.name(), to = %dst.name(), "pipes connected");
        Ok(())
    }

    fn check_ownership(
        &self,
        pipeline: &Weak<PipelineCore>,
        pipe_name: &str,
    ) -> Result<(), ProtocolError> {
        let owner = pipeline.upgrade().ok_or(ProtocolError::StalePipeline)?;
        if !Arc::ptr_eq(&owner, &self.core) {
            return Err(ProtocolError::ForeignPipe {
                pipe: pipe_name.to_string(),
            });
        }
        Ok(())
    }

    /// Typed supply handle for the front pipe.
    ///
    /// Fails if no pipe has been added or if `E` is not the front pipe's
    /// executor type.
    pub fn front_proxy<E: Executor>(&self) -> Result<FrontProxy<E>, ProtocolError> {
        let front = self.core.front.lock();
        let entry = front.as_ref().ok_or(ProtocolError::NoFrontPipe)?;
        let core = entry
            .handle
            .downcast_ref::<Arc<PipeCore<E>>>()
            .ok_or_else(|| ProtocolError::FrontTypeMismatch {
                pipe: entry.name.to_string(),
            })?;
        Ok(FrontProxy {
            pipeline: Arc::downgrade(&self.core),
            pipe: Arc::downgrade(core),
        })
    }

    /// Id of the front pipe, if any pipe has been added.
    pub fn front_id(&self) -> Option<PipeId> {
        self.core.front.lock().as_ref().map(|entry| entry.id)
    }

    /// Weak observer handle to this pipeline.
    pub fn proxy(&self) -> PipelineProxy {
        PipelineProxy::new(&self.core)
    }

    /// The pipeline-wide option store, shared with every fence object.
    pub fn global_options(&self) -> &Arc<OptionStore> {
        self.core.options()
    }

    pub fn pipe_count(&self) -> usize {
        self.core.pipes.lock().len()
    }

    /// Names of all pipes, in insertion order.
    pub fn pipe_names(&self) -> Vec<Arc<str>> {
        self.core.pipes.lock().iter().map(|p| p.name()).collect()
    }

    /// Coarse barrier: polls until no pipe has in-flight asynchronous work.
    ///
    /// A shutdown/test/debug utility, not a hot path.
    pub async fn sync(&self) {
        self.core.wait_quiescent().await;
    }

    /// Stops accepting work, lets in-flight chains wind down, and waits for
    /// quiescence.
    pub async fn shutdown(&self) {
        self.core.shutdown.cancel();
        self.core.wait_quiescent().await;
        info!("pipeline shut down");
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("pipes", &self.pipe_count())
            .finish()
    }
}

// =============================================================================
// Front Proxy
// =============================================================================

/// Typed supply handle for the pipeline's front pipe.
///
/// Weak like every proxy: operations fail with `StalePipeline` once the
/// pipeline is destroyed.
pub struct FrontProxy<E: Executor> {
    pipeline: Weak<PipelineCore>,
    pipe: Weak<PipeCore<E>>,
}

impl<E: Executor> FrontProxy<E> {
    /// Whether the front pipe can accept a new generation right now.
    pub fn can_supply(&self) -> bool {
        self.pipe
            .upgrade()
            .is_some_and(|pipe| pipe.can_submit_direct())
    }

    /// Feeds one unit of work into the pipeline.
    ///
    /// Acquires (or recycles) a fence object, assigns the next fence index,
    /// and hands the input to the front pipe. Returns `Busy` when the front
    /// pipe's executor pool is saturated; respect [`can_supply`] or retry.
    pub fn supply(&self, input: E::Input) -> Result<SubmitOutcome, ProtocolError> {
        self.supply_with(input, |_| {})
    }

    /// Like [`supply`], with a mutator that stamps per-generation metadata
    /// onto the fence object before it enters the graph.
    pub fn supply_with(
        &self,
        input: E::Input,
        fence_mutator: impl FnOnce(&FenceObject),
    ) -> Result<SubmitOutcome, ProtocolError> {
        let pipeline = self
            .pipeline
            .upgrade()
            .ok_or(ProtocolError::StalePipeline)?;
        let pipe = self.pipe.upgrade().ok_or(ProtocolError::StalePipeline)?;

        let fence_object = pipeline.fence_pool.acquire();
        fence_mutator(&fence_object);
        pipe.submit_direct(input, fence_object)
    }
}

impl<E: Executor> Clone for FrontProxy<E> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Weak::clone(&self.pipeline),
            pipe: Weak::clone(&self.pipe),
        }
    }
}
