//! Pipe core: state, launch protocol, and the submission paths.
//!
//! All mutable pipe state (input slot + executor slot bookkeeping) sits
//! behind one mutex held only for the check-and-mutate step, never across a
//! suspension point. The asynchronous execution and delivery chains built on
//! top of these paths live in `runtime.rs`.

use super::exec_slot::{ExecSlot, SlotPool};
use super::input_slot::{Admission, InputSlot};
use super::link::{InputLink, LinkPort, OutputLink, SubmitOutcome};
use crate::config::EngineConfig;
use crate::error::{ProtocolError, Severity};
use crate::exec::{ExecRecords, Executor};
use crate::fence::{FenceIndex, FenceObject};
use crate::inflight::InflightTracker;
use crate::options::OptionStore;
use crate::pipeline::PipeId;
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Side-effect callback invoked after each generation completes, with the
/// final severity and output value. Handlers have no downstream fence
/// semantics of their own.
pub type OutputHandler<O> = Box<dyn Fn(FenceIndex, Severity, &O) + Send + Sync>;

/// Externally observable snapshot of a pipe's latest execution.
///
/// Swapped wholesale at finalize, so readers never contend with the hot
/// path beyond one short lock.
#[derive(Clone, Debug)]
pub struct PipeStats {
    /// Generations that ran to completion on this pipe.
    pub fences_processed: u64,
    /// Generations invalidated at this pipe.
    pub fences_aborted: u64,
    /// The most recently completed fence.
    pub last_fence: FenceIndex,
    /// Severity of the most recent invocation.
    pub last_severity: Severity,
    /// Duration of the most recent invocation.
    pub last_duration: Duration,
    /// Timers and debug values recorded by the most recent invocation.
    pub last_records: ExecRecords,
}

impl Default for PipeStats {
    fn default() -> Self {
        Self {
            fences_processed: 0,
            fences_aborted: 0,
            last_fence: FenceIndex::NONE,
            last_severity: Severity::Ok,
            last_duration: Duration::ZERO,
            last_records: ExecRecords::default(),
        }
    }
}

/// Mutable pipe state, all under one short lock.
pub(crate) struct PipeState<E: Executor> {
    pub(crate) input: InputSlot<E::Input>,
    pub(crate) slots: SlotPool,
    pub(crate) launched: bool,
}

pub(crate) struct PipeCore<E: Executor> {
    id: PipeId,
    name: Arc<str>,
    optional: bool,
    pub(crate) state: Mutex<PipeState<E>>,
    /// The executors themselves; only the slot's own running chain locks one.
    pub(crate) executors: RwLock<Vec<Arc<ExecSlot<E>>>>,
    pub(crate) input_links: Mutex<Vec<InputLink>>,
    pub(crate) output_links: RwLock<Vec<OutputLink<E::Output>>>,
    pub(crate) handlers: RwLock<Vec<OutputHandler<E::Output>>>,
    options: Arc<OptionStore>,
    pub(crate) inflight: Arc<InflightTracker>,
    pub(crate) stats: Mutex<PipeStats>,
    pub(crate) telemetry: Arc<dyn TelemetrySink>,
    pub(crate) config: EngineConfig,
    pub(crate) shutdown: CancellationToken,
}

impl<E: Executor> PipeCore<E> {
    pub(crate) fn new(
        id: PipeId,
        name: Arc<str>,
        optional: bool,
        telemetry: Arc<dyn TelemetrySink>,
        config: EngineConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let options = Arc::new(OptionStore::new());
        E::register_default_options(&options);
        Self {
            id,
            name,
            optional,
            state: Mutex::new(PipeState {
                input: InputSlot::new(),
                slots: SlotPool::empty(),
                launched: false,
            }),
            executors: RwLock::new(Vec::new()),
            input_links: Mutex::new(Vec::new()),
            output_links: RwLock::new(Vec::new()),
            handlers: RwLock::new(Vec::new()),
            options,
            inflight: Arc::new(InflightTracker::new()),
            stats: Mutex::new(PipeStats::default()),
            telemetry,
            config,
            shutdown,
        }
    }

    pub(crate) fn id(&self) -> PipeId {
        self.id
    }

    pub(crate) fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub(crate) fn is_optional(&self) -> bool {
        self.optional
    }

    pub(crate) fn is_launched(&self) -> bool {
        self.state.lock().launched
    }

    pub(crate) fn options(&self) -> &Arc<OptionStore> {
        &self.options
    }

    pub(crate) fn stats(&self) -> PipeStats {
        self.stats.lock().clone()
    }

    pub(crate) fn executor_count(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub(crate) fn input_link_count(&self) -> usize {
        self.input_links.lock().len()
    }

    /// Registers an upstream link, growing the ready vector. Caller holds
    /// the pipeline topology lock, which serializes this against launch.
    pub(crate) fn add_input_link(&self, source: PipeId) -> usize {
        let mut state = self.state.lock();
        let index = state.input.grow_links();
        self.input_links.lock().push(InputLink { source });
        index
    }

    pub(crate) fn add_output_port(&self, port: Arc<dyn LinkPort<E::Output>>) {
        self.output_links.write().push(OutputLink { port });
    }

    /// Registers a plain output handler.
    pub(crate) fn add_output_handler(&self, handler: OutputHandler<E::Output>) {
        self.handlers.write().push(handler);
    }

    /// Instantiates the executor pool and opens the pipe for fences.
    ///
    /// Caller holds the pipeline topology lock (where the launched flag is
    /// also recorded), which serializes launch against `connect`.
    pub(crate) fn launch(
        &self,
        executors: usize,
        mut factory: impl FnMut() -> E,
    ) -> Result<(), ProtocolError> {
        if executors == 0 {
            return Err(ProtocolError::NoExecutors {
                pipe: self.name.to_string(),
            });
        }

        let mut state = self.state.lock();
        if state.launched {
            return Err(ProtocolError::AlreadyLaunched {
                pipe: self.name.to_string(),
            });
        }

        let mut pool = Vec::with_capacity(executors);
        for slot in 0..executors {
            let mut executor = factory();
            let severity = executor.initialize(&self.options);
            if !severity.is_success() {
                return Err(ProtocolError::InitializeFailed {
                    pipe: self.name.to_string(),
                    slot,
                    severity,
                });
            }
            pool.push(Arc::new(ExecSlot::new(executor)));
        }

        *self.executors.write() = pool;
        state.slots.init(executors);
        state.input.seed(FenceIndex::FIRST);
        state.launched = true;
        drop(state);

        debug!(pipe = %self.name, executors, "pipe launched");
        self.telemetry.emit(TelemetryEvent::PipeLaunched {
            pipe: self.id,
            name: Arc::clone(&self.name),
            executors,
        });
        Ok(())
    }

    /// Whether the direct (front) path can accept input right now.
    pub(crate) fn can_submit_direct(&self) -> bool {
        let state = self.state.lock();
        state.launched && state.input.link_count() == 0 && state.slots.rotation_idle()
    }

    /// Direct input path for pipes with no input links (the pipeline front).
    pub(crate) fn submit_direct(
        self: &Arc<Self>,
        input: E::Input,
        fence_object: Arc<FenceObject>,
    ) -> Result<SubmitOutcome, ProtocolError> {
        if self.shutdown.is_cancelled() {
            return Err(ProtocolError::PipelineShutDown);
        }

        let dispatch = {
            let mut state = self.state.lock();
            if !state.launched {
                return Err(ProtocolError::NotLaunched {
                    pipe: self.name.to_string(),
                });
            }
            if state.input.link_count() > 0 {
                return Err(ProtocolError::DirectInputWithLinks {
                    pipe: self.name.to_string(),
                });
            }
            if !state.slots.rotation_idle() {
                return Ok(SubmitOutcome::Busy);
            }

            state.input.attach_fence_object(&fence_object);
            *state.input.cached_input_mut() = input;
            let (fence, input, object) = state.input.take_for_dispatch(&fence_object);
            let slot = state.slots.acquire_rotation(fence);
            (slot, fence, input, object)
        };

        let (slot, fence, input, object) = dispatch;
        self.telemetry.emit(TelemetryEvent::FenceSupplied {
            pipe: self.id,
            fence,
        });
        self.spawn_execution(slot, fence, input, object);
        Ok(SubmitOutcome::Accepted)
    }

    /// Linked input path, called by upstream delivery chains through an
    /// [`AdaptedPort`](super::link::AdaptedPort).
    pub(crate) fn submit_linked<F>(
        self: &Arc<Self>,
        fence: FenceIndex,
        link_index: usize,
        fence_object: &Arc<FenceObject>,
        mutate: F,
    ) -> Result<SubmitOutcome, ProtocolError>
    where
        F: FnOnce(&mut E::Input),
    {
        if self.shutdown.is_cancelled() {
            return Ok(SubmitOutcome::Stale);
        }

        let dispatch = {
            let mut state = self.state.lock();
            if !state.launched {
                return Ok(SubmitOutcome::Busy);
            }
            match state.input.admission(fence, state.slots.rotation_idle()) {
                Admission::Stale => return Ok(SubmitOutcome::Stale),
                Admission::NotYetReady => return Ok(SubmitOutcome::Busy),
                Admission::Ready => {}
            }

            if state.input.mark_valid(link_index).is_err() {
                return Err(ProtocolError::DuplicateSubmission {
                    pipe: self.name.to_string(),
                    fence: fence.value(),
                    link: link_index,
                });
            }
            state.input.attach_fence_object(fence_object);
            mutate(state.input.cached_input_mut());

            if state.input.all_valid() {
                let (fence, input, object) = state.input.take_for_dispatch(fence_object);
                let slot = state.slots.acquire_rotation(fence);
                Some((slot, fence, input, object))
            } else {
                None
            }
        };

        if let Some((slot, fence, input, object)) = dispatch {
            self.spawn_execution(slot, fence, input, object);
        }
        Ok(SubmitOutcome::Accepted)
    }

    /// Abort path: invalidates the generation without running an executor.
    ///
    /// Does not require an idle executor slot, which is what lets optional
    /// pipes skip generations while their pool is saturated.
    pub(crate) fn submit_abort(
        self: &Arc<Self>,
        fence: FenceIndex,
    ) -> Result<SubmitOutcome, ProtocolError> {
        if self.shutdown.is_cancelled() {
            return Ok(SubmitOutcome::Stale);
        }

        {
            let mut state = self.state.lock();
            if !state.launched {
                return Ok(SubmitOutcome::Busy);
            }
            match state.input.abort_admission(fence) {
                Admission::Stale => return Ok(SubmitOutcome::Stale),
                Admission::NotYetReady => return Ok(SubmitOutcome::Busy),
                Admission::Ready => {}
            }
            state.input.invalidate();
        }

        self.stats.lock().fences_aborted += 1;
        debug!(pipe = %self.name, %fence, "fence aborted");
        self.telemetry.emit(TelemetryEvent::FenceAborted {
            pipe: self.id,
            fence,
        });
        self.spawn_abort_walk(fence);
        Ok(SubmitOutcome::Accepted)
    }
}

/// Type-erased view of a pipe, for the pipeline's registry.
pub(crate) trait AnyPipe: Send + Sync + 'static {
    fn id(&self) -> PipeId;
    fn name(&self) -> Arc<str>;
    fn is_launched(&self) -> bool;
    fn inflight_count(&self) -> usize;
}

impl<E: Executor> AnyPipe for PipeCore<E> {
    fn id(&self) -> PipeId {
        PipeCore::id(self)
    }

    fn name(&self) -> Arc<str> {
        Arc::clone(PipeCore::name(self))
    }

    fn is_launched(&self) -> bool {
        PipeCore::is_launched(self)
    }

    fn inflight_count(&self) -> usize {
        self.inflight.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ExecContext;
    use crate::telemetry::NullTelemetrySink;
    use std::sync::Arc;

    /// Records every (fence, input) pair it executes.
    struct Recorder {
        seen: Arc<Mutex<Vec<(u64, Vec<i32>)>>>,
    }

    impl Executor for Recorder {
        type Input = Vec<i32>;
        type Output = ();

        fn invoke(&mut self, ctx: &mut ExecContext, input: &Vec<i32>, _output: &mut ()) -> Severity {
            self.seen.lock().push((ctx.fence().value(), input.clone()));
            Severity::Ok
        }
    }

    /// Fails its initialize hook.
    struct BadInit;

    impl Executor for BadInit {
        type Input = ();
        type Output = ();

        fn invoke(&mut self, _ctx: &mut ExecContext, _input: &(), _output: &mut ()) -> Severity {
            Severity::Ok
        }

        fn initialize(&mut self, _options: &OptionStore) -> Severity {
            Severity::Error
        }
    }

    fn test_core<E: Executor>(links: usize) -> Arc<PipeCore<E>> {
        let core = Arc::new(PipeCore::<E>::new(
            PipeId::from_raw(0),
            Arc::from("test"),
            false,
            Arc::new(NullTelemetrySink),
            EngineConfig::default(),
            CancellationToken::new(),
        ));
        for i in 0..links {
            core.add_input_link(PipeId::from_raw(100 + i as u64));
        }
        core
    }

    fn recorder_core(links: usize) -> (Arc<PipeCore<Recorder>>, Arc<Mutex<Vec<(u64, Vec<i32>)>>>) {
        let seen: Arc<Mutex<Vec<(u64, Vec<i32>)>>> = Arc::new(Mutex::new(Vec::new()));
        let core = test_core::<Recorder>(links);
        let factory_seen = Arc::clone(&seen);
        core.launch(1, move || Recorder {
            seen: Arc::clone(&factory_seen),
        })
        .unwrap();
        (core, seen)
    }

    fn fence_object() -> Arc<FenceObject> {
        Arc::new(FenceObject::new(Arc::new(OptionStore::new())))
    }

    #[test]
    fn test_launch_rejects_zero_executors() {
        let core = test_core::<Recorder>(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let err = core
            .launch(0, move || Recorder {
                seen: Arc::clone(&seen),
            })
            .unwrap_err();
        assert!(matches!(err, ProtocolError::NoExecutors { .. }));
    }

    #[test]
    fn test_launch_rejects_relaunch() {
        let (core, _) = recorder_core(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let err = core
            .launch(1, move || Recorder {
                seen: Arc::clone(&seen),
            })
            .unwrap_err();
        assert!(matches!(err, ProtocolError::AlreadyLaunched { .. }));
    }

    #[test]
    fn test_launch_surfaces_initialize_failure() {
        let core = test_core::<BadInit>(0);
        let err = core.launch(2, || BadInit).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InitializeFailed {
                severity: Severity::Error,
                ..
            }
        ));
        assert!(!core.is_launched());
    }

    #[test]
    fn test_direct_submit_requires_launch() {
        let core = test_core::<Recorder>(0);
        let err = core.submit_direct(vec![1], fence_object()).unwrap_err();
        assert!(matches!(err, ProtocolError::NotLaunched { .. }));
    }

    #[test]
    fn test_direct_submit_rejected_with_links() {
        let (core, _) = recorder_core(1);
        let err = core.submit_direct(vec![1], fence_object()).unwrap_err();
        assert!(matches!(err, ProtocolError::DirectInputWithLinks { .. }));
    }

    #[test]
    fn test_duplicate_submission_detected() {
        let (core, _) = recorder_core(2);
        let obj = fence_object();

        let outcome = core
            .submit_linked(FenceIndex::FIRST, 0, &obj, |input| input.push(1))
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::Accepted);

        let err = core
            .submit_linked(FenceIndex::FIRST, 0, &obj, |input| input.push(1))
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::DuplicateSubmission { fence: 0, link: 0, .. }
        ));
    }

    #[test]
    fn test_concurrent_duplicate_submission_detected() {
        // The generation stays active (link 1 never submits), so exactly one
        // of two racing submitters must fail, whatever the interleaving.
        for _ in 0..100 {
            let (core, _) = recorder_core(2);
            let obj = fence_object();

            let (first, second) = std::thread::scope(|scope| {
                let a = scope.spawn(|| {
                    core.submit_linked(FenceIndex::FIRST, 0, &obj, |input| input.push(1))
                });
                let b = scope.spawn(|| {
                    core.submit_linked(FenceIndex::FIRST, 0, &obj, |input| input.push(2))
                });
                (a.join().unwrap(), b.join().unwrap())
            });

            let accepted = [&first, &second]
                .iter()
                .filter(|r| matches!(r, Ok(SubmitOutcome::Accepted)))
                .count();
            let duplicates = [&first, &second]
                .iter()
                .filter(|r| matches!(r, Err(ProtocolError::DuplicateSubmission { .. })))
                .count();
            assert_eq!((accepted, duplicates), (1, 1));
        }
    }

    #[test]
    fn test_stale_submission_dropped_idempotently() {
        let (core, _) = recorder_core(2);
        let obj = fence_object();

        // Abort advances the slot past fence 0; no output links, so the
        // abort resolves synchronously.
        assert_eq!(
            core.submit_abort(FenceIndex::FIRST).unwrap(),
            SubmitOutcome::Accepted
        );

        for _ in 0..3 {
            let outcome = core
                .submit_linked(FenceIndex::FIRST, 0, &obj, |input| input.push(1))
                .unwrap();
            assert_eq!(outcome, SubmitOutcome::Stale);
            assert_eq!(
                core.submit_abort(FenceIndex::FIRST).unwrap(),
                SubmitOutcome::Stale
            );
        }
        assert_eq!(core.stats().fences_aborted, 1);
    }

    #[test]
    fn test_future_fence_not_yet_ready() {
        let (core, _) = recorder_core(2);
        let obj = fence_object();

        let outcome = core
            .submit_linked(FenceIndex::FIRST.next(), 0, &obj, |input| input.push(1))
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::Busy);
    }

    #[tokio::test]
    async fn test_aborted_partial_input_discarded() {
        let (core, seen) = recorder_core(2);
        let obj = fence_object();
        let f0 = FenceIndex::FIRST;
        let f1 = f0.next();

        // Fence 0: only link 0 arrives, then the generation aborts.
        core.submit_linked(f0, 0, &obj, |input| input.push(7)).unwrap();
        core.submit_abort(f0).unwrap();

        // Fence 1 completes normally and must not see fence 0's data.
        core.submit_linked(f1, 0, &obj, |input| input.push(1)).unwrap();
        core.submit_linked(f1, 1, &obj, |input| input.push(2)).unwrap();

        core.inflight.wait_idle().await;
        assert_eq!(seen.lock().as_slice(), &[(1, vec![1, 2])]);
    }

    #[tokio::test]
    async fn test_direct_submit_busy_while_slot_occupied() {
        struct Slow;
        impl Executor for Slow {
            type Input = ();
            type Output = ();
            fn invoke(&mut self, _ctx: &mut ExecContext, _input: &(), _output: &mut ()) -> Severity {
                std::thread::sleep(std::time::Duration::from_millis(50));
                Severity::Ok
            }
        }

        let core = test_core::<Slow>(0);
        core.launch(1, || Slow).unwrap();

        assert!(core.can_submit_direct());
        assert_eq!(
            core.submit_direct((), fence_object()).unwrap(),
            SubmitOutcome::Accepted
        );
        assert_eq!(
            core.submit_direct((), fence_object()).unwrap(),
            SubmitOutcome::Busy
        );
        assert!(!core.can_submit_direct());

        core.inflight.wait_idle().await;
        assert!(core.can_submit_direct());
        assert_eq!(core.stats().fences_processed, 1);
    }
}
