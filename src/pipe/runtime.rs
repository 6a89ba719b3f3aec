//! Asynchronous execution and delivery chains.
//!
//! Every chain is a spawned task that never blocks a worker thread: waiting
//! is always a short sleep followed by a re-check, whether for the output
//! turn or for a busy downstream slot. Each chain holds its pipe's
//! in-flight guard from spawn to completion, retries included, so `sync()`
//! and teardown can wait for true quiescence.

use super::core::PipeCore;
use super::link::{LinkPort, SubmitOutcome};
use crate::error::Severity;
use crate::exec::{ExecContext, ExecRecords, Executor};
use crate::fence::{FenceIndex, FenceObject};
use crate::telemetry::TelemetryEvent;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

impl<E: Executor> PipeCore<E> {
    /// Launches the execution chain for a dispatched generation.
    ///
    /// Only called with a slot freshly acquired from the rotation; returns
    /// immediately.
    pub(crate) fn spawn_execution(
        self: &Arc<Self>,
        slot: usize,
        fence: FenceIndex,
        input: E::Input,
        fence_object: Arc<FenceObject>,
    ) {
        let core = Arc::clone(self);
        let op = self.inflight.begin();
        tokio::spawn(async move {
            let _op = op;
            core.run_generation(slot, fence, input, fence_object).await;
        });
    }

    /// The full slot lifecycle: invoke, await the output turn, deliver to
    /// every link, finalize.
    async fn run_generation(
        self: Arc<Self>,
        slot: usize,
        fence: FenceIndex,
        input: E::Input,
        fence_object: Arc<FenceObject>,
    ) {
        self.telemetry.emit(TelemetryEvent::ExecStarted {
            pipe: self.id(),
            fence,
            slot,
        });

        let started = Instant::now();
        let (severity, output, records) = self.invoke_executor(slot, fence, &fence_object, input).await;
        let duration = started.elapsed();

        self.telemetry.emit(TelemetryEvent::ExecCompleted {
            pipe: self.id(),
            fence,
            slot,
            severity,
            duration,
        });

        self.await_output_turn(slot).await;

        if !self.shutdown.is_cancelled() {
            self.deliver_output(fence, &fence_object, &output).await;
        }

        // Finalize: handlers, fence release, turn rotation, snapshot, idle.
        {
            let handlers = self.handlers.read();
            for handler in handlers.iter() {
                handler(fence, severity, &output);
            }
        }
        drop(fence_object);
        self.state.lock().slots.finish(slot, severity);
        {
            let mut stats = self.stats.lock();
            stats.fences_processed += 1;
            stats.last_fence = fence;
            stats.last_severity = severity;
            stats.last_duration = duration;
            stats.last_records = records;
        }
    }

    /// Runs the user executor on the blocking pool.
    ///
    /// A panicking executor is recorded as `Fatal` with a default output;
    /// the chain still finalizes so the turn keeps rotating.
    async fn invoke_executor(
        &self,
        slot: usize,
        fence: FenceIndex,
        fence_object: &Arc<FenceObject>,
        input: E::Input,
    ) -> (Severity, E::Output, ExecRecords) {
        let exec_slot = {
            let executors = self.executors.read();
            Arc::clone(&executors[slot])
        };
        let ctx = ExecContext::new(fence, Arc::clone(fence_object), Arc::clone(self.options()));

        let join = tokio::task::spawn_blocking(move || {
            let mut ctx = ctx;
            let mut output = E::Output::default();
            let severity = exec_slot.executor.lock().invoke(&mut ctx, &input, &mut output);
            (severity, output, ctx.into_records())
        })
        .await;

        match join {
            Ok(result) => result,
            Err(join_error) => {
                error!(pipe = %self.name(), %fence, %join_error, "executor panicked");
                (Severity::Fatal, E::Output::default(), ExecRecords::default())
            }
        }
    }

    /// Waits until this slot holds the output turn (or shutdown).
    async fn await_output_turn(&self, slot: usize) {
        loop {
            if self.state.lock().slots.is_output_turn(slot) {
                return;
            }
            if self.shutdown.is_cancelled() {
                return;
            }
            tokio::time::sleep(self.config.retry_backoff).await;
        }
    }

    /// Walks the output links in order, retrying each until it resolves.
    ///
    /// A busy non-optional destination is retried indefinitely; a busy
    /// optional destination is offered an abort instead, letting the
    /// optional branch skip the generation rather than stall the sender.
    async fn deliver_output(
        &self,
        fence: FenceIndex,
        fence_object: &Arc<FenceObject>,
        output: &E::Output,
    ) {
        let ports: Vec<Arc<dyn LinkPort<E::Output>>> = {
            let links = self.output_links.read();
            links.iter().map(|l| Arc::clone(&l.port)).collect()
        };

        'links: for port in ports {
            loop {
                if self.shutdown.is_cancelled() {
                    return;
                }
                match port.deliver(fence, fence_object, output) {
                    Ok(SubmitOutcome::Accepted) => {
                        self.telemetry.emit(TelemetryEvent::OutputDelivered {
                            from: self.id(),
                            to: port.pipe_id(),
                            fence,
                        });
                        continue 'links;
                    }
                    Ok(SubmitOutcome::Stale) => {
                        self.telemetry.emit(TelemetryEvent::OutputDropped {
                            from: self.id(),
                            to: port.pipe_id(),
                            fence,
                        });
                        continue 'links;
                    }
                    Ok(SubmitOutcome::Busy) => {
                        if port.optional() {
                            match port.deliver_abort(fence) {
                                Ok(SubmitOutcome::Accepted) | Ok(SubmitOutcome::Stale) => {
                                    continue 'links;
                                }
                                Ok(SubmitOutcome::Busy) => {}
                                Err(err) => {
                                    error!(pipe = %self.name(), %err, "abort fallback failed");
                                    continue 'links;
                                }
                            }
                        }
                        tokio::time::sleep(self.config.retry_backoff).await;
                    }
                    Err(err) => {
                        // A protocol violation inside the walk means the
                        // runtime's own invariants broke; drop the link's
                        // delivery rather than wedge the chain.
                        error!(pipe = %self.name(), %fence, %err, "output delivery rejected");
                        continue 'links;
                    }
                }
            }
        }
    }

    /// Propagates a fence abortion to every downstream pipe.
    ///
    /// Carries no data; each accepted abort recursively triggers the
    /// downstream pipe's own complete-or-abort logic. The walk holds this
    /// pipe's in-flight guard across all of its retries.
    pub(crate) fn spawn_abort_walk(self: &Arc<Self>, fence: FenceIndex) {
        let ports: Vec<Arc<dyn LinkPort<E::Output>>> = {
            let links = self.output_links.read();
            links.iter().map(|l| Arc::clone(&l.port)).collect()
        };
        if ports.is_empty() {
            return;
        }

        let core = Arc::clone(self);
        let op = self.inflight.begin();
        tokio::spawn(async move {
            let _op = op;
            'links: for port in ports {
                loop {
                    if core.shutdown.is_cancelled() {
                        return;
                    }
                    match port.deliver_abort(fence) {
                        Ok(SubmitOutcome::Accepted) | Ok(SubmitOutcome::Stale) => {
                            continue 'links;
                        }
                        Ok(SubmitOutcome::Busy) => {
                            tokio::time::sleep(core.config.retry_backoff).await;
                        }
                        Err(err) => {
                            error!(pipe = %core.name(), %fence, %err, "abort propagation rejected");
                            continue 'links;
                        }
                    }
                }
            }
        });
    }
}
