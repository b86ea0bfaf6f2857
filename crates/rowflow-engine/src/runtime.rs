//! Per-copy step runtime: shared observable state plus the worker loop
//! that drives a plugin through its lifecycle.
//!
//! Counters and lifecycle state are written only by the owning worker
//! thread and read concurrently by the controller and sampler, so they
//! are plain atomics. Disposal is guaranteed to run exactly once for
//! every exit path, including a panicking plugin.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rowflow_types::{StepError, StepSnapshot, StepState};

use crate::context::{RunContext, StartGate};
use crate::router::ErrorRouter;
use crate::rowset::RowSet;
use crate::step::{OutputGroup, Step, StepContext, StepSignal};

const EXIT_NONE: u8 = u8::MAX;

/// Milliseconds since the Unix epoch; snapshot timestamps.
pub(crate) fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Monotonic per-step counters: single writer (the owning worker),
/// concurrent readers.
#[derive(Debug, Default)]
pub(crate) struct StepCounters {
    read: AtomicU64,
    written: AtomicU64,
    updated: AtomicU64,
    rejected: AtomicU64,
    errors: AtomicU64,
}

impl StepCounters {
    pub(crate) fn inc_read(&self) {
        self.read.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_written(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_updated(&self) {
        self.updated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn read_count(&self) -> u64 {
        self.read.load(Ordering::Relaxed)
    }

    pub(crate) fn written_count(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub(crate) fn updated_count(&self) -> u64 {
        self.updated.load(Ordering::Relaxed)
    }

    pub(crate) fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub(crate) fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// Shared, observable state of one (step definition, copy) pair.
///
/// The input list sits behind a mutex only because external row
/// producers may be attached between `prepare` and `start`; workers
/// clone it once at spawn and never touch it again.
pub(crate) struct StepRuntime {
    name: String,
    copy: u32,
    state: AtomicU8,
    exit: AtomicU8,
    counters: Arc<StepCounters>,
    inputs: Mutex<Vec<Arc<RowSet>>>,
    outputs: Vec<Arc<RowSet>>,
}

impl StepRuntime {
    pub(crate) fn new(
        name: String,
        copy: u32,
        inputs: Vec<Arc<RowSet>>,
        outputs: Vec<Arc<RowSet>>,
    ) -> Self {
        Self {
            name,
            copy,
            state: AtomicU8::new(StepState::Created as u8),
            exit: AtomicU8::new(EXIT_NONE),
            counters: Arc::new(StepCounters::default()),
            inputs: Mutex::new(inputs),
            outputs,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn copy(&self) -> u32 {
        self.copy
    }

    pub(crate) fn counters(&self) -> &Arc<StepCounters> {
        &self.counters
    }

    pub(crate) fn state(&self) -> StepState {
        StepState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: StepState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// The terminal cause recorded before disposal: `Finished`,
    /// `Stopped`, or `Errored`. `None` while the loop is still running.
    pub(crate) fn exit_state(&self) -> Option<StepState> {
        match self.exit.load(Ordering::SeqCst) {
            EXIT_NONE => None,
            value => Some(StepState::from_u8(value)),
        }
    }

    fn record_exit(&self, state: StepState) {
        self.exit.store(state as u8, Ordering::SeqCst);
    }

    pub(crate) fn attach_input(&self, set: Arc<RowSet>) {
        self.inputs.lock().push(set);
    }

    pub(crate) fn input_sets(&self) -> Vec<Arc<RowSet>> {
        self.inputs.lock().clone()
    }

    pub(crate) fn output_sets(&self) -> &[Arc<RowSet>] {
        &self.outputs
    }

    /// Immutable counter capture with buffer-fill figures attached at
    /// sample time.
    pub(crate) fn snapshot(&self) -> StepSnapshot {
        StepSnapshot {
            step: self.name.clone(),
            copy: self.copy,
            state: self.state(),
            timestamp_ms: epoch_millis(),
            rows_read: self.counters.read_count(),
            rows_written: self.counters.written_count(),
            rows_updated: self.counters.updated_count(),
            rows_rejected: self.counters.rejected_count(),
            errors: self.counters.error_count(),
            input_fill: self.inputs.lock().iter().map(|s| s.fill()).sum(),
            output_fill: self.outputs.iter().map(|s| s.fill()).sum(),
        }
    }
}

/// Everything one worker thread owns: the plugin, its context, and the
/// shared runtime it reports into.
pub(crate) struct Worker {
    step: Box<dyn Step>,
    runtime: Arc<StepRuntime>,
    ctx: Arc<RunContext>,
    context: StepContext,
    completed: bool,
}

impl Worker {
    pub(crate) fn new(
        step: Box<dyn Step>,
        runtime: Arc<StepRuntime>,
        ctx: Arc<RunContext>,
        outputs: Vec<OutputGroup>,
        router: Option<ErrorRouter>,
    ) -> Self {
        let context = StepContext::new(
            runtime.name().to_string(),
            runtime.copy(),
            Arc::clone(&ctx),
            runtime.input_sets(),
            outputs,
            router,
            Arc::clone(runtime.counters()),
        );
        Self {
            step,
            runtime,
            ctx,
            context,
            completed: false,
        }
    }

    /// Drive the plugin's processing loop to a terminal state. Returns
    /// the fatal step error, if the loop ended in one.
    pub(crate) fn run(&mut self, gate: &StartGate) -> Option<StepError> {
        gate.wait_open(&self.ctx);
        self.runtime.set_state(StepState::Running);
        tracing::debug!(
            step = %self.runtime.name(),
            copy = self.runtime.copy(),
            "step running"
        );

        let mut failure = None;
        let exit = loop {
            if self.ctx.stop_requested() {
                break StepState::Stopped;
            }
            match self.step.process(&mut self.context) {
                Ok(StepSignal::Continue) => {}
                Ok(StepSignal::Done) => {
                    // A read or write cut short by a pending stop can
                    // surface as Done; the stop wins.
                    break if self.ctx.stop_requested() {
                        StepState::Stopped
                    } else {
                        StepState::Finished
                    };
                }
                Err(error) => {
                    self.runtime.counters().inc_errors();
                    tracing::error!(
                        step = %self.runtime.name(),
                        copy = self.runtime.copy(),
                        error = %error,
                        "fatal step error, stopping graph"
                    );
                    self.ctx.request_stop();
                    failure = Some(error);
                    break StepState::Errored;
                }
            }
        };

        self.finish(exit);
        failure
    }

    /// Terminal transition, row set release, and the single `dispose`
    /// call, shared by every exit path.
    fn finish(&mut self, exit: StepState) {
        if self.completed {
            return;
        }
        self.completed = true;

        self.runtime.set_state(exit);
        self.runtime.record_exit(exit);

        for output in self.runtime.output_sets() {
            output.mark_producer_done();
        }
        for input in &self.runtime.input_sets() {
            input.mark_consumer_done();
        }

        self.step.dispose();
        self.runtime.set_state(StepState::Disposed);

        let counters = self.runtime.counters();
        tracing::info!(
            step = %self.runtime.name(),
            copy = self.runtime.copy(),
            outcome = %exit,
            read = counters.read_count(),
            written = counters.written_count(),
            rejected = counters.rejected_count(),
            errors = counters.error_count(),
            "step disposed"
        );
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Reached only when the plugin panicked out of `run`: release
        // the row sets and dispose so the rest of the graph can unwind.
        if !self.completed {
            self.ctx.request_stop();
            self.runtime.counters().inc_errors();
            self.finish(StepState::Errored);
        }
    }
}
