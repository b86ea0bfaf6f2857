//! The step plugin contract and the per-worker context it runs
//! against.
//!
//! A step implementation sees the engine only through [`StepContext`]:
//! fair reads across its input row sets, policy-driven writes across
//! its output row sets, and recoverable-row diversion via
//! [`StepContext::reject`]. Ownership of a row transfers at each of
//! those calls: a row handed to `write` or `reject` cannot reach any
//! other path.

use std::sync::Arc;

use rowflow_types::{DispatchPolicy, Row, RowDiagnostic, StepError};

use crate::context::RunContext;
use crate::router::ErrorRouter;
use crate::rowset::RowSet;
use crate::runtime::StepCounters;

/// What the engine should do after a `process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSignal {
    /// Call `process` again.
    Continue,
    /// The step has no more work; outputs will be marked done.
    Done,
}

/// A unit of per-row transformation logic.
///
/// One instance exists per (step definition, copy); all calls happen on
/// that copy's worker thread, except `init`, which runs during graph
/// preparation before any thread starts.
///
/// Returning `Err` from `process` is always fatal for the whole graph.
/// Recoverable per-row failures are diverted with
/// [`StepContext::reject`] instead, which itself escalates to a fatal
/// error when no error sink is configured.
pub trait Step: Send {
    /// Resolve configuration and acquire resources. A failure here
    /// aborts graph preparation; no thread starts and no row flows.
    fn init(&mut self, config: &serde_json::Value) -> Result<(), StepError>;

    /// Process one unit of work: pull at most one row from the inputs
    /// (or synthesize rows, for source steps) and push any number of
    /// rows to the outputs.
    fn process(&mut self, ctx: &mut StepContext) -> Result<StepSignal, StepError>;

    /// Release resources. Called exactly once, after the processing
    /// loop has exited by any path.
    fn dispose(&mut self);
}

/// The output row sets of one hop, from the perspective of one
/// producing step copy, with that hop's distribution policy.
pub(crate) struct OutputGroup {
    dispatch: DispatchPolicy,
    targets: Vec<Arc<RowSet>>,
    next: usize,
}

impl OutputGroup {
    pub(crate) fn new(dispatch: DispatchPolicy, targets: Vec<Arc<RowSet>>) -> Self {
        Self {
            dispatch,
            targets,
            next: 0,
        }
    }

    /// Deliver `row` into this group. Round-robin hands it to exactly
    /// one live target, rotating; broadcast clones it to every live
    /// target. Targets whose consumer has finished are skipped.
    /// Returns `false` when no live target remains.
    fn deliver(&mut self, row: Row) -> bool {
        match self.dispatch {
            DispatchPolicy::RoundRobin => {
                let n = self.targets.len();
                let mut row = row;
                for k in 0..n {
                    let idx = (self.next + k) % n;
                    let target = &self.targets[idx];
                    if target.consumer_done() {
                        continue;
                    }
                    match target.offer(row) {
                        Ok(()) => {
                            self.next = (idx + 1) % n;
                            return true;
                        }
                        Err(refused) => row = refused,
                    }
                }
                false
            }
            DispatchPolicy::Broadcast => {
                let live: Vec<usize> = (0..self.targets.len())
                    .filter(|&i| !self.targets[i].consumer_done())
                    .collect();
                let mut delivered = false;
                // Each destination gets its own logical copy; the last
                // one takes ownership of the original.
                if let Some((&last, rest)) = live.split_last() {
                    for &i in rest {
                        delivered |= self.targets[i].put(row.clone());
                    }
                    delivered |= self.targets[last].put(row);
                }
                delivered
            }
        }
    }
}

/// Per-worker façade handed to [`Step::process`].
pub struct StepContext {
    step: String,
    copy: u32,
    ctx: Arc<RunContext>,
    inputs: Vec<Arc<RowSet>>,
    next_input: usize,
    outputs: Vec<OutputGroup>,
    router: Option<ErrorRouter>,
    counters: Arc<StepCounters>,
    seq: u64,
}

impl StepContext {
    pub(crate) fn new(
        step: String,
        copy: u32,
        ctx: Arc<RunContext>,
        inputs: Vec<Arc<RowSet>>,
        outputs: Vec<OutputGroup>,
        router: Option<ErrorRouter>,
        counters: Arc<StepCounters>,
    ) -> Self {
        Self {
            step,
            copy,
            ctx,
            inputs,
            next_input: 0,
            outputs,
            router,
            counters,
            seq: 0,
        }
    }

    /// Pull the next row, polling all non-exhausted inputs fairly
    /// (round-robin with skip-if-empty) so no upstream producer is
    /// starved. Blocks in bounded slices while every live input is
    /// empty.
    ///
    /// Returns `None` once every input is drained-and-done, or once a
    /// stop is pending; source steps (no inputs) always get `None`.
    pub fn read(&mut self) -> Option<Row> {
        if self.inputs.is_empty() {
            return None;
        }
        loop {
            if self.ctx.stop_requested() {
                return None;
            }
            let n = self.inputs.len();
            let mut any_live = false;
            for k in 0..n {
                let idx = (self.next_input + k) % n;
                let set = &self.inputs[idx];
                if set.exhausted() {
                    continue;
                }
                any_live = true;
                if let Some(row) = set.try_get() {
                    self.next_input = (idx + 1) % n;
                    self.seq += 1;
                    self.counters.inc_read();
                    return Some(row);
                }
            }
            if !any_live {
                return None;
            }
            // Everything live is momentarily empty; park briefly on the
            // rotation cursor's set rather than spinning.
            self.inputs[self.next_input % n].wait_for_data(self.ctx.poll_interval());
        }
    }

    /// Push a row to the step's outputs: every outgoing hop receives
    /// the row, distributed across that hop's consumer copies per its
    /// policy. Blocks under backpressure.
    ///
    /// Returns `false` only when a stop is pending or no live consumer
    /// remains anywhere; the caller should then wind down normally.
    /// A step with no outputs at all accepts (and drops) every row.
    pub fn write(&mut self, row: Row) -> bool {
        if self.ctx.stop_requested() {
            return false;
        }
        if self.outputs.is_empty() {
            self.counters.inc_written();
            return true;
        }
        let mut delivered = false;
        if let Some((last, rest)) = self.outputs.split_last_mut() {
            for group in rest {
                delivered |= group.deliver(row.clone());
            }
            delivered |= last.deliver(row);
        }
        if delivered {
            self.counters.inc_written();
        }
        delivered
    }

    /// Divert a row that failed recoverably to the step's error sink,
    /// with `error` rendered into the appended diagnostic columns.
    ///
    /// With no error sink configured the error is handed back so the
    /// caller can propagate it (`ctx.reject(row, err)?`); every
    /// recoverable error then becomes fatal for this step, as required.
    pub fn reject(&mut self, row: Row, error: StepError) -> Result<(), StepError> {
        let Some(router) = &self.router else {
            return Err(error);
        };
        let diag = RowDiagnostic::from_error(self.seq, &error);
        if router.route(row, &diag) {
            self.counters.inc_rejected();
            Ok(())
        } else if self.ctx.stop_requested() {
            // The run is unwinding; the worker loop observes the stop
            // before its next process call.
            Ok(())
        } else {
            Err(error)
        }
    }

    /// Bump the updated-rows counter, for steps that update an external
    /// resource rather than writing rows downstream.
    pub fn inc_updated(&self) {
        self.counters.inc_updated();
    }

    /// Sequence number of the most recently read row (1-based); 0
    /// before the first read.
    #[must_use]
    pub fn rows_read(&self) -> u64 {
        self.seq
    }

    /// `true` once a graph-wide stop is pending.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.ctx.stop_requested()
    }

    #[must_use]
    pub fn step_name(&self) -> &str {
        &self.step
    }

    #[must_use]
    pub fn copy(&self) -> u32 {
        self.copy
    }
}
