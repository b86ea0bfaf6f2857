//! Graph controller: builds the runtime graph from a definition,
//! starts the workers behind a gate, and coordinates stop and
//! completion.
//!
//! `prepare` does everything that can fail before a thread exists:
//! validation, plugin resolution, row set allocation, plugin `init`.
//! `start` only spawns and releases workers; `await_completion` joins
//! them and aggregates the outcome. The shared stop flag lives in a
//! [`RunContext`] handed to every worker and row set at construction,
//! never a process-wide singleton.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use rowflow_types::{
    GraphDefinition, GraphOutcome, Row, StepError, StepSnapshot, StepState,
};

use crate::context::{RunContext, StartGate};
use crate::definition::validate_definition;
use crate::errors::EngineError;
use crate::registry::StepRegistry;
use crate::router::ErrorRouter;
use crate::rowset::RowSet;
use crate::runtime::{StepRuntime, Worker};
use crate::step::{OutputGroup, Step};

/// Aggregated result of one graph run.
#[derive(Debug)]
pub struct GraphResult {
    pub outcome: GraphOutcome,
    /// Total error count across all step copies.
    pub errors: u64,
    /// First fatal failure, when the outcome is `Errored`.
    pub failure: Option<EngineError>,
}

/// External feed into one entry step copy, attached before `start`.
///
/// Cloneable so an embedding caller can inject from several threads;
/// the end-of-input signal is idempotent.
#[derive(Clone)]
pub struct RowProducer {
    set: Arc<RowSet>,
}

impl RowProducer {
    /// Enqueue a row for the entry step, blocking under backpressure.
    /// Returns `false` once the step has finished or the run stopped.
    pub fn inject(&self, row: Row) -> bool {
        self.set.put(row)
    }

    /// Signal that no more input will arrive.
    pub fn finished(&self) {
        self.set.mark_producer_done();
    }
}

/// Read-only counter/state view of a running graph, cheap to clone and
/// safe to hold from another thread (the sampler holds one).
#[derive(Clone)]
pub struct GraphMonitor {
    runtimes: Arc<Vec<Arc<StepRuntime>>>,
}

impl GraphMonitor {
    /// Snapshot every step copy's counters, state, and buffer fill.
    #[must_use]
    pub fn snapshot(&self) -> Vec<StepSnapshot> {
        self.runtimes.iter().map(|r| r.snapshot()).collect()
    }
}

/// Everything built at prepare time for one step copy, consumed when
/// its worker spawns.
struct Seed {
    step: Box<dyn Step>,
    runtime: Arc<StepRuntime>,
    outputs: Vec<OutputGroup>,
    router: Option<ErrorRouter>,
}

/// A prepared (and then running) transformation graph.
pub struct Graph {
    name: String,
    ctx: Arc<RunContext>,
    gate: Arc<StartGate>,
    rowset_capacity: usize,
    runtimes: Arc<Vec<Arc<StepRuntime>>>,
    index: HashMap<(String, u32), usize>,
    seeds: Vec<Seed>,
    handles: Vec<(usize, JoinHandle<Option<StepError>>)>,
    injectors: HashMap<(String, u32), Arc<RowSet>>,
    started: bool,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

impl Graph {
    /// Validate `definition`, build every step runtime and row set, and
    /// initialize every plugin.
    ///
    /// # Errors
    ///
    /// [`EngineError::Validation`] listing every definition problem, or
    /// [`EngineError::Initialization`] for the first plugin whose
    /// `init` failed; in both cases nothing has started and no row has
    /// flowed.
    pub fn prepare(
        definition: &GraphDefinition,
        registry: &StepRegistry,
    ) -> Result<Self, EngineError> {
        validate_definition(definition, registry)?;

        let ctx = Arc::new(RunContext::new(Duration::from_millis(
            definition.settings.poll_interval_ms,
        )));
        let capacity = definition.settings.rowset_capacity;

        // One row set per (producer copy, consumer copy) pair of every
        // hop, grouped per hop on the producer side for dispatch.
        let mut out_groups: HashMap<(String, u32), Vec<OutputGroup>> = HashMap::new();
        let mut out_sets: HashMap<(String, u32), Vec<Arc<RowSet>>> = HashMap::new();
        let mut in_sets: HashMap<(String, u32), Vec<Arc<RowSet>>> = HashMap::new();

        for hop in &definition.hops {
            let producer = definition.step(&hop.from).expect("validated hop endpoint");
            let consumer = definition.step(&hop.to).expect("validated hop endpoint");
            for p in 0..producer.copies {
                let mut targets = Vec::with_capacity(consumer.copies as usize);
                for c in 0..consumer.copies {
                    let set = Arc::new(RowSet::new(
                        format!("{}.{p} -> {}.{c}", hop.from, hop.to),
                        capacity,
                        Arc::clone(&ctx),
                    ));
                    in_sets
                        .entry((hop.to.clone(), c))
                        .or_default()
                        .push(Arc::clone(&set));
                    out_sets
                        .entry((hop.from.clone(), p))
                        .or_default()
                        .push(Arc::clone(&set));
                    targets.push(set);
                }
                out_groups
                    .entry((hop.from.clone(), p))
                    .or_default()
                    .push(OutputGroup::new(hop.dispatch, targets));
            }
        }

        // One dedicated error row set per producing copy, consumed by a
        // sink copy chosen by rotation.
        let mut routers: HashMap<(String, u32), ErrorRouter> = HashMap::new();
        for step in &definition.steps {
            let Some(sink) = &step.error_sink else {
                continue;
            };
            let target = definition.step(&sink.target).expect("validated error sink");
            for p in 0..step.copies {
                let c = p % target.copies;
                let set = Arc::new(RowSet::new(
                    format!("{}.{p} =err=> {}.{c}", step.name, sink.target),
                    capacity,
                    Arc::clone(&ctx),
                ));
                in_sets
                    .entry((sink.target.clone(), c))
                    .or_default()
                    .push(Arc::clone(&set));
                out_sets
                    .entry((step.name.clone(), p))
                    .or_default()
                    .push(Arc::clone(&set));
                routers.insert(
                    (step.name.clone(), p),
                    ErrorRouter::new(step.name.clone(), p, sink.clone(), set),
                );
            }
        }

        // Instantiate one runtime + plugin per (step, copy).
        let mut runtimes = Vec::new();
        let mut seeds = Vec::new();
        let mut index = HashMap::new();
        for step_def in &definition.steps {
            for copy in 0..step_def.copies {
                let key = (step_def.name.clone(), copy);
                let Some(plugin) = registry.create(&step_def.kind) else {
                    return Err(EngineError::Validation(vec![format!(
                        "step '{}' references unresolvable kind '{}'",
                        step_def.name, step_def.kind
                    )]));
                };
                let runtime = Arc::new(StepRuntime::new(
                    step_def.name.clone(),
                    copy,
                    in_sets.remove(&key).unwrap_or_default(),
                    out_sets.remove(&key).unwrap_or_default(),
                ));
                index.insert(key.clone(), runtimes.len());
                runtimes.push(Arc::clone(&runtime));
                seeds.push(Seed {
                    step: plugin,
                    runtime,
                    outputs: out_groups.remove(&key).unwrap_or_default(),
                    router: routers.remove(&key),
                });
            }
        }

        // Initialize every plugin before any thread exists; a failure
        // here aborts the whole preparation, with every
        // already-initialized plugin disposed again.
        let defs: Vec<_> = definition
            .steps
            .iter()
            .flat_map(|s| std::iter::repeat(s).take(s.copies as usize))
            .collect();
        for i in 0..seeds.len() {
            if let Err(source) = seeds[i].step.init(&defs[i].config) {
                tracing::error!(
                    step = %defs[i].name,
                    error = %source,
                    "step initialization failed, aborting graph preparation"
                );
                for seed in &mut seeds[..i] {
                    seed.step.dispose();
                    seed.runtime.set_state(StepState::Disposed);
                }
                return Err(EngineError::Initialization {
                    step: defs[i].name.clone(),
                    source,
                });
            }
            seeds[i].runtime.set_state(StepState::Initialized);
        }

        tracing::info!(
            graph = %definition.name,
            steps = runtimes.len(),
            "graph prepared"
        );

        Ok(Self {
            name: definition.name.clone(),
            ctx,
            gate: Arc::new(StartGate::default()),
            rowset_capacity: capacity,
            runtimes: Arc::new(runtimes),
            index,
            seeds,
            handles: Vec::new(),
            injectors: HashMap::new(),
            started: false,
        })
    }

    /// Attach an external row feed to an entry step copy. Must be
    /// called before [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Fails if the graph already started or the step copy is unknown.
    pub fn add_row_producer(
        &mut self,
        step: &str,
        copy: u32,
    ) -> Result<RowProducer, EngineError> {
        if self.started {
            return Err(EngineError::Infrastructure(anyhow::anyhow!(
                "row producers must be attached before start()"
            )));
        }
        let key = (step.to_string(), copy);
        let Some(&idx) = self.index.get(&key) else {
            return Err(EngineError::Validation(vec![format!(
                "unknown step '{step}' copy {copy}"
            )]));
        };
        let set = Arc::new(RowSet::new(
            format!("(external) -> {step}.{copy}"),
            self.rowset_capacity,
            Arc::clone(&self.ctx),
        ));
        self.runtimes[idx].attach_input(Arc::clone(&set));
        self.injectors.insert(key, Arc::clone(&set));
        Ok(RowProducer { set })
    }

    /// Spawn one worker thread per step copy, hold them all at the
    /// start gate, and release them together.
    ///
    /// # Errors
    ///
    /// Fails if called twice or if a thread cannot be spawned; in the
    /// latter case the run is stopped and already-spawned workers
    /// unwind cleanly.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.started {
            return Err(EngineError::Infrastructure(anyhow::anyhow!(
                "graph '{}' already started",
                self.name
            )));
        }
        self.started = true;

        for seed in self.seeds.drain(..) {
            let idx = self.index[&(seed.runtime.name().to_string(), seed.runtime.copy())];
            let thread_name = format!(
                "{}:{}.{}",
                self.name,
                seed.runtime.name(),
                seed.runtime.copy()
            );
            let mut worker = Worker::new(
                seed.step,
                Arc::clone(&seed.runtime),
                Arc::clone(&self.ctx),
                seed.outputs,
                seed.router,
            );
            let gate = Arc::clone(&self.gate);
            let spawned = std::thread::Builder::new()
                .name(thread_name)
                .spawn(move || worker.run(&gate));
            match spawned {
                Ok(handle) => self.handles.push((idx, handle)),
                Err(e) => {
                    // Release and unwind whatever already spawned.
                    self.ctx.request_stop();
                    self.gate.open();
                    return Err(EngineError::Infrastructure(anyhow::Error::new(e).context(
                        format!("failed to spawn worker thread for graph '{}'", self.name),
                    )));
                }
            }
        }

        self.gate.open();
        tracing::info!(graph = %self.name, workers = self.handles.len(), "graph started");
        Ok(())
    }

    /// Raise the cooperative stop flag. All blocked row set operations
    /// and running loops observe it within one poll interval.
    pub fn request_stop(&self) {
        tracing::info!(graph = %self.name, "stop requested");
        self.ctx.request_stop();
    }

    /// Block until every step copy has reached `Disposed`, then
    /// aggregate the overall outcome and error count.
    pub fn await_completion(&mut self) -> GraphResult {
        let mut failure: Option<EngineError> = None;

        if !self.started {
            return GraphResult {
                outcome: GraphOutcome::Errored,
                errors: 0,
                failure: Some(EngineError::Infrastructure(anyhow::anyhow!(
                    "await_completion() called before start()"
                ))),
            };
        }

        let mut panicked = false;
        for (idx, handle) in self.handles.drain(..) {
            let runtime = &self.runtimes[idx];
            match handle.join() {
                Ok(Some(source)) if failure.is_none() => {
                    failure = Some(EngineError::Step {
                        step: runtime.name().to_string(),
                        copy: runtime.copy(),
                        source,
                    });
                }
                Ok(_) => {}
                Err(_) => {
                    panicked = true;
                    if failure.is_none() {
                        failure = Some(EngineError::Infrastructure(anyhow::anyhow!(
                            "worker thread for step '{}' (copy {}) panicked",
                            runtime.name(),
                            runtime.copy()
                        )));
                    }
                }
            }
        }

        let errors = self.error_count();
        let errored = panicked
            || self
                .runtimes
                .iter()
                .any(|r| r.exit_state() == Some(StepState::Errored));

        let outcome = if errored {
            GraphOutcome::Errored
        } else if self.ctx.stop_requested() {
            GraphOutcome::Stopped
        } else if errors == 0 {
            GraphOutcome::Finished
        } else {
            GraphOutcome::Errored
        };

        tracing::info!(
            graph = %self.name,
            outcome = %outcome,
            errors,
            "graph completed"
        );

        GraphResult {
            outcome,
            errors,
            failure,
        }
    }

    /// Feed one row into an entry step copy attached via
    /// [`add_row_producer`](Self::add_row_producer). Blocks under
    /// backpressure; `false` once the step finished or the run stopped.
    ///
    /// # Errors
    ///
    /// Fails if no row producer is attached to that step copy.
    pub fn inject_row(&self, step: &str, copy: u32, row: Row) -> Result<bool, EngineError> {
        let set = self.injector(step, copy)?;
        Ok(set.put(row))
    }

    /// Terminate the external input of an entry step copy.
    ///
    /// # Errors
    ///
    /// Fails if no row producer is attached to that step copy.
    pub fn signal_no_more_input(&self, step: &str, copy: u32) -> Result<(), EngineError> {
        let set = self.injector(step, copy)?;
        set.mark_producer_done();
        Ok(())
    }

    fn injector(&self, step: &str, copy: u32) -> Result<&Arc<RowSet>, EngineError> {
        self.injectors
            .get(&(step.to_string(), copy))
            .ok_or_else(|| {
                EngineError::Validation(vec![format!(
                    "no row producer attached to step '{step}' copy {copy}"
                )])
            })
    }

    /// Total error count across all step copies.
    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.runtimes
            .iter()
            .map(|r| r.counters().error_count())
            .sum()
    }

    /// Lifecycle state of one step copy.
    #[must_use]
    pub fn step_state(&self, step: &str, copy: u32) -> Option<StepState> {
        self.index
            .get(&(step.to_string(), copy))
            .map(|&idx| self.runtimes[idx].state())
    }

    /// Point-in-time snapshot of every step copy.
    #[must_use]
    pub fn snapshot(&self) -> Vec<StepSnapshot> {
        self.runtimes.iter().map(|r| r.snapshot()).collect()
    }

    /// A cloneable observation handle for the sampler.
    #[must_use]
    pub fn monitor(&self) -> GraphMonitor {
        GraphMonitor {
            runtimes: Arc::clone(&self.runtimes),
        }
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        if self.started {
            // Detached workers wind down on their own once asked.
            if !self.handles.is_empty() {
                self.ctx.request_stop();
            }
            return;
        }
        // Never started: the prepare-time init must still be paired
        // with dispose.
        for seed in &mut self.seeds {
            seed.step.dispose();
            seed.runtime.set_state(StepState::Disposed);
        }
    }
}
