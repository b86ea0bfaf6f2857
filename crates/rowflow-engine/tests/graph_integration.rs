//! End-to-end engine tests: full graphs run through prepare, start,
//! and completion, exercising backpressure, error routing,
//! cancellation, and sampling against real worker threads.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rowflow_engine::steps::{Collector, CollectorHandle};
use rowflow_engine::{
    EngineError, Graph, PerformanceSampler, Step, StepContext, StepRegistry, StepSignal,
};
use rowflow_types::{
    ColumnDescriptor, ColumnKind, ErrorSink, GraphDefinition, GraphOutcome, HopDefinition, Row,
    RowSchema, StepDefinition, StepError, StepState, Value,
};

fn registry_with_collector(handle: &CollectorHandle) -> StepRegistry {
    let mut registry = StepRegistry::with_builtin_steps();
    let handle = handle.clone();
    registry.register("collector", move || {
        Box::new(Collector::with_handle(handle.clone()))
    });
    registry
}

fn people_schema() -> Arc<RowSchema> {
    Arc::new(RowSchema::new(vec![
        ColumnDescriptor::new("id", ColumnKind::Integer),
        ColumnDescriptor::new("name", ColumnKind::Text),
    ]))
}

fn person(schema: &Arc<RowSchema>, id: i64, name: Option<&str>) -> Row {
    Row::new(
        Arc::clone(schema),
        vec![
            Value::Integer(id),
            name.map_or(Value::Null, |n| Value::Text(n.into())),
        ],
    )
}

fn seq_of(row: &Row) -> i64 {
    match row.value("seq") {
        Some(Value::Integer(v)) => *v,
        other => panic!("expected integer seq column, got {other:?}"),
    }
}

/// Scenario A: a 1000-row source through a capacity-5 pass-through into
/// a sink arrives complete, in order, with a clean outcome.
#[test]
fn thousand_rows_arrive_complete_and_ordered() {
    let collected = CollectorHandle::new();
    let registry = registry_with_collector(&collected);

    let mut def = GraphDefinition::new("scenario_a")
        .add_step(
            StepDefinition::new("gen", "row_generator")
                .with_config(serde_json::json!({ "rows": 1000 })),
        )
        .add_step(StepDefinition::new("pass", "passthrough"))
        .add_step(StepDefinition::new("sink", "collector"))
        .add_hop(HopDefinition::new("gen", "pass"))
        .add_hop(HopDefinition::new("pass", "sink"));
    def.settings.rowset_capacity = 5;

    let mut graph = Graph::prepare(&def, &registry).expect("prepare");
    graph.start().expect("start");
    let result = graph.await_completion();

    assert_eq!(result.outcome, GraphOutcome::Finished);
    assert_eq!(result.errors, 0);
    assert!(result.failure.is_none());

    let rows = collected.rows();
    assert_eq!(rows.len(), 1000);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(seq_of(row), i64::try_from(i).unwrap(), "row order broken");
    }

    for step in ["gen", "pass", "sink"] {
        assert_eq!(graph.step_state(step, 0), Some(StepState::Disposed));
    }
}

/// Scenario B: recoverable failures are diverted to the error sink
/// with diagnostics, without escalating and without leaking onto the
/// normal path.
#[test]
fn recoverable_errors_are_absorbed_by_the_error_sink() {
    let good = CollectorHandle::new();
    let bad = CollectorHandle::new();
    let mut registry = StepRegistry::with_builtin_steps();
    {
        let good = good.clone();
        registry.register("good_sink", move || {
            Box::new(Collector::with_handle(good.clone()))
        });
    }
    {
        let bad = bad.clone();
        registry.register("error_sink", move || {
            Box::new(Collector::with_handle(bad.clone()))
        });
    }

    let def = GraphDefinition::new("scenario_b")
        .add_step(StepDefinition::new("in", "injector"))
        .add_step(
            StepDefinition::new("check", "field_validator")
                .with_config(serde_json::json!({ "field": "name" }))
                .with_error_sink(ErrorSink::to_step("reject_log")),
        )
        .add_step(StepDefinition::new("out", "good_sink"))
        .add_step(StepDefinition::new("reject_log", "error_sink"))
        .add_hop(HopDefinition::new("in", "check"))
        .add_hop(HopDefinition::new("check", "out"));

    let mut graph = Graph::prepare(&def, &registry).expect("prepare");
    let producer = graph.add_row_producer("in", 0).expect("producer");
    graph.start().expect("start");

    let schema = people_schema();
    for i in 0..100 {
        let name = if i == 10 || i == 55 { None } else { Some("ok") };
        assert!(producer.inject(person(&schema, i, name)));
    }
    producer.finished();

    let result = graph.await_completion();
    assert_eq!(result.outcome, GraphOutcome::Finished);
    assert_eq!(result.errors, 0, "absorbed errors must not escalate");

    assert_eq!(good.len(), 98);
    let diverted = bad.rows();
    assert_eq!(diverted.len(), 2);

    let mut bad_ids = Vec::new();
    let mut bad_positions = Vec::new();
    for row in &diverted {
        match row.value("id") {
            Some(Value::Integer(id)) => bad_ids.push(*id),
            other => panic!("diverted row lost its id column: {other:?}"),
        }
        match row.value("error_row_number") {
            Some(Value::Integer(n)) => bad_positions.push(*n),
            other => panic!("missing error_row_number: {other:?}"),
        }
        match row.value("error_message") {
            Some(Value::Text(msg)) => assert!(!msg.is_empty()),
            other => panic!("missing error_message: {other:?}"),
        }
        assert_eq!(
            row.value("error_field"),
            Some(&Value::Text("name".into()))
        );
    }
    bad_ids.sort_unstable();
    bad_positions.sort_unstable();
    assert_eq!(bad_ids, vec![10, 55]);
    // 1-based read positions within the validator.
    assert_eq!(bad_positions, vec![11, 56]);

    // Mutual exclusion: a diverted row never also reaches the normal
    // sink.
    for row in good.rows() {
        match row.value("id") {
            Some(Value::Integer(id)) => assert!(*id != 10 && *id != 55),
            other => panic!("normal row lost its id column: {other:?}"),
        }
    }

    // The validator's own counters: rejected, not errored.
    let snapshots = graph.snapshot();
    let check = snapshots
        .iter()
        .find(|s| s.step == "check")
        .expect("validator snapshot");
    assert_eq!(check.rows_read, 100);
    assert_eq!(check.rows_written, 98);
    assert_eq!(check.rows_rejected, 2);
    assert_eq!(check.errors, 0);
}

/// A step that accepts rows but never drains its input in time,
/// keeping upstream row sets full.
struct StallSink;

impl Step for StallSink {
    fn init(&mut self, _config: &serde_json::Value) -> Result<(), StepError> {
        Ok(())
    }

    fn process(&mut self, _ctx: &mut StepContext) -> Result<StepSignal, StepError> {
        std::thread::sleep(Duration::from_millis(50));
        Ok(StepSignal::Continue)
    }

    fn dispose(&mut self) {}
}

/// Scenario C: a stop request releases workers blocked in `put` (full
/// row set) and `get` (empty row set) alike; everything disposes and
/// the outcome is `Stopped`, within a bounded number of poll
/// intervals.
#[test]
fn stop_releases_blocked_producers_and_consumers() {
    let mut registry = StepRegistry::with_builtin_steps();
    registry.register("stall_sink", || Box::new(StallSink));

    let mut def = GraphDefinition::new("scenario_c")
        // Branch 1: generator blocks in put against a stalled consumer.
        .add_step(
            StepDefinition::new("gen", "row_generator")
                .with_config(serde_json::json!({ "rows": 1_000_000 })),
        )
        .add_step(StepDefinition::new("stall", "stall_sink"))
        .add_hop(HopDefinition::new("gen", "stall"))
        // Branch 2: a consumer blocks in get against an input that
        // never produces.
        .add_step(StepDefinition::new("idle_in", "injector"))
        .add_step(StepDefinition::new("idle_out", "passthrough"))
        .add_hop(HopDefinition::new("idle_in", "idle_out"));
    def.settings.rowset_capacity = 4;

    let mut graph = Graph::prepare(&def, &registry).expect("prepare");
    let _producer = graph.add_row_producer("idle_in", 0).expect("producer");
    graph.start().expect("start");

    // Let both branches reach their blocking states.
    std::thread::sleep(Duration::from_millis(100));
    graph.request_stop();

    let deadline = Instant::now();
    let result = graph.await_completion();
    let waited = deadline.elapsed();

    assert_eq!(result.outcome, GraphOutcome::Stopped);
    assert_eq!(result.errors, 0, "a requested stop is not an error");
    assert!(
        waited < Duration::from_secs(2),
        "completion took {waited:?}, cancellation is not live"
    );
    for step in ["gen", "stall", "idle_in", "idle_out"] {
        assert_eq!(graph.step_state(step, 0), Some(StepState::Disposed));
    }
}

/// Round-robin across parallel copies delivers every row exactly once.
#[test]
fn parallel_copies_share_the_stream_without_loss() {
    let collected = CollectorHandle::new();
    let registry = registry_with_collector(&collected);

    let def = GraphDefinition::new("fanout")
        .add_step(
            StepDefinition::new("gen", "row_generator")
                .with_config(serde_json::json!({ "rows": 300 })),
        )
        .add_step(StepDefinition::new("pass", "passthrough").with_copies(3))
        .add_step(StepDefinition::new("sink", "collector"))
        .add_hop(HopDefinition::new("gen", "pass"))
        .add_hop(HopDefinition::new("pass", "sink"));

    let mut graph = Graph::prepare(&def, &registry).expect("prepare");
    graph.start().expect("start");
    let result = graph.await_completion();

    assert_eq!(result.outcome, GraphOutcome::Finished);
    let mut seqs: Vec<i64> = collected.rows().iter().map(seq_of).collect();
    seqs.sort_unstable();
    assert_eq!(seqs, (0..300).collect::<Vec<_>>());
}

/// Broadcast dispatch hands every row to every consumer copy.
#[test]
fn broadcast_copies_every_row_to_every_consumer_copy() {
    let collected = CollectorHandle::new();
    let registry = registry_with_collector(&collected);

    let def = GraphDefinition::new("broadcast")
        .add_step(
            StepDefinition::new("gen", "row_generator")
                .with_config(serde_json::json!({ "rows": 50 })),
        )
        .add_step(StepDefinition::new("sink", "collector").with_copies(2))
        .add_hop(HopDefinition::new("gen", "sink").broadcast());

    let mut graph = Graph::prepare(&def, &registry).expect("prepare");
    graph.start().expect("start");
    let result = graph.await_completion();

    assert_eq!(result.outcome, GraphOutcome::Finished);
    let mut seqs: Vec<i64> = collected.rows().iter().map(seq_of).collect();
    seqs.sort_unstable();
    let expected: Vec<i64> = (0..50).flat_map(|i| [i, i]).collect();
    assert_eq!(seqs, expected);
}

/// External injection feeds an entry step and terminates it cleanly.
#[test]
fn injected_rows_flow_to_the_sink() {
    let collected = CollectorHandle::new();
    let registry = registry_with_collector(&collected);

    let def = GraphDefinition::new("inject")
        .add_step(StepDefinition::new("in", "injector"))
        .add_step(StepDefinition::new("sink", "collector"))
        .add_hop(HopDefinition::new("in", "sink"));

    let mut graph = Graph::prepare(&def, &registry).expect("prepare");
    graph.add_row_producer("in", 0).expect("producer");
    graph.start().expect("start");

    let schema = people_schema();
    for i in 0..5 {
        assert!(graph.inject_row("in", 0, person(&schema, i, Some("x"))).expect("inject"));
    }
    graph.signal_no_more_input("in", 0).expect("signal");

    let result = graph.await_completion();
    assert_eq!(result.outcome, GraphOutcome::Finished);
    assert_eq!(collected.len(), 5);
}

/// A fatal step error stops the whole graph and surfaces as the run's
/// failure.
struct FailingStep {
    after: u64,
    seen: u64,
}

impl Step for FailingStep {
    fn init(&mut self, _config: &serde_json::Value) -> Result<(), StepError> {
        Ok(())
    }

    fn process(&mut self, ctx: &mut StepContext) -> Result<StepSignal, StepError> {
        match ctx.read() {
            Some(row) => {
                self.seen += 1;
                if self.seen > self.after {
                    return Err(StepError::resource("simulated resource loss"));
                }
                ctx.write(row);
                Ok(StepSignal::Continue)
            }
            None => Ok(StepSignal::Done),
        }
    }

    fn dispose(&mut self) {}
}

#[test]
fn fatal_step_error_stops_the_graph() {
    let collected = CollectorHandle::new();
    let mut registry = registry_with_collector(&collected);
    registry.register("fail_after", || {
        Box::new(FailingStep { after: 10, seen: 0 })
    });

    let def = GraphDefinition::new("fatal")
        .add_step(
            StepDefinition::new("gen", "row_generator")
                .with_config(serde_json::json!({ "rows": 100_000 })),
        )
        .add_step(StepDefinition::new("boom", "fail_after"))
        .add_step(StepDefinition::new("sink", "collector"))
        .add_hop(HopDefinition::new("gen", "boom"))
        .add_hop(HopDefinition::new("boom", "sink"));

    let mut graph = Graph::prepare(&def, &registry).expect("prepare");
    graph.start().expect("start");
    let result = graph.await_completion();

    assert_eq!(result.outcome, GraphOutcome::Errored);
    assert_eq!(result.errors, 1);
    match result.failure {
        Some(EngineError::Step { step, copy, source }) => {
            assert_eq!(step, "boom");
            assert_eq!(copy, 0);
            assert!(!source.recoverable);
        }
        other => panic!("expected step failure, got {other:?}"),
    }
    assert_eq!(graph.step_state("boom", 0), Some(StepState::Disposed));
    assert_eq!(graph.step_state("gen", 0), Some(StepState::Disposed));
}

/// Validation failures are reported before anything is instantiated.
#[test]
fn bad_definition_fails_prepare_with_every_problem() {
    let registry = StepRegistry::with_builtin_steps();
    let def = GraphDefinition::new("bad")
        .add_step(StepDefinition::new("a", "no_such_kind"))
        .add_hop(HopDefinition::new("a", "ghost"));

    match Graph::prepare(&def, &registry) {
        Err(EngineError::Validation(problems)) => {
            assert!(problems.len() >= 2, "expected both problems, got {problems:?}");
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}

/// Initialization failures abort preparation before any thread starts.
#[test]
fn init_failure_aborts_preparation() {
    let registry = StepRegistry::with_builtin_steps();
    // field_validator without its required `field` key fails init.
    let def = GraphDefinition::new("noinit")
        .add_step(StepDefinition::new("gen", "row_generator")
            .with_config(serde_json::json!({ "rows": 10 })))
        .add_step(StepDefinition::new("check", "field_validator"))
        .add_hop(HopDefinition::new("gen", "check"));

    match Graph::prepare(&def, &registry) {
        Err(EngineError::Initialization { step, source }) => {
            assert_eq!(step, "check");
            assert!(!source.recoverable);
        }
        other => panic!("expected initialization failure, got {other:?}"),
    }
}

/// The sampler observes a running graph without disturbing it, and its
/// final figures agree with the sink's contents.
#[test]
fn sampler_tracks_counters_through_a_run() {
    let collected = CollectorHandle::new();
    let registry = registry_with_collector(&collected);

    let def = GraphDefinition::new("sampled")
        .add_step(
            StepDefinition::new("gen", "row_generator")
                .with_config(serde_json::json!({ "rows": 2000 })),
        )
        .add_step(StepDefinition::new("sink", "collector"))
        .add_hop(HopDefinition::new("gen", "sink"));

    let mut graph = Graph::prepare(&def, &registry).expect("prepare");
    let mut sampler =
        PerformanceSampler::start(graph.monitor(), Duration::from_millis(10), 64);

    graph.start().expect("start");
    let result = graph.await_completion();
    assert_eq!(result.outcome, GraphOutcome::Finished);

    // One final settled sample after completion.
    std::thread::sleep(Duration::from_millis(30));
    sampler.stop();

    let latest = sampler.latest().expect("at least one sample");
    let gen = latest.iter().find(|s| s.step == "gen").expect("gen sample");
    assert_eq!(gen.rows_written, 2000);
    assert_eq!(gen.state, StepState::Disposed);
    let sink = latest.iter().find(|s| s.step == "sink").expect("sink sample");
    assert_eq!(sink.rows_read, 2000);
    assert_eq!(sink.input_fill, 0, "drained run should leave empty buffers");

    // Deltas remain well-formed whatever the sampling phase caught.
    for delta in sampler.deltas() {
        assert!(delta.rows_read <= 2000);
    }
}
