//! Core execution engine for rowflow transformation graphs.
//!
//! The engine runs a directed graph of steps, one worker thread per
//! step copy, wired together by bounded blocking row sets. It owns the
//! step lifecycle state machine, backpressure, cooperative stop,
//! per-row error routing, and performance sampling; the steps
//! themselves are plugins behind the [`Step`] trait.
//!
//! ```no_run
//! use rowflow_engine::{Graph, StepRegistry};
//! use rowflow_types::{GraphDefinition, HopDefinition, StepDefinition};
//!
//! let def = GraphDefinition::new("demo")
//!     .add_step(
//!         StepDefinition::new("gen", "row_generator")
//!             .with_config(serde_json::json!({ "rows": 1000 })),
//!     )
//!     .add_step(StepDefinition::new("out", "passthrough"))
//!     .add_hop(HopDefinition::new("gen", "out"));
//!
//! let registry = StepRegistry::with_builtin_steps();
//! let mut graph = Graph::prepare(&def, &registry)?;
//! graph.start()?;
//! let result = graph.await_completion();
//! assert!(result.outcome.is_finished());
//! # Ok::<(), rowflow_engine::EngineError>(())
//! ```

pub mod context;
pub mod definition;
pub mod errors;
pub mod graph;
pub mod registry;
pub mod router;
pub mod rowset;
pub mod sampler;
pub mod step;
pub mod steps;

mod runtime;

pub use context::RunContext;
pub use errors::EngineError;
pub use graph::{Graph, GraphMonitor, GraphResult, RowProducer};
pub use registry::StepRegistry;
pub use rowset::RowSet;
pub use sampler::PerformanceSampler;
pub use step::{Step, StepContext, StepSignal};
