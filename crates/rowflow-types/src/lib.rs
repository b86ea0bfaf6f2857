//! Shared rowflow data model, definition, error, and metric types.
//!
//! Pure data types used by both the execution engine and step
//! implementations, kept dependency-light so either side can consume
//! them without pulling in the engine's runtime machinery.

pub mod error;
pub mod graph;
pub mod metric;
pub mod row;
pub mod state;

pub use error::{ErrorCode, RowDiagnostic, StepError};
pub use graph::{
    DispatchPolicy, EngineSettings, ErrorSink, GraphDefinition, HopDefinition, StepDefinition,
};
pub use metric::{SnapshotDelta, StepSnapshot};
pub use row::{ColumnDescriptor, ColumnKind, Row, RowSchema, Value};
pub use state::{GraphOutcome, StepState};
