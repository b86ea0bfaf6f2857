//! Graph definition types: steps, hops, and engine settings.
//!
//! Produced by an external persistence or editor layer (typically from
//! YAML) and consumed by `Graph::prepare`. Pure data; all semantic
//! validation lives in the engine crate.

use serde::{Deserialize, Serialize};

fn default_copies() -> u32 {
    1
}

fn default_rowset_capacity() -> usize {
    100
}

fn default_poll_interval_ms() -> u64 {
    20
}

fn default_sample_interval_ms() -> u64 {
    1_000
}

fn default_row_number_field() -> String {
    "error_row_number".to_string()
}

fn default_error_field() -> String {
    "error_field".to_string()
}

fn default_code_field() -> String {
    "error_code".to_string()
}

fn default_message_field() -> String {
    "error_message".to_string()
}

fn default_failed_at_field() -> String {
    "error_failed_at".to_string()
}

/// How a producing step copy distributes rows across several
/// destination row sets on the same hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// Each row goes to exactly one destination, in rotation.
    #[default]
    RoundRobin,
    /// Every destination copy receives its own copy of every row.
    Broadcast,
}

/// Engine-level tunables for one graph run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Bounded capacity of every inter-step row set.
    #[serde(default = "default_rowset_capacity")]
    pub rowset_capacity: usize,
    /// Upper bound on how long any blocked wait goes without re-checking
    /// the stop flag.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Interval between performance snapshots.
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            rowset_capacity: default_rowset_capacity(),
            poll_interval_ms: default_poll_interval_ms(),
            sample_interval_ms: default_sample_interval_ms(),
        }
    }
}

/// Designates the step that receives rows failing in this step, plus
/// the names of the diagnostic columns appended to each diverted row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSink {
    /// Name of the receiving step.
    pub target: String,
    #[serde(default = "default_row_number_field")]
    pub row_number_field: String,
    #[serde(default = "default_error_field")]
    pub error_field: String,
    #[serde(default = "default_code_field")]
    pub code_field: String,
    #[serde(default = "default_message_field")]
    pub message_field: String,
    #[serde(default = "default_failed_at_field")]
    pub failed_at_field: String,
}

impl ErrorSink {
    /// An error sink targeting `target` with the default diagnostic
    /// column names.
    #[must_use]
    pub fn to_step(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            row_number_field: default_row_number_field(),
            error_field: default_error_field(),
            code_field: default_code_field(),
            message_field: default_message_field(),
            failed_at_field: default_failed_at_field(),
        }
    }
}

/// One step in the graph definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Unique step name within the graph.
    pub name: String,
    /// Step type, resolved through the registry (e.g. `"passthrough"`).
    pub kind: String,
    /// Number of parallel copies.
    #[serde(default = "default_copies")]
    pub copies: u32,
    /// Opaque step configuration, handed to the plugin's `init`.
    #[serde(default)]
    pub config: serde_json::Value,
    /// Optional diversion target for recoverable row errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_sink: Option<ErrorSink>,
}

impl StepDefinition {
    /// A single-copy step with empty configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            copies: 1,
            config: serde_json::Value::Null,
            error_sink: None,
        }
    }

    #[must_use]
    pub fn with_copies(mut self, copies: u32) -> Self {
        self.copies = copies;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_error_sink(mut self, sink: ErrorSink) -> Self {
        self.error_sink = Some(sink);
        self
    }
}

/// A directed edge between two steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopDefinition {
    /// Producing step name.
    pub from: String,
    /// Consuming step name.
    pub to: String,
    /// Row distribution across the consumer's copies.
    #[serde(default)]
    pub dispatch: DispatchPolicy,
}

impl HopDefinition {
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            dispatch: DispatchPolicy::RoundRobin,
        }
    }

    #[must_use]
    pub fn broadcast(mut self) -> Self {
        self.dispatch = DispatchPolicy::Broadcast;
        self
    }
}

/// The complete step/hop definition of one transformation graph.
///
/// Cycles are legal: the engine schedules purely by data availability
/// and never computes a topological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    /// Graph name, used in logs and snapshots.
    pub name: String,
    #[serde(default)]
    pub settings: EngineSettings,
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub hops: Vec<HopDefinition>,
}

impl GraphDefinition {
    /// An empty graph with default settings.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: EngineSettings::default(),
            steps: Vec::new(),
            hops: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn add_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn add_hop(mut self, hop: HopDefinition) -> Self {
        self.hops.push(hop);
        self
    }

    /// Look up a step definition by name.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name == name)
    }
}
