//! Semantic validation of a parsed graph definition.
//!
//! Runs before anything is instantiated; every problem found is
//! collected so one failed `prepare` reports the whole list. Cycles in
//! the hop graph are deliberately *not* rejected: the engine schedules
//! by data availability and steps may rely on feedback loops. Only a
//! step hopping directly to itself is refused, since one copy cannot
//! produce into and consume from the same row set without deadlocking
//! at capacity.

use std::collections::HashSet;

use rowflow_types::GraphDefinition;

use crate::errors::EngineError;
use crate::registry::StepRegistry;

/// Validate `definition` against `registry`.
///
/// # Errors
///
/// Returns [`EngineError::Validation`] listing every failure found.
pub fn validate_definition(
    definition: &GraphDefinition,
    registry: &StepRegistry,
) -> Result<(), EngineError> {
    let mut errors = Vec::new();

    if definition.name.trim().is_empty() {
        errors.push("graph name must not be empty".to_string());
    }
    if definition.steps.is_empty() {
        errors.push("graph must define at least one step".to_string());
    }
    if definition.settings.rowset_capacity == 0 {
        errors.push("settings.rowset_capacity must be at least 1".to_string());
    }
    if definition.settings.poll_interval_ms == 0 {
        errors.push("settings.poll_interval_ms must be at least 1".to_string());
    }

    let mut names = HashSet::new();
    for step in &definition.steps {
        if step.name.trim().is_empty() {
            errors.push("a step has an empty name".to_string());
        }
        if !names.insert(step.name.as_str()) {
            errors.push(format!("duplicate step name '{}'", step.name));
        }
        if step.copies == 0 {
            errors.push(format!("step '{}' must have at least one copy", step.name));
        }
        if !registry.contains(&step.kind) {
            errors.push(format!(
                "step '{}' references unresolvable kind '{}'",
                step.name, step.kind
            ));
        }
        if let Some(sink) = &step.error_sink {
            if sink.target == step.name {
                errors.push(format!(
                    "step '{}' routes errors to itself",
                    step.name
                ));
            } else if definition.step(&sink.target).is_none() {
                errors.push(format!(
                    "step '{}' routes errors to unknown step '{}'",
                    step.name, sink.target
                ));
            }
        }
    }

    for (i, hop) in definition.hops.iter().enumerate() {
        if definition.step(&hop.from).is_none() {
            errors.push(format!("hop {i} starts at unknown step '{}'", hop.from));
        }
        if definition.step(&hop.to).is_none() {
            errors.push(format!("hop {i} ends at unknown step '{}'", hop.to));
        }
        if hop.from == hop.to {
            errors.push(format!(
                "hop {i} connects step '{}' to itself",
                hop.from
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Validation(errors))
    }
}
