//! Engine error model.
//!
//! `Validation` and `Initialization` are reported from `prepare`,
//! before any thread starts. `Step` surfaces the first fatal step
//! failure of a run. `Infrastructure` wraps opaque host-side failures
//! (thread spawn, worker panic) that are never attributable to a row.
//! A requested stop is *not* an error; it is the `Stopped` outcome.

use rowflow_types::StepError;

/// Categorized engine error.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The graph definition failed validation; every problem found is
    /// listed, none of the graph was instantiated.
    #[error("invalid graph definition: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A step plugin's `init` failed during preparation; nothing ran.
    #[error("step '{step}' failed to initialize: {source}")]
    Initialization {
        step: String,
        #[source]
        source: StepError,
    },

    /// A step failed fatally while the graph was running.
    #[error("step '{step}' (copy {copy}) failed: {source}")]
    Step {
        step: String,
        copy: u32,
        #[source]
        source: StepError,
    },

    /// Host-side failure: thread spawn, worker panic, and the like.
    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

impl EngineError {
    /// The underlying typed step error, when there is one.
    #[must_use]
    pub fn as_step_error(&self) -> Option<&StepError> {
        match self {
            Self::Initialization { source, .. } | Self::Step { source, .. } => Some(source),
            Self::Validation(_) | Self::Infrastructure(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_lists_every_problem() {
        let err = EngineError::Validation(vec![
            "duplicate step name 'gen'".into(),
            "hop references unknown step 'sink'".into(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("duplicate step name"));
        assert!(msg.contains("unknown step 'sink'"));
    }

    #[test]
    fn step_error_is_extractable() {
        let err = EngineError::Step {
            step: "load".into(),
            copy: 2,
            source: StepError::resource("connection lost"),
        };
        assert_eq!(
            err.as_step_error().map(|e| e.code),
            Some(rowflow_types::ErrorCode::Resource)
        );
        assert!(err.to_string().contains("copy 2"));
    }

    #[test]
    fn infrastructure_from_anyhow() {
        let err: EngineError = anyhow::anyhow!("worker thread panicked").into();
        assert!(err.as_step_error().is_none());
    }
}
