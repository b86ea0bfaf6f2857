//! Field validation transform with recoverable-row diversion.

use serde::Deserialize;
use rowflow_types::StepError;

use crate::step::{Step, StepContext, StepSignal};

fn default_reject_null() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ValidatorConfig {
    /// Column to check on every row.
    field: String,
    /// Reject rows where the column is null or absent.
    #[serde(default = "default_reject_null")]
    reject_null: bool,
}

/// Checks one column per row and diverts failing rows to the step's
/// error sink. Without a configured sink, the first failing row aborts
/// the graph; rejection escalates through `StepContext::reject`.
#[derive(Debug, Default)]
pub struct FieldValidator {
    field: String,
    reject_null: bool,
}

impl Step for FieldValidator {
    fn init(&mut self, config: &serde_json::Value) -> Result<(), StepError> {
        let parsed: ValidatorConfig = serde_json::from_value(config.clone())
            .map_err(|e| StepError::config(format!("invalid field_validator config: {e}")))?;
        self.field = parsed.field;
        self.reject_null = parsed.reject_null;
        Ok(())
    }

    fn process(&mut self, ctx: &mut StepContext) -> Result<StepSignal, StepError> {
        let Some(row) = ctx.read() else {
            return Ok(StepSignal::Done);
        };

        let valid = match row.value(&self.field) {
            Some(value) => !(self.reject_null && value.is_null()),
            None => false,
        };

        if valid {
            if ctx.write(row) {
                Ok(StepSignal::Continue)
            } else {
                Ok(StepSignal::Done)
            }
        } else {
            let error = StepError::data(format!(
                "column '{}' is null or missing",
                self.field
            ))
            .with_field(self.field.clone());
            ctx.reject(row, error)?;
            Ok(StepSignal::Continue)
        }
    }

    fn dispose(&mut self) {}
}
