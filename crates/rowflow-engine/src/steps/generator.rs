//! Synthetic row source.

use std::sync::Arc;

use serde::Deserialize;
use rowflow_types::{ColumnDescriptor, ColumnKind, Row, RowSchema, StepError, Value};

use crate::step::{Step, StepContext, StepSignal};

fn default_payload() -> String {
    "row".to_string()
}

#[derive(Debug, Deserialize)]
struct GeneratorConfig {
    /// Number of rows to emit before completing.
    rows: u64,
    /// Text repeated into every row's `payload` column.
    #[serde(default = "default_payload")]
    payload: String,
}

/// Emits `(seq: integer, payload: text)` rows, one per process call,
/// then completes. Sequence numbers start at 0.
#[derive(Debug, Default)]
pub struct RowGenerator {
    schema: Option<Arc<RowSchema>>,
    payload: String,
    remaining: u64,
    next_seq: i64,
}

impl Step for RowGenerator {
    fn init(&mut self, config: &serde_json::Value) -> Result<(), StepError> {
        let parsed: GeneratorConfig = serde_json::from_value(config.clone())
            .map_err(|e| StepError::config(format!("invalid row_generator config: {e}")))?;
        self.schema = Some(Arc::new(RowSchema::new(vec![
            ColumnDescriptor::new("seq", ColumnKind::Integer),
            ColumnDescriptor::new("payload", ColumnKind::Text),
        ])));
        self.payload = parsed.payload;
        self.remaining = parsed.rows;
        self.next_seq = 0;
        Ok(())
    }

    fn process(&mut self, ctx: &mut StepContext) -> Result<StepSignal, StepError> {
        if self.remaining == 0 {
            return Ok(StepSignal::Done);
        }
        let Some(schema) = &self.schema else {
            return Err(StepError::internal("row_generator used before init"));
        };
        let row = Row::new(
            Arc::clone(schema),
            vec![
                Value::Integer(self.next_seq),
                Value::Text(self.payload.clone()),
            ],
        );
        if !ctx.write(row) {
            // Downstream is gone or the run is stopping.
            return Ok(StepSignal::Done);
        }
        self.next_seq += 1;
        self.remaining -= 1;
        Ok(StepSignal::Continue)
    }

    fn dispose(&mut self) {
        self.schema = None;
    }
}
