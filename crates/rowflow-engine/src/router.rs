//! Per-step diversion of recoverably failing rows to an error sink.
//!
//! The router appends the diagnostic columns declared by the step's
//! [`ErrorSink`] to the failing row and pushes the augmented row onto
//! the step's dedicated error row set, under the same backpressure
//! rules as any row set. Rows routed here never also reach the step's
//! normal outputs: both paths take the row by value.

use std::sync::Arc;

use rowflow_types::{ColumnDescriptor, ColumnKind, ErrorSink, Row, RowDiagnostic, Value};

use crate::rowset::RowSet;

pub(crate) struct ErrorRouter {
    step: String,
    copy: u32,
    sink: ErrorSink,
    target: Arc<RowSet>,
}

impl ErrorRouter {
    pub(crate) fn new(step: String, copy: u32, sink: ErrorSink, target: Arc<RowSet>) -> Self {
        Self {
            step,
            copy,
            sink,
            target,
        }
    }

    /// The row set this router feeds; the owning step marks it
    /// producer-done together with its normal outputs.
    pub(crate) fn rowset(&self) -> &Arc<RowSet> {
        &self.target
    }

    /// Divert `row` with `diag` rendered into appended columns.
    /// Blocks under backpressure; returns `false` once the sink is gone
    /// or a stop is pending.
    pub(crate) fn route(&self, row: Row, diag: &RowDiagnostic) -> bool {
        let (schema, mut values) = row.into_parts();
        let augmented = Arc::new(schema.with_columns(&[
            ColumnDescriptor::new(&self.sink.row_number_field, ColumnKind::Integer),
            ColumnDescriptor::new(&self.sink.error_field, ColumnKind::Text),
            ColumnDescriptor::new(&self.sink.code_field, ColumnKind::Text),
            ColumnDescriptor::new(&self.sink.message_field, ColumnKind::Text),
            ColumnDescriptor::new(&self.sink.failed_at_field, ColumnKind::Timestamp),
        ]));
        values.push(Value::Integer(
            i64::try_from(diag.row_number).unwrap_or(i64::MAX),
        ));
        values.push(
            diag.field
                .as_ref()
                .map_or(Value::Null, |f| Value::Text(f.clone())),
        );
        values.push(Value::Text(diag.code.to_string()));
        values.push(Value::Text(diag.message.clone()));
        values.push(Value::Timestamp(chrono::Utc::now().to_rfc3339()));

        let accepted = self.target.put(Row::new(augmented, values));
        if accepted {
            tracing::debug!(
                step = %self.step,
                copy = self.copy,
                row_number = diag.row_number,
                code = %diag.code,
                "row diverted to error sink"
            );
        } else {
            tracing::warn!(
                step = %self.step,
                copy = self.copy,
                row_number = diag.row_number,
                "error sink refused diverted row"
            );
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rowflow_types::{ErrorCode, RowSchema, StepError};

    use crate::context::RunContext;

    fn sample_row() -> Row {
        let schema = Arc::new(RowSchema::new(vec![
            ColumnDescriptor::new("id", ColumnKind::Integer),
            ColumnDescriptor::new("name", ColumnKind::Text),
        ]));
        Row::new(schema, vec![Value::Integer(7), Value::Null])
    }

    fn router_with_target() -> (ErrorRouter, Arc<RowSet>) {
        let ctx = Arc::new(RunContext::new(Duration::from_millis(5)));
        let target = Arc::new(RowSet::new("v.0 ->err-> log.0", 8, ctx));
        let router = ErrorRouter::new(
            "v".into(),
            0,
            ErrorSink::to_step("log"),
            Arc::clone(&target),
        );
        (router, target)
    }

    #[test]
    fn routed_row_carries_diagnostic_columns() {
        let (router, target) = router_with_target();
        let err = StepError::data("null name not allowed").with_field("name");
        let diag = RowDiagnostic::from_error(10, &err);

        assert!(router.route(sample_row(), &diag));

        let diverted = target.try_get().expect("diverted row buffered");
        assert_eq!(diverted.len(), 7);
        assert_eq!(
            diverted.value("error_row_number"),
            Some(&Value::Integer(10))
        );
        assert_eq!(
            diverted.value("error_field"),
            Some(&Value::Text("name".into()))
        );
        assert_eq!(
            diverted.value("error_code"),
            Some(&Value::Text(ErrorCode::Data.to_string()))
        );
        assert_eq!(
            diverted.value("error_message"),
            Some(&Value::Text("null name not allowed".into()))
        );
        match diverted.value("error_failed_at") {
            Some(Value::Timestamp(ts)) => assert!(!ts.is_empty()),
            other => panic!("expected timestamp column, got {other:?}"),
        }
    }

    #[test]
    fn route_fails_once_sink_consumer_is_gone() {
        let (router, target) = router_with_target();
        target.mark_consumer_done();
        let diag = RowDiagnostic::from_error(1, &StepError::data("bad"));
        assert!(!router.route(sample_row(), &diag));
    }
}
