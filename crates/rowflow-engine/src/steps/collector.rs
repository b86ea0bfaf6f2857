//! Collecting sink for embedding callers and tests.

use std::sync::Arc;

use parking_lot::Mutex;
use rowflow_types::{Row, StepError};

use crate::step::{Step, StepContext, StepSignal};

/// Shared buffer a [`Collector`] appends into, held by the embedding
/// caller. Register the collector with a closure that clones this
/// handle so every copy of the sink step feeds the same buffer.
#[derive(Debug, Clone, Default)]
pub struct CollectorHandle {
    rows: Arc<Mutex<Vec<Row>>>,
}

impl CollectorHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows received so far, in arrival order.
    #[must_use]
    pub fn rows(&self) -> Vec<Row> {
        self.rows.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

/// Terminal step appending every received row to a shared handle.
#[derive(Debug)]
pub struct Collector {
    handle: CollectorHandle,
}

impl Collector {
    #[must_use]
    pub fn with_handle(handle: CollectorHandle) -> Self {
        Self { handle }
    }
}

impl Step for Collector {
    fn init(&mut self, _config: &serde_json::Value) -> Result<(), StepError> {
        Ok(())
    }

    fn process(&mut self, ctx: &mut StepContext) -> Result<StepSignal, StepError> {
        match ctx.read() {
            Some(row) => {
                self.handle.rows.lock().push(row);
                // The shared buffer is this sink's external store.
                ctx.inc_updated();
                Ok(StepSignal::Continue)
            }
            None => Ok(StepSignal::Done),
        }
    }

    fn dispose(&mut self) {}
}
