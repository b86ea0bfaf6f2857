//! Identity step: forwards every input row unchanged.

use rowflow_types::StepError;

use crate::step::{Step, StepContext, StepSignal};

/// Forwards rows as-is. Also registered as `injector`: attached behind
/// an external row producer it turns injected rows into an ordinary
/// upstream for the rest of the graph.
#[derive(Debug, Default)]
pub struct Passthrough;

impl Step for Passthrough {
    fn init(&mut self, _config: &serde_json::Value) -> Result<(), StepError> {
        Ok(())
    }

    fn process(&mut self, ctx: &mut StepContext) -> Result<StepSignal, StepError> {
        match ctx.read() {
            Some(row) => {
                if ctx.write(row) {
                    Ok(StepSignal::Continue)
                } else {
                    Ok(StepSignal::Done)
                }
            }
            None => Ok(StepSignal::Done),
        }
    }

    fn dispose(&mut self) {}
}
