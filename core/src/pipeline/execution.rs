// core/src/pipeline/execution.rs

//! `Pipeline::run()`: executes the steps in order against one context.

use tracing::{event, instrument, span, Instrument, Level};

use super::definition::Pipeline;
use super::{ContextData, PipelineControl, PipelineError, PipelineResult};

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  /// Runs every step in order. A step without handlers is a configuration
  /// error and fails the run before anything else in that step happens.
  #[instrument(
    name = "Pipeline::run",
    skip_all,
    fields(context = %std::any::type_name::<TData>(), num_steps = self.steps.len()),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, Err> {
    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_name = step_def.name.as_str();
      let handlers = match self.handlers.get(step_name) {
        Some(handlers) if !handlers.is_empty() => handlers,
        _ => {
          event!(Level::ERROR, step_name, "Step has no handlers.");
          return Err(Err::from(PipelineError::HandlerMissing {
            step_name: step_def.name.clone(),
          }));
        }
      };

      let step_span = span!(Level::INFO, "pipeline_step", step_name, step_index = step_idx);
      for handler_fn in handlers {
        let outcome = handler_fn(ctx_data.clone()).instrument(step_span.clone()).await;
        match outcome {
          Ok(PipelineControl::Continue) => {}
          Ok(PipelineControl::Stop) => {
            event!(Level::INFO, step_name, "Pipeline stopped by handler.");
            return Ok(PipelineResult::Stopped);
          }
          Err(e) => {
            event!(Level::WARN, step_name, error = %e, "Step handler failed.");
            return Err(e);
          }
        }
      }
      event!(Level::DEBUG, step_name, "Step finished.");
    }
    Ok(PipelineResult::Completed)
  }
}
