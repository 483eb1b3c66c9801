// core/src/pipeline/definition.rs

//! The `Pipeline<TData, Err>` struct and handler registration.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use super::{ContextData, PipelineControl, PipelineError};

/// A boxed async step handler.
pub type Handler<TData, Err> = Box<
  dyn Fn(ContextData<TData>) -> Pin<Box<dyn Future<Output = Result<PipelineControl, Err>> + Send>>
    + Send
    + Sync,
>;

#[derive(Debug, Clone)]
pub struct StepDef {
  pub name: String,
}

/// An ordered set of named steps over context `TData`, whose handlers fail with `Err`.
pub struct Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  pub(crate) steps: Vec<StepDef>,
  pub(crate) handlers: HashMap<String, Vec<Handler<TData, Err>>>,
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<PipelineError> + Send + Sync + 'static,
{
  pub fn new(step_names: &[&str]) -> Self {
    Self {
      steps: step_names
        .iter()
        .map(|name| StepDef {
          name: (*name).to_string(),
        })
        .collect(),
      handlers: HashMap::new(),
    }
  }

  /// Registers a handler for `step_name`. Handlers of one step run in
  /// registration order.
  pub fn on<F, UserErr>(
    &mut self,
    step_name: &str,
    handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) -> Result<(), PipelineError>
  where
    F: Future<Output = Result<PipelineControl, UserErr>> + Send + 'static,
    UserErr: Into<Err> + Send + Sync + 'static,
  {
    if !self.steps.iter().any(|s| s.name == step_name) {
      return Err(PipelineError::StepNotFound {
        step_name: step_name.to_string(),
      });
    }
    let handler: Handler<TData, Err> = Box::new(move |ctx_data| {
      let user_fut = handler_fn(ctx_data);
      Box::pin(async move { user_fut.await.map_err(Into::into) })
    });
    self.handlers.entry(step_name.to_string()).or_default().push(handler);
    Ok(())
  }
}
