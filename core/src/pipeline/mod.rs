// core/src/pipeline/mod.rs

//! A small step pipeline: an ordered list of named steps, each with async
//! handlers operating on a shared per-run context.
//!
//! A handler returns [`PipelineControl::Continue`] to move on or
//! [`PipelineControl::Stop`] to end the run early without an error. Errors end
//! the run and are returned as-is.

pub mod context_data;
pub mod definition;
pub mod execution;

pub use crate::error::PipelineError;
pub use context_data::ContextData;
pub use definition::{Handler, Pipeline, StepDef};

/// Signal from a handler indicating whether the pipeline should continue or stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineControl {
  Continue,
  /// Halt the run. Remaining handlers and steps do not execute.
  Stop,
}

/// Outcome of a full pipeline execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineResult {
  /// Every step ran.
  Completed,
  /// A handler returned [`PipelineControl::Stop`].
  Stopped,
}
