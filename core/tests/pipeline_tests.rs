// tests/pipeline_tests.rs
mod common;
use common::*;
use serial_test::serial;
use storefront::checkout::CHECKOUT_STEPS;
use storefront::{ContextData, Pipeline, PipelineControl, PipelineError, PipelineResult};

#[derive(Debug, Default)]
struct Trail {
  visited: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
enum TestError {
  #[error("pipeline: {0}")]
  Pipeline(#[from] PipelineError),
  #[error("handler failed: {0}")]
  Handler(String),
}

fn visit(
  name: &'static str,
  control: PipelineControl,
) -> impl Fn(ContextData<Trail>) -> std::future::Ready<Result<PipelineControl, TestError>> + Send + Sync + 'static {
  move |ctx: ContextData<Trail>| {
    ctx.write().visited.push(name.to_string());
    std::future::ready(Ok(control))
  }
}

#[tokio::test]
#[serial]
async fn test_steps_run_in_declared_order() {
  setup_tracing();
  let mut p = Pipeline::<Trail, TestError>::new(&["one", "two", "three"]);
  p.on("three", visit("three", PipelineControl::Continue)).unwrap();
  p.on("one", visit("one", PipelineControl::Continue)).unwrap();
  p.on("two", visit("two-a", PipelineControl::Continue)).unwrap();
  p.on("two", visit("two-b", PipelineControl::Continue)).unwrap();

  let ctx = ContextData::new(Trail::default());
  let result = p.run(ctx.clone()).await.unwrap();

  assert_eq!(result, PipelineResult::Completed);
  assert_eq!(ctx.read().visited, vec!["one", "two-a", "two-b", "three"]);
}

#[tokio::test]
#[serial]
async fn test_stop_skips_the_rest() {
  setup_tracing();
  let mut p = Pipeline::<Trail, TestError>::new(&["first", "second"]);
  p.on("first", visit("first", PipelineControl::Stop)).unwrap();
  p.on("second", visit("second", PipelineControl::Continue)).unwrap();

  let ctx = ContextData::new(Trail::default());
  assert_eq!(p.run(ctx.clone()).await.unwrap(), PipelineResult::Stopped);
  assert_eq!(ctx.read().visited, vec!["first"]);
}

#[tokio::test]
#[serial]
async fn test_handler_error_ends_the_run() {
  setup_tracing();
  let mut p = Pipeline::<Trail, TestError>::new(&["fail", "after"]);
  p.on("fail", |_ctx: ContextData<Trail>| async move {
    Err::<PipelineControl, _>(TestError::Handler("boom".to_string()))
  })
  .unwrap();
  p.on("after", visit("after", PipelineControl::Continue)).unwrap();

  let ctx = ContextData::new(Trail::default());
  let err = p.run(ctx.clone()).await.unwrap_err();
  assert!(matches!(err, TestError::Handler(ref m) if m == "boom"));
  assert!(ctx.read().visited.is_empty());
}

#[tokio::test]
#[serial]
async fn test_configuration_mistakes_are_reported() {
  setup_tracing();
  let mut p = Pipeline::<Trail, TestError>::new(&["declared"]);
  let err = p.on("undeclared", visit("x", PipelineControl::Continue)).unwrap_err();
  assert!(matches!(err, PipelineError::StepNotFound { ref step_name } if step_name == "undeclared"));

  let err = p.run(ContextData::new(Trail::default())).await.unwrap_err();
  assert!(matches!(
    err,
    TestError::Pipeline(PipelineError::HandlerMissing { ref step_name }) if step_name == "declared"
  ));
}

#[test]
fn test_checkout_steps_authorize_before_committing() {
  let authorize = CHECKOUT_STEPS.iter().position(|s| *s == "authorize_payment").unwrap();
  let commit = CHECKOUT_STEPS.iter().position(|s| *s == "commit_order").unwrap();
  assert!(authorize < commit);
  assert_eq!(CHECKOUT_STEPS.first(), Some(&"validate_cart"));
}
