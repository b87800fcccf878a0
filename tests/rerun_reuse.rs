// tests/rerun_reuse.rs

use std::error::Error;

use flowdag::dag::{Flow, Job, JobState};
use flowdag::engine::{RunStatus, Runner};
use flowdag::errors::FailureKind;
use flowdag_test_utils::builders::{
    CallCounter, counting_callable, doubling_callable, fast_config, flaky_callable,
};
use flowdag_test_utils::{init_tracing, with_timeout};
use serde_json::json;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn succeeded_jobs_are_not_executed_again() -> TestResult {
    init_tracing();

    let a_calls = CallCounter::new();
    let a = Job::new("A", counting_callable(a_calls.clone(), json!(5)));
    let b = Job::new("B", doubling_callable()).with_input("x", a.output());
    let (a_id, b_id) = (a.id(), b.id());
    let flow = Flow::new("reuse")
        .with_output("b", b.output())
        .with_nodes([a, b]);

    let first = with_timeout(Runner::new(fast_config(2, 0)).run(&flow)).await?;
    assert_eq!(first.status, RunStatus::Succeeded);
    assert_eq!(a_calls.get(), 1);

    let second = with_timeout(
        Runner::new(fast_config(2, 0)).run_with_store(&flow, first.store.clone()),
    )
    .await?;

    assert_eq!(second.status, RunStatus::Succeeded);
    assert_eq!(a_calls.get(), 1, "A must not run again");
    assert_eq!(second.output("b"), Some(&json!(10.0)));
    assert!(second.reused.contains(&a_id));
    assert!(second.reused.contains(&b_id));
    assert_eq!(second.total_attempts(), 0);
    Ok(())
}

#[tokio::test]
async fn plain_run_ignores_previous_results() -> TestResult {
    init_tracing();

    let calls = CallCounter::new();
    let a = Job::new("A", counting_callable(calls.clone(), json!(1)));
    let flow = Flow::new("fresh").with_node(a);

    with_timeout(Runner::new(fast_config(1, 0)).run(&flow)).await?;
    let second = with_timeout(Runner::new(fast_config(1, 0)).run(&flow)).await?;

    assert_eq!(calls.get(), 2);
    assert!(second.reused.is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_jobs_and_their_dependents_rerun() -> TestResult {
    init_tracing();

    let a_calls = CallCounter::new();
    let b_calls = CallCounter::new();
    let c_calls = CallCounter::new();
    let a = Job::new("A", counting_callable(a_calls.clone(), json!(1)));
    let b = Job::new("B", flaky_callable(b_calls.clone(), 1, json!(2))).with_input("x", a.output());
    let c = Job::new("C", counting_callable(c_calls.clone(), json!(3))).with_input("x", b.output());
    let (b_id, c_id) = (b.id(), c.id());
    let flow = Flow::new("partial")
        .with_output("c", c.output())
        .with_nodes([a, b, c]);

    let first = with_timeout(Runner::new(fast_config(1, 0)).run(&flow)).await?;
    assert_eq!(first.status, RunStatus::Failed);
    assert_eq!(
        first.state_of(&c_id),
        Some(JobState::Failed(FailureKind::UpstreamFailure))
    );
    assert_eq!(c_calls.get(), 0);

    let second =
        with_timeout(Runner::new(fast_config(1, 0)).run_with_store(&flow, first.store)).await?;

    assert_eq!(second.status, RunStatus::Succeeded);
    assert_eq!(second.output("c"), Some(&json!(3)));
    assert_eq!(a_calls.get(), 1);
    assert_eq!(b_calls.get(), 2);
    assert_eq!(c_calls.get(), 1);
    assert_eq!(second.state_of(&b_id), Some(JobState::Succeeded));
    assert_eq!(second.reused.len(), 1);
    Ok(())
}
