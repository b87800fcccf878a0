// tests/cancel_behaviour.rs

use std::error::Error;
use std::time::Duration;

use flowdag::dag::{Flow, Job, JobState, Scheduler};
use flowdag::engine::{CoreCommand, CoreRuntime, RetryPolicy, RunStatus, Runner, RuntimeEvent};
use flowdag::errors::FailureKind;
use flowdag::response::Response;
use flowdag::types::RunId;
use flowdag_test_utils::builders::{
    CallCounter, counting_callable, fast_config, sleepy_callable, value_job,
};
use flowdag_test_utils::{init_tracing, with_timeout};
use serde_json::json;

type TestResult = Result<(), Box<dyn Error>>;

struct SlowChain {
    flow: Flow,
    slow: Job,
    next: Job,
    next_calls: CallCounter,
}

/// `slow` sleeps for `delay`, then `next` consumes its output.
fn slow_chain(delay: Duration) -> SlowChain {
    let next_calls = CallCounter::new();
    let slow = Job::new("slow", sleepy_callable(delay, json!(1)));
    let next = Job::new("next", counting_callable(next_calls.clone(), json!(2)))
        .with_input("x", slow.output());
    let flow = Flow::new("slow chain")
        .with_output("next", next.output())
        .with_nodes([slow.clone(), next.clone()]);
    SlowChain {
        flow,
        slow,
        next,
        next_calls,
    }
}

#[tokio::test]
async fn cancel_lets_running_jobs_finish_and_skips_the_rest() -> TestResult {
    init_tracing();

    let SlowChain {
        flow,
        slow,
        next,
        next_calls,
    } = slow_chain(Duration::from_millis(200));

    let runner = Runner::new(fast_config(2, 0));
    let handle = runner.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel().await;
    });

    let report = with_timeout(runner.run(&flow)).await?;

    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(report.state_of(&slow.id()), Some(JobState::Succeeded));
    assert_eq!(
        report.state_of(&next.id()),
        Some(JobState::Failed(FailureKind::Cancelled))
    );
    assert_eq!(next_calls.get(), 0);
    assert!(report.unreachable.contains_key("next"));
    Ok(())
}

#[tokio::test]
async fn cancel_requested_before_run_starts_is_honoured() -> TestResult {
    init_tracing();

    let SlowChain {
        flow, next_calls, ..
    } = slow_chain(Duration::from_millis(30));

    let runner = Runner::new(fast_config(1, 0));
    assert!(runner.cancel_handle().try_cancel());

    let report = with_timeout(runner.run(&flow)).await?;

    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(next_calls.get(), 0);
    Ok(())
}

#[tokio::test]
async fn cancel_after_run_finished_reports_false() -> TestResult {
    init_tracing();

    let flow = Flow::new("quick").with_node(value_job("quick", json!(1)));
    let runner = Runner::new(fast_config(1, 0));
    let handle = runner.cancel_handle();

    let report = with_timeout(runner.run(&flow)).await?;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert!(!handle.cancel().await);
    Ok(())
}

#[test]
fn core_cancel_waits_for_in_flight_jobs() {
    let SlowChain {
        flow, slow, next, ..
    } = slow_chain(Duration::ZERO);
    let scheduler = Scheduler::from_flow(&flow, RunId::new(), 2).expect("valid flow");
    let mut core = CoreRuntime::new(scheduler, RetryPolicy::none());

    let start = core.start();
    let started: Vec<&str> = start.dispatched().iter().map(|j| j.name.as_str()).collect();
    assert_eq!(started, vec!["slow"]);

    let cancel = core.step(RuntimeEvent::CancelRequested);
    assert!(cancel.dispatched().is_empty());
    assert!(cancel.keep_running, "slow is still running");
    assert_eq!(
        core.scheduler().state_of(&next.id()),
        Some(JobState::Failed(FailureKind::Cancelled))
    );

    let done = core.step(RuntimeEvent::JobFinished {
        job: slow.id(),
        attempt: 1,
        result: Ok(Response::done(json!(1))),
    });
    assert!(!done.keep_running);
    assert!(matches!(done.commands.last(), Some(CoreCommand::Finish)));
    assert_eq!(core.scheduler().state_of(&slow.id()), Some(JobState::Succeeded));
}

#[test]
fn no_retries_after_cancel() {
    let flaky = value_job("flaky", json!(1));
    let id = flaky.id();
    let flow = Flow::new("no retry").with_node(flaky);
    let scheduler = Scheduler::from_flow(&flow, RunId::new(), 1).expect("valid flow");
    let mut core = CoreRuntime::new(scheduler, RetryPolicy::immediate(5));

    core.start();
    core.step(RuntimeEvent::CancelRequested);
    let step = core.step(RuntimeEvent::JobFinished {
        job: id,
        attempt: 1,
        result: Err("boom".to_string()),
    });

    assert!(step.dispatched().is_empty());
    assert!(!step.keep_running);
    assert_eq!(
        core.scheduler().state_of(&id),
        Some(JobState::Failed(FailureKind::CallableError))
    );
}
