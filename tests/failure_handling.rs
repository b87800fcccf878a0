// tests/failure_handling.rs

use std::error::Error;
use std::time::{Duration, Instant};

use flowdag::dag::{Flow, Job, JobState, fn_callable};
use flowdag::engine::{RetryPolicy, RunStatus, Runner, RunnerConfig};
use flowdag::errors::FailureKind;
use flowdag_test_utils::builders::{
    CallCounter, doubling_callable, failing_callable, fast_config, flaky_callable, value_job,
};
use flowdag_test_utils::{init_tracing, with_timeout};
use serde_json::{Value, json};

type TestResult = Result<(), Box<dyn Error>>;

/// root -> b1 (fails) -> c1, root -> b2 -> c2, root -> b3 -> c3.
struct Branches {
    flow: Flow,
    b1: Job,
    c1: Job,
    c2: Job,
    c3: Job,
}

fn branches(include_failing_output: bool) -> Branches {
    let root = value_job("root", json!(1));
    let b1 = Job::new("b1", failing_callable("b1 exploded")).with_input("x", root.output());
    let c1 = Job::new("c1", doubling_callable()).with_input("x", b1.output());
    let b2 = Job::new("b2", doubling_callable()).with_input("x", root.output());
    let c2 = Job::new("c2", doubling_callable()).with_input("x", b2.output());
    let b3 = Job::new("b3", doubling_callable()).with_input("x", root.output());
    let c3 = Job::new("c3", doubling_callable()).with_input("x", b3.output());

    let mut flow = Flow::new("branches")
        .with_output("two", c2.output())
        .with_output("three", c3.output());
    if include_failing_output {
        flow = flow.with_output("one", c1.output());
    }
    let flow = flow.with_nodes([
        root,
        b1.clone(),
        c1.clone(),
        b2,
        c2.clone(),
        b3,
        c3.clone(),
    ]);

    Branches { flow, b1, c1, c2, c3 }
}

#[tokio::test]
async fn failure_stays_on_its_branch() -> TestResult {
    init_tracing();

    let Branches { flow, b1, c1, c2, c3 } = branches(false);
    let report = with_timeout(Runner::new(fast_config(4, 0)).run(&flow)).await?;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(report.output("two"), Some(&json!(4.0)));
    assert_eq!(report.output("three"), Some(&json!(4.0)));

    assert_eq!(
        report.state_of(&b1.id()),
        Some(JobState::Failed(FailureKind::CallableError))
    );
    assert_eq!(
        report.state_of(&c1.id()),
        Some(JobState::Failed(FailureKind::UpstreamFailure))
    );
    assert_eq!(report.state_of(&c2.id()), Some(JobState::Succeeded));
    assert_eq!(report.state_of(&c3.id()), Some(JobState::Succeeded));

    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.root_failures().count(), 1);
    Ok(())
}

#[tokio::test]
async fn unreachable_declared_output_fails_the_run() -> TestResult {
    init_tracing();

    let Branches { flow, .. } = branches(true);
    let report = with_timeout(Runner::new(fast_config(4, 0)).run(&flow)).await?;

    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.unreachable.contains_key("one"));
    assert_eq!(report.output("two"), Some(&json!(4.0)));
    Ok(())
}

#[tokio::test]
async fn failure_chain_leads_back_to_the_root_cause() -> TestResult {
    init_tracing();

    let Branches { flow, c1, .. } = branches(false);
    let report = with_timeout(Runner::new(fast_config(4, 0)).run(&flow)).await?;

    let entry = report.failure_of(&c1.id()).expect("c1 failure");
    assert_eq!(entry.kind, FailureKind::UpstreamFailure);
    assert_eq!(entry.chain, vec!["b1".to_string(), "c1".to_string()]);
    assert_eq!(entry.attempts, 0);

    let json = report.to_json();
    let kinds: Vec<&str> = json["failures"]
        .as_array()
        .expect("failures array")
        .iter()
        .filter_map(|f| f["kind"].as_str())
        .collect();
    assert_eq!(kinds, vec!["CallableError", "UpstreamFailure"]);
    Ok(())
}

#[tokio::test]
async fn missing_attribute_is_an_unresolvable_reference() -> TestResult {
    init_tracing();

    let producer = value_job("producer", json!({ "a": 1 }));
    let consumer = Job::new("consumer", doubling_callable()).with_input("x", producer.output_at("b"));
    let consumer_id = consumer.id();
    let flow = Flow::new("missing attribute").with_nodes([producer, consumer]);

    let report = with_timeout(Runner::new(fast_config(1, 0)).run(&flow)).await?;

    let entry = report.failure_of(&consumer_id).expect("consumer failure");
    assert_eq!(entry.kind, FailureKind::UnresolvableReference);
    assert_eq!(entry.attempts, 0);
    assert_eq!(entry.chain, vec!["producer".to_string(), "consumer".to_string()]);
    Ok(())
}

#[tokio::test]
async fn transient_failures_are_retried() -> TestResult {
    init_tracing();

    let calls = CallCounter::new();
    let flaky = Job::new("flaky", flaky_callable(calls.clone(), 2, json!("ok")));
    let flaky_id = flaky.id();
    let flow = Flow::new("retry")
        .with_output("value", flaky.output())
        .with_node(flaky);

    let report = with_timeout(Runner::new(fast_config(1, 2)).run(&flow)).await?;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(report.output("value"), Some(&json!("ok")));
    assert_eq!(calls.get(), 3);
    assert_eq!(report.attempts_of(&flaky_id), 3);
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_fail_with_callable_error() -> TestResult {
    init_tracing();

    let calls = CallCounter::new();
    let flaky = Job::new("flaky", flaky_callable(calls.clone(), 10, json!("never")));
    let flaky_id = flaky.id();
    let after = Job::new("after", doubling_callable()).with_input("x", flaky.output());
    let after_id = after.id();
    let flow = Flow::new("exhausted").with_nodes([flaky, after]);

    let report = with_timeout(Runner::new(fast_config(1, 2)).run(&flow)).await?;

    assert_eq!(calls.get(), 3);
    let entry = report.failure_of(&flaky_id).expect("flaky failure");
    assert_eq!(entry.kind, FailureKind::CallableError);
    assert_eq!(entry.attempts, 3);
    assert!(entry.message.contains("transient failure #3"));
    assert_eq!(
        report.state_of(&after_id),
        Some(JobState::Failed(FailureKind::UpstreamFailure))
    );
    Ok(())
}

#[tokio::test]
async fn retries_wait_for_the_backoff() -> TestResult {
    init_tracing();

    let calls = CallCounter::new();
    let flaky = Job::new("flaky", flaky_callable(calls.clone(), 1, json!(1)));
    let flow = Flow::new("backoff").with_node(flaky);
    let config = RunnerConfig {
        max_workers: 1,
        retry: RetryPolicy {
            max_retries: 1,
            initial_backoff: Duration::from_millis(50),
            multiplier: 2.0,
            max_backoff: Duration::from_millis(50),
        },
    };

    let started = Instant::now();
    let report = with_timeout(Runner::new(config).run(&flow)).await?;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(calls.get(), 2);
    assert!(started.elapsed() >= Duration::from_millis(50));
    Ok(())
}

#[tokio::test]
async fn panicking_callable_is_a_callable_error() -> TestResult {
    init_tracing();

    let panicking = Job::new(
        "panics",
        fn_callable("panic", |_| -> anyhow::Result<Value> { panic!("callable blew up") }),
    );
    let id = panicking.id();
    let flow = Flow::new("panic").with_node(panicking);

    let report = with_timeout(Runner::new(fast_config(1, 0)).run(&flow)).await?;

    assert_eq!(
        report.state_of(&id),
        Some(JobState::Failed(FailureKind::CallableError))
    );
    Ok(())
}
