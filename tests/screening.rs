// tests/screening.rs

use std::error::Error;
use std::sync::Arc;

use flowdag::dag::{Flow, Input, Job, JobState, Node};
use flowdag::demo;
use flowdag::engine::{RunStatus, Runner};
use flowdag::errors::Result as FlowResult;
use flowdag::makers::{MakeContext, MakeInput, Maker, NodeBuilder, ScreeningMaker};
use flowdag_test_utils::builders::{
    CallCounter, counting_callable, failing_callable, fast_config, value_job,
};
use flowdag_test_utils::{init_tracing, with_timeout};
use serde_json::{Value, json};

type TestResult = Result<(), Box<dyn Error>>;

/// Scores are looked up by candidate index; passing candidates get a job
/// that returns its index.
fn screening(scores: Vec<f64>, threshold: f64, expansions: CallCounter) -> ScreeningMaker {
    let scorer: NodeBuilder = Arc::new(move |index: usize, _candidate: Input| -> FlowResult<Node> {
        Ok(value_job(&format!("score_{index}"), json!(scores[index])).into())
    });
    let expander: NodeBuilder = Arc::new(move |index: usize, candidate: Input| -> FlowResult<Node> {
        Ok(
            Job::new(format!("expand_{index}"), counting_callable(expansions.clone(), json!(index)))
                .with_input("candidate", candidate)
                .into(),
        )
    });
    ScreeningMaker::new("screen test", threshold, scorer, expander)
}

fn candidates(n: usize) -> Vec<Input> {
    (0..n)
        .map(|i| Input::literal(json!({ "name": format!("c{i}") })))
        .collect()
}

#[tokio::test]
async fn only_candidates_above_threshold_are_expanded() -> TestResult {
    init_tracing();

    let expansions = CallCounter::new();
    let flow = screening(vec![0.3, 0.6, 0.8], 0.5, expansions.clone()).make_flow(candidates(3))?;

    let report = with_timeout(Runner::new(fast_config(4, 0)).run(&flow)).await?;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(expansions.get(), 2);
    assert_eq!(report.filtered, vec!["candidate_0".to_string()]);
    assert!(report.failures.is_empty(), "filtered candidates are not failures");
    assert_eq!(
        report.output("results"),
        Some(&json!({ "candidate_1": 1, "candidate_2": 2 }))
    );

    let summary = report
        .output("screening")
        .and_then(Value::as_array)
        .expect("screening summary");
    let statuses: Vec<&str> = summary
        .iter()
        .filter_map(|entry| entry.get("status").and_then(Value::as_str))
        .collect();
    assert_eq!(statuses, vec!["filtered", "passed", "passed"]);

    // 3 scorers + screen job + 2 expansions.
    assert_eq!(report.states.len(), 6);
    assert!(report.states.values().all(|s| *s == JobState::Succeeded));
    Ok(())
}

#[tokio::test]
async fn score_equal_to_threshold_is_filtered() -> TestResult {
    init_tracing();

    let expansions = CallCounter::new();
    let flow = screening(vec![0.5], 0.5, expansions.clone()).make_flow(candidates(1))?;

    let report = with_timeout(Runner::new(fast_config(1, 0)).run(&flow)).await?;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(expansions.get(), 0);
    assert_eq!(report.filtered, vec!["candidate_0".to_string()]);
    assert_eq!(report.output("results"), Some(&json!({})));
    Ok(())
}

#[tokio::test]
async fn non_numeric_score_fails_the_screen_job() -> TestResult {
    init_tracing();

    let scorer: NodeBuilder = Arc::new(|_: usize, _: Input| -> FlowResult<Node> {
        Ok(value_job("score", json!("high")).into())
    });
    let expander: NodeBuilder = Arc::new(|index: usize, _: Input| -> FlowResult<Node> {
        Ok(value_job(&format!("expand_{index}"), json!(index)).into())
    });
    let flow = ScreeningMaker::new("bad scores", 0.5, scorer, expander).make_flow(candidates(1))?;

    let report = with_timeout(Runner::new(fast_config(1, 0)).run(&flow)).await?;

    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.unreachable.contains_key("results"));
    let screen = report
        .failures
        .iter()
        .find(|f| f.job == "bad scores screen")
        .expect("screen job failure");
    assert_eq!(screen.kind.as_str(), "CallableError");
    Ok(())
}

#[tokio::test]
async fn failed_scorer_leaves_other_candidates_screened() -> TestResult {
    init_tracing();

    let expansions = CallCounter::new();
    let counter = expansions.clone();
    let scorer: NodeBuilder = Arc::new(|index: usize, _: Input| -> FlowResult<Node> {
        let job = if index == 0 {
            Job::new("score_0", failing_callable("scorer crashed"))
        } else {
            value_job(&format!("score_{index}"), json!(0.9))
        };
        Ok(job.into())
    });
    let expander: NodeBuilder = Arc::new(move |index: usize, candidate: Input| -> FlowResult<Node> {
        Ok(
            Job::new(format!("expand_{index}"), counting_callable(counter.clone(), json!(index)))
                .with_input("candidate", candidate)
                .into(),
        )
    });
    let flow = ScreeningMaker::new("partial", 0.5, scorer, expander).make_flow(candidates(3))?;

    let report = with_timeout(Runner::new(fast_config(2, 0)).run(&flow)).await?;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(expansions.get(), 2);
    assert_eq!(
        report.output("results"),
        Some(&json!({ "candidate_1": 1, "candidate_2": 2 }))
    );
    let statuses: Vec<&str> = report
        .output("screening")
        .and_then(Value::as_array)
        .map(|rows| rows.iter().filter_map(|r| r["status"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(statuses, vec!["failed", "passed", "passed"]);
    assert!(report.filtered.is_empty());

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].job, "score_0");
    assert_eq!(report.failures[0].kind.as_str(), "CallableError");
    Ok(())
}

#[test]
fn non_finite_threshold_is_rejected() {
    let maker = screening(vec![], f64::NAN, CallCounter::new());
    assert!(maker.make_flow(Vec::new()).is_err());
}

#[test]
fn maker_input_must_be_a_list() {
    let maker = screening(vec![0.9], 0.5, CallCounter::new());
    let ctx = MakeContext::default();

    let single = MakeInput::new(Input::literal(json!({ "name": "c0" })));
    assert!(maker.make(&single, &ctx).is_err());

    let listed = MakeInput::new(Input::literal(json!([{ "name": "c0" }])));
    let node = maker.make(&listed, &ctx).expect("list input is accepted");
    assert!(matches!(node, Node::Flow(_)));
}

#[tokio::test]
async fn demo_screening_flow_refines_passing_candidates() -> TestResult {
    init_tracing();

    let flow: Flow = demo::screening_flow(0.5)?;
    let report = with_timeout(Runner::new(fast_config(2, 0)).run(&flow)).await?;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(report.filtered, vec!["candidate_0".to_string()]);
    let results = report.output("results").expect("results output");
    assert_eq!(results["candidate_1"]["name"], json!("beta"));
    assert_eq!(results["candidate_2"]["name"], json!("gamma"));
    Ok(())
}

#[tokio::test]
async fn high_throughput_zt_screens_out_high_conductivity_structures() -> TestResult {
    init_tracing();

    let ctx = MakeContext::new(demo::synthetic_calculators());
    let flow = demo::zt_flow(0.5, &ctx)?;

    let report = with_timeout(Runner::new(fast_config(4, 0)).run(&flow)).await?;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(report.filtered, vec!["candidate_2".to_string()]);

    let results = report.output("results").expect("results output");
    for label in ["candidate_0", "candidate_1"] {
        let max_zt = results[label]["max_zt"].as_f64().expect("numeric max_zt");
        assert!(max_zt > 0.5, "{label} should have passed with max_zt {max_zt}");
        assert_eq!(results[label]["optimal_temperature"], json!(750.0));
    }
    assert!(results.get("candidate_2").is_none());
    Ok(())
}
