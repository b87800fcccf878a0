// tests/scheduler_steps.rs
//
// Drives the synchronous scheduler and core by hand, without an executor.

use flowdag::dag::{Flow, Job, JobState, ScheduledJob, Scheduler};
use flowdag::engine::{CoreRuntime, JobOutcome, RetryPolicy, RuntimeEvent};
use flowdag::errors::FailureKind;
use flowdag::response::{Expansion, Response};
use flowdag::types::RunId;
use flowdag_test_utils::builders::{doubling_callable, value_callable, value_job};
use serde_json::{Value, json};

fn done(value: Value) -> JobOutcome {
    JobOutcome::Completed(Response::done(value))
}

fn names(jobs: &[ScheduledJob]) -> Vec<&str> {
    jobs.iter().map(|j| j.name.as_str()).collect()
}

#[test]
fn consumer_waits_for_its_producer() {
    let a = value_job("A", json!(1));
    let b = Job::new("B", doubling_callable()).with_input("x", a.output());
    let (a_id, b_id) = (a.id(), b.id());
    let flow = Flow::new("chain").with_nodes([a, b]);
    let mut scheduler = Scheduler::from_flow(&flow, RunId::new(), 4).unwrap();

    let start = scheduler.start();
    assert_eq!(names(&start.newly_scheduled), vec!["A"]);
    assert_eq!(scheduler.deps_satisfied(&b_id), Some(false));
    assert_eq!(scheduler.state_of(&b_id), Some(JobState::Pending));

    let step = scheduler.step_completion(a_id, done(json!(1)));
    assert_eq!(step.newly_succeeded, vec![a_id]);
    assert_eq!(names(&step.newly_scheduled), vec!["B"]);
    assert_eq!(step.newly_scheduled[0].inputs.get("x"), Some(&json!(1)));
    assert!(!step.run_just_finished);

    let step = scheduler.step_completion(b_id, done(json!(2.0)));
    assert!(step.run_just_finished);
    assert!(scheduler.is_finished());
}

#[test]
fn worker_limit_holds_back_ready_jobs() {
    let jobs: Vec<Job> = (0..3).map(|i| value_job(&format!("j{i}"), json!(i))).collect();
    let ids: Vec<_> = jobs.iter().map(Job::id).collect();
    let flow = Flow::new("wide").with_nodes(jobs);
    let mut scheduler = Scheduler::from_flow(&flow, RunId::new(), 2).unwrap();

    let start = scheduler.start();
    assert_eq!(names(&start.newly_scheduled), vec!["j0", "j1"]);
    assert_eq!(scheduler.state_of(&ids[2]), Some(JobState::Ready));
    assert_eq!(scheduler.running_count(), 2);

    let next = scheduler.handle_completion(ids[1], done(json!(1)));
    assert_eq!(names(&next), vec!["j2"]);
}

#[test]
fn completion_for_a_job_that_is_not_running_is_ignored() {
    let a = value_job("A", json!(1));
    let b = Job::new("B", doubling_callable()).with_input("x", a.output());
    let b_id = b.id();
    let flow = Flow::new("chain").with_nodes([a, b]);
    let mut scheduler = Scheduler::from_flow(&flow, RunId::new(), 1).unwrap();
    scheduler.start();

    let step = scheduler.step_completion(b_id, done(json!(99)));
    assert!(step.newly_succeeded.is_empty());
    assert_eq!(scheduler.state_of(&b_id), Some(JobState::Pending));
}

#[test]
fn expansion_is_spliced_and_completes_the_origin() {
    let origin = Job::new("origin", value_callable(json!(null)));
    let after = Job::new("after", doubling_callable()).with_input("x", origin.output_at("y"));
    let (origin_id, after_id) = (origin.id(), after.id());
    let flow = Flow::new("expanding").with_nodes([origin, after]);
    let mut scheduler = Scheduler::from_flow(&flow, RunId::new(), 1).unwrap();
    scheduler.start();

    let child = value_job("child", json!(21));
    let child_id = child.id();
    let expansion = Expansion::new(
        Flow::new("children")
            .with_output("y", child.output())
            .with_node(child),
    );

    let step = scheduler.step_completion(origin_id, JobOutcome::Completed(expansion.into()));
    assert_eq!(scheduler.state_of(&origin_id), Some(JobState::Expanding));
    assert_eq!(names(&step.newly_scheduled), vec!["child"]);
    assert_eq!(scheduler.parent_of(&child_id), Some(origin_id));
    assert_eq!(scheduler.job_count(), 3);

    let step = scheduler.step_completion(child_id, done(json!(21)));
    assert_eq!(step.newly_succeeded, vec![child_id, origin_id]);
    assert_eq!(scheduler.store().value_of(&origin_id), Some(&json!({ "y": 21 })));
    assert_eq!(names(&step.newly_scheduled), vec!["after"]);
    assert_eq!(scheduler.state_of(&after_id), Some(JobState::Running));
}

#[test]
fn empty_expansion_succeeds_with_its_value() {
    let origin = value_job("origin", json!(null));
    let origin_id = origin.id();
    let flow = Flow::new("empty expansion").with_node(origin);
    let mut scheduler = Scheduler::from_flow(&flow, RunId::new(), 1).unwrap();
    scheduler.start();

    let expansion = Expansion::new(Flow::new("nothing")).with_value(json!("kept"));
    let step = scheduler.step_completion(origin_id, JobOutcome::Completed(expansion.into()));

    assert!(step.run_just_finished);
    assert_eq!(scheduler.store().value_of(&origin_id), Some(&json!("kept")));
}

#[test]
fn invalid_expansion_fails_the_origin() {
    let origin = value_job("origin", json!(null));
    let origin_id = origin.id();
    let flow = Flow::new("bad expansion").with_node(origin);
    let mut scheduler = Scheduler::from_flow(&flow, RunId::new(), 1).unwrap();
    scheduler.start();

    let stranger = value_job("stranger", json!(1));
    let dangling = Job::new("dangling", doubling_callable()).with_input("x", stranger.output());
    let expansion = Expansion::new(Flow::new("dangling").with_node(dangling));
    let step = scheduler.step_completion(origin_id, JobOutcome::Completed(expansion.into()));

    assert_eq!(step.newly_failed, vec![origin_id]);
    assert_eq!(
        scheduler.state_of(&origin_id),
        Some(JobState::Failed(FailureKind::UnresolvableReference))
    );
    assert_eq!(scheduler.job_count(), 1, "nothing was spliced");
}

#[test]
fn failed_expansion_member_fails_the_origin() {
    let origin = value_job("origin", json!(null));
    let origin_id = origin.id();
    let flow = Flow::new("expanding").with_node(origin);
    let mut scheduler = Scheduler::from_flow(&flow, RunId::new(), 1).unwrap();
    scheduler.start();

    let child = value_job("child", json!(1));
    let child_id = child.id();
    let expansion = Expansion::new(
        Flow::new("children")
            .with_output("y", child.output())
            .with_node(child),
    );
    scheduler.step_completion(origin_id, JobOutcome::Completed(expansion.into()));

    let step = scheduler.step_completion(
        child_id,
        JobOutcome::Failed {
            message: "child broke".to_string(),
            attempts: 1,
        },
    );

    assert!(step.run_just_finished);
    assert_eq!(
        scheduler.state_of(&origin_id),
        Some(JobState::Failed(FailureKind::UpstreamFailure))
    );
    assert_eq!(
        scheduler.store().failure_of(&origin_id).and_then(|f| f.cause),
        Some(child_id)
    );
}

#[test]
fn expansion_after_cancel_is_discarded() {
    let origin = value_job("origin", json!(null));
    let origin_id = origin.id();
    let flow = Flow::new("late expansion").with_node(origin);
    let mut scheduler = Scheduler::from_flow(&flow, RunId::new(), 1).unwrap();
    scheduler.start();
    scheduler.step_cancel();

    let child = value_job("child", json!(1));
    let expansion = Expansion::new(Flow::new("children").with_node(child));
    let step = scheduler.step_completion(origin_id, JobOutcome::Completed(expansion.into()));

    assert!(step.newly_scheduled.is_empty());
    assert!(step.run_just_finished);
    assert_eq!(
        scheduler.state_of(&origin_id),
        Some(JobState::Failed(FailureKind::Cancelled))
    );
    assert_eq!(scheduler.job_count(), 1);
}

#[test]
fn retry_keeps_the_job_running_with_a_new_attempt() {
    let job = value_job("retried", json!(1));
    let id = job.id();
    let flow = Flow::new("retry").with_node(job);
    let scheduler = Scheduler::from_flow(&flow, RunId::new(), 1).unwrap();
    let mut core = CoreRuntime::new(scheduler, RetryPolicy::immediate(1));

    let start = core.start();
    assert_eq!(start.dispatched()[0].attempt, 1);

    let retry = core.step(RuntimeEvent::JobFinished {
        job: id,
        attempt: 1,
        result: Err("flaky".to_string()),
    });
    let dispatched = retry.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].attempt, 2);
    assert_eq!(core.scheduler().state_of(&id), Some(JobState::Running));

    // A late report from the first attempt must not count.
    let stale = core.step(RuntimeEvent::JobFinished {
        job: id,
        attempt: 1,
        result: Ok(Response::done(json!("late"))),
    });
    assert!(stale.commands.is_empty());
    assert_eq!(core.scheduler().state_of(&id), Some(JobState::Running));

    let last = core.step(RuntimeEvent::JobFinished {
        job: id,
        attempt: 2,
        result: Err("flaky again".to_string()),
    });
    assert!(!last.keep_running);
    let failure = core.scheduler().store().failure_of(&id).cloned().unwrap();
    assert_eq!(failure.kind, FailureKind::CallableError);
    assert_eq!(failure.attempts, 2);
    assert_eq!(failure.message, "flaky again");
}

#[test]
fn expansion_referencing_its_origin_is_rejected() {
    let origin = value_job("origin", json!(null));
    let (origin_id, own) = (origin.id(), origin.output());
    let flow = Flow::new("self reference").with_node(origin);
    let mut scheduler = Scheduler::from_flow(&flow, RunId::new(), 1).unwrap();
    scheduler.start();

    let child = Job::new("child", doubling_callable()).with_input("x", own);
    let expansion = Expansion::new(Flow::new("loop back").with_node(child));
    let step = scheduler.step_completion(origin_id, JobOutcome::Completed(expansion.into()));

    assert_eq!(step.newly_failed, vec![origin_id]);
    assert!(step.run_just_finished);
    assert_eq!(
        scheduler.state_of(&origin_id),
        Some(JobState::Failed(FailureKind::UnresolvableReference))
    );
    assert_eq!(scheduler.job_count(), 1, "nothing was spliced");
    let failure = scheduler.store().failure_of(&origin_id).cloned().unwrap();
    assert!(failure.message.contains("waits on the expansion"), "{}", failure.message);
}

#[test]
fn expansion_referencing_a_dependent_of_its_origin_is_rejected() {
    let origin = value_job("origin", json!(null));
    let after = Job::new("after", doubling_callable()).with_input("x", origin.output());
    let (origin_id, after_id, after_out) = (origin.id(), after.id(), after.output());
    let flow = Flow::new("downstream loop").with_nodes([origin, after]);
    let mut scheduler = Scheduler::from_flow(&flow, RunId::new(), 1).unwrap();
    scheduler.start();

    let child = Job::new("child", doubling_callable()).with_input("x", after_out);
    let expansion = Expansion::new(Flow::new("loop back").with_node(child));
    let step = scheduler.step_completion(origin_id, JobOutcome::Completed(expansion.into()));

    assert_eq!(step.newly_failed, vec![origin_id, after_id]);
    assert!(step.run_just_finished);
    assert_eq!(
        scheduler.state_of(&after_id),
        Some(JobState::Failed(FailureKind::UpstreamFailure))
    );
}

#[test]
fn nested_expansion_referencing_the_outer_origin_is_rejected() {
    let origin = value_job("origin", json!(null));
    let (origin_id, own) = (origin.id(), origin.output());
    let flow = Flow::new("nested loop").with_node(origin);
    let mut scheduler = Scheduler::from_flow(&flow, RunId::new(), 1).unwrap();
    scheduler.start();

    let child = value_job("child", json!(null));
    let child_id = child.id();
    let outer = Expansion::new(
        Flow::new("children")
            .with_output("y", child.output())
            .with_node(child),
    );
    scheduler.step_completion(origin_id, JobOutcome::Completed(outer.into()));
    assert_eq!(scheduler.state_of(&child_id), Some(JobState::Running));

    let grandchild = Job::new("grandchild", doubling_callable()).with_input("x", own);
    let inner = Expansion::new(Flow::new("grandchildren").with_node(grandchild));
    let step = scheduler.step_completion(child_id, JobOutcome::Completed(inner.into()));

    assert_eq!(step.newly_failed, vec![child_id, origin_id]);
    assert!(step.run_just_finished);
    assert_eq!(scheduler.job_count(), 2);
    assert_eq!(
        scheduler.store().failure_of(&origin_id).and_then(|f| f.cause),
        Some(child_id)
    );
}
