// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod demo;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod makers;
pub mod response;
pub mod store;
pub mod types;

pub use dag::{Flow, Input, Job, JobId, Node, OutputReference, RunId};
pub use engine::{CancelHandle, RunReport, RunStatus, Runner, RunnerConfig};
pub use response::{Expansion, Response};
pub use store::ResultStore;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{default_config_path, load_or_default};
use crate::makers::MakeContext;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - building the selected demo flow
/// - runner / executor
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let cfg = load_or_default(&config_path)?;
    debug!(?cfg, "configuration loaded");

    let ctx = MakeContext::new(demo::synthetic_calculators());
    let flow = demo::build(args.demo, &cfg, &ctx)?;
    flow.validate()?;

    if args.dry_run {
        print_dry_run(&flow);
        return Ok(());
    }

    let runner = Runner::new(cfg.runner_config()).with_run_id(ctx.run_id);

    // Ctrl-C → cooperative cancellation.
    {
        let cancel = runner.cancel_handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            warn!("Ctrl-C received; cancelling run");
            cancel.cancel().await;
        });
    }

    let report = runner.run(&flow).await?;
    info!(status = report.status.as_str(), "run complete");
    for failure in report.root_failures() {
        warn!(
            job = %failure.job,
            kind = %failure.kind,
            error = %failure.message,
            "job failed at its source"
        );
    }

    println!("{}", serde_json::to_string_pretty(&report.to_json())?);

    if report.status != RunStatus::Succeeded {
        anyhow::bail!("run {} finished with status {}", report.run_id, report.status.as_str());
    }
    Ok(())
}

/// Simple dry-run output: print the flow tree, inputs and fingerprint.
fn print_dry_run(flow: &Flow) {
    println!("flowdag dry-run");
    println!("  flow = {}", flow.name());
    println!("  jobs = {}", flow.job_count());
    println!("  fingerprint = {}", flow.fingerprint());
    println!();
    print_flow(flow, 1);

    debug!("dry-run complete (no execution)");
}

fn print_flow(flow: &Flow, depth: usize) {
    let pad = "  ".repeat(depth);
    for node in flow.nodes() {
        match node {
            Node::Job(job) => {
                println!("{pad}- job {} [{}]", job.name(), job.id().short());
                for (name, input) in job.inputs() {
                    let refs: Vec<String> =
                        input.references().iter().map(|r| r.to_string()).collect();
                    if !refs.is_empty() {
                        println!("{pad}    {name} <- {}", refs.join(", "));
                    }
                }
            }
            Node::Flow(sub) => {
                println!("{pad}- flow {}", sub.name());
                print_flow(sub, depth + 1);
            }
        }
    }
    if !flow.output().is_empty() {
        let keys: Vec<&str> = flow.output().keys().map(String::as_str).collect();
        println!("{pad}  output: {}", keys.join(", "));
    }
}
