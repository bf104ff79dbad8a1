mod args;
mod demo;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use weft_core::{Completion, TaskState, Workflow, WorkflowConfig};

use args::Args;
use demo::{DemoSettings, OrderWorkflow};

fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
    debug!("logging initialized with level: {log_level}");
}

/// Configuration file first, then command line overrides.
fn load_config(args: &Args) -> Result<WorkflowConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<WorkflowConfig>(&raw)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => WorkflowConfig::named("Order Product Workflow"),
    };
    if let Some(name) = &args.name {
        config.name = Some(name.clone());
    }
    if let Some(policy) = args.policy {
        config.cancellation_policy = policy.into();
    }
    Ok(config)
}

/// Wait for the workflow, retrying failed tasks up to `max_retries` rounds.
/// A rejected external condition is final, since nothing provides it again.
/// Ctrl-C cancels everything still running.
async fn drive(workflow: &Workflow, max_retries: u32) -> Completion {
    let mut round = 0;
    let mut interrupted = false;
    loop {
        tokio::select! {
            completion = workflow.wait_until_finished() => {
                if completion.is_success() || interrupted || round >= max_retries {
                    return completion;
                }
                if rejected_condition(workflow).await {
                    warn!("an external condition was rejected, not retrying");
                    return completion;
                }
                round += 1;
                warn!(round, max_retries, "workflow finished with failures, retrying");
                workflow.retry_all().await;
            }
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                if let Err(err) = signal {
                    warn!(error = %err, "could not listen for ctrl-c");
                }
                warn!("interrupted, cancelling workflow");
                interrupted = true;
                workflow.cancel_all().await;
            }
        }
    }
}

async fn rejected_condition(workflow: &Workflow) -> bool {
    workflow
        .snapshots()
        .await
        .iter()
        .any(|task| task.is_external_condition && task.state == TaskState::Failed)
}

async fn report(workflow: &Workflow) {
    for task in workflow.snapshots().await {
        match &task.error {
            Some(error) => println!("{:<20} {:<10} {error}", task.name, task.state),
            None => println!(
                "{:<20} {:<10} {:>3.0}%",
                task.name,
                task.state,
                task.progress * 100.0
            ),
        }
    }
    println!("counts: {:?}", workflow.counts_by_state().await);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = load_config(&args)?;
    let settings = DemoSettings {
        time_scale: args.time_scale,
        failure_scale: args.failure_scale,
        reject_photo: args.reject_photo,
    };
    let order = OrderWorkflow::build(config, settings)
        .await
        .context("building the order workflow")?;
    let workflow = order.workflow.clone();

    info!(workflow = %workflow.id(), name = workflow.name(), "starting");
    workflow.start().await;
    order.provide_conditions(settings);

    let completion = drive(&workflow, args.max_retries).await;
    report(&workflow).await;

    match completion {
        Completion::Succeeded => {
            info!("order submitted");
            Ok(())
        }
        Completion::PartiallyFailed { failed, cancelled } => {
            bail!("workflow ended with {failed} failed and {cancelled} cancelled tasks")
        }
    }
}
