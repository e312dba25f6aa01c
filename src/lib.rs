// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod docker;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::{ConfigFile, ImageSource};
use crate::dag::ContainerGraph;
use crate::docker::{DaemonClient, DockerClient};
use crate::engine::{
    plan_run_stage, Dispatcher, ManualCleanup, TaskEvent, TaskStateMachine, TaskStatus,
};
use crate::exec::DockerStepRunner;

/// High-level entry point used by `main.rs`.
///
/// Wires together config loading, graph resolution, the state machine, the
/// worker-pool dispatcher and Ctrl-C handling, and returns the exit code
/// the process should surface.
pub async fn run(args: CliArgs) -> Result<i32> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    let graph = ContainerGraph::resolve(&cfg, &args.task)?;

    if args.dry_run {
        print_dry_run(&cfg, &args.task, &graph);
        return Ok(0);
    }

    let cancellation = CancellationToken::new();
    let machine = Arc::new(TaskStateMachine::new(
        plan_run_stage(&graph),
        args.cleanup_policy(),
        graph.task_container().name.clone(),
        cancellation,
    ));

    // Ctrl-C is just another failure event as far as the engine is
    // concerned; cleanup still runs subject to the policy.
    {
        let machine = Arc::clone(&machine);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!();
                machine.post_event(TaskEvent::UserRequestedCancellation);
            }
        });
    }

    let client: Arc<dyn DockerClient> = Arc::new(DaemonClient::connect()?);
    let runner = Arc::new(DockerStepRunner::new(
        Arc::clone(&machine),
        client,
        cfg.project.name.clone(),
        config_root_dir(&config_path),
    ));

    info!(task = %args.task, containers = graph.len(), "starting task");

    let dispatcher = Dispatcher::new(
        Arc::clone(&machine),
        runner,
        args.effective_parallelism(),
    );
    dispatcher.run().await;

    let status = machine.status();
    report_outcome(&args.task, &status);

    Ok(status.process_exit_code())
}

/// Directory containing the config file; build directories are relative
/// to it.
fn config_root_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Print failure messages and any required manual cleanup.
fn report_outcome(task: &str, status: &TaskStatus) {
    if status.failed {
        for event in status.events.iter() {
            if let Some(message) = event.failure_message() {
                eprintln!("taskdock: {message}");
            }
        }
        eprintln!("taskdock: task '{task}' failed.");
    }

    match &status.manual_cleanup {
        ManualCleanup::None => {}
        ManualCleanup::RequiredDueToFailure(cmds) => {
            print_manual_cleanup("cleanup after failure is disabled", cmds);
        }
        ManualCleanup::RequiredDueToSuccess(cmds) => {
            print_manual_cleanup("cleanup after success is disabled", cmds);
        }
        ManualCleanup::RequiredDueToCleanupFailure(cmds) => {
            print_manual_cleanup("cleanup failed", cmds);
        }
    }

    debug!(exit_code = ?status.exit_code, failed = status.failed, "task finished");
}

fn print_manual_cleanup(reason: &str, commands: &[String]) {
    eprintln!("taskdock: {reason}; containers have been left behind.");
    eprintln!("taskdock: to clean up manually, run:");
    for cmd in commands {
        eprintln!("    {cmd}");
    }
}

/// Simple dry-run output: print the task and the resolved container graph.
fn print_dry_run(cfg: &ConfigFile, task_name: &str, graph: &ContainerGraph) {
    println!("taskdock dry-run");
    println!("  project: {}", cfg.project.name);

    if let Some(task) = cfg.task.get(task_name) {
        println!("  task: {task_name}");
        if let Some(ref description) = task.description {
            println!("      {description}");
        }
        println!("      task container: {}", task.container);
    }

    let mut names: Vec<_> = graph.nodes().map(|c| c.name.clone()).collect();
    names.sort();

    println!();
    println!("containers ({}):", names.len());
    for name in names {
        let container = match graph.container(&name) {
            Some(c) => c,
            None => continue,
        };

        println!("  - {name}");
        match container.image_source() {
            ImageSource::Build { directory } => println!("      build: {directory}"),
            ImageSource::Pull { reference, .. } => println!("      image: {reference}"),
        }

        let deps = graph.dependencies_of(&name);
        if !deps.is_empty() {
            let dep_names: Vec<_> = deps.iter().map(|d| d.name.as_str()).collect();
            println!("      depends on: {dep_names:?}");
        }
        if container.has_health_check() {
            println!("      health check: yes");
        }
        if container.has_setup_commands() {
            println!(
                "      setup commands: {}",
                container.config.setup_commands.len()
            );
        }
    }
}
