use std::sync::Arc;

use taskdock::dag::ContainerGraph;
use taskdock::engine::{
    plan_run_stage, CancellationToken, CleanupPolicy, Dispatcher, ManualCleanup, TaskEvent,
    TaskStateMachine,
};
use taskdock_test_utils::{ConfigFileBuilder, ContainerConfigBuilder, FakeStepRunner};

fn machine_for(
    cfg: &taskdock::config::ConfigFile,
    task: &str,
    policy: CleanupPolicy,
) -> Arc<TaskStateMachine> {
    let graph = ContainerGraph::resolve(cfg, task).expect("graph should resolve");
    Arc::new(TaskStateMachine::new(
        plan_run_stage(&graph),
        policy,
        graph.task_container().name.clone(),
        CancellationToken::new(),
    ))
}

fn app_with_db() -> taskdock::config::ConfigFile {
    ConfigFileBuilder::new("demo")
        .with_container(
            "app",
            ContainerConfigBuilder::pulled("app:latest")
                .depends_on("db")
                .build(),
        )
        .with_container(
            "db",
            ContainerConfigBuilder::built("docker/db")
                .health_check("pg_isready")
                .build(),
        )
        .with_task("run", "app")
        .build()
}

#[tokio::test(flavor = "multi_thread")]
async fn dispatcher_drives_a_task_with_dependency_to_completion() {
    let cfg = app_with_db();
    let machine = machine_for(&cfg, "run", CleanupPolicy::CleanupAlways);

    let runner = FakeStepRunner::new(Arc::clone(&machine)).with_task_exit_code(7);
    let executed = runner.executed_handle();

    let dispatcher = Dispatcher::new(Arc::clone(&machine), Arc::new(runner), 4);
    dispatcher.run().await;

    let status = machine.status();
    assert!(!status.failed);
    assert_eq!(status.exit_code, Some(7));
    assert_eq!(status.manual_cleanup, ManualCleanup::None);
    assert_eq!(status.process_exit_code(), 7);

    let steps = executed.lock().unwrap().clone();
    assert!(steps.iter().any(|s| s == "prepare task network"));
    assert!(steps.iter().any(|s| s == "build image for 'db'"));
    assert!(steps.iter().any(|s| s == "pull image for 'app'"));
    assert!(steps.iter().any(|s| s == "run 'app'"));
    assert!(steps.iter().any(|s| s == "delete task network"));

    // The dependency became healthy before the task container started.
    let healthy_db = steps
        .iter()
        .position(|s| s == "wait for 'db' to become healthy")
        .expect("db health wait must run");
    let start_app = steps
        .iter()
        .position(|s| s == "start container 'app'")
        .expect("app start must run");
    assert!(healthy_db < start_app);

    // Everything that was created was also removed.
    assert!(machine
        .status()
        .events
        .iter()
        .any(|e| matches!(e, TaskEvent::TaskNetworkRemoved)));
}

#[tokio::test(flavor = "multi_thread")]
async fn dispatcher_handles_an_image_failure_and_still_cleans_up() {
    let cfg = app_with_db();
    let machine = machine_for(&cfg, "run", CleanupPolicy::CleanupAlways);

    let runner =
        FakeStepRunner::new(Arc::clone(&machine)).with_image_failure("db", "oom");

    let dispatcher = Dispatcher::new(Arc::clone(&machine), Arc::new(runner), 4);
    dispatcher.run().await;

    let status = machine.status();
    assert!(status.failed);
    assert_eq!(status.exit_code, None);
    assert_ne!(status.process_exit_code(), 0);

    // Whatever was created got removed again; the network always goes.
    assert!(status
        .events
        .iter()
        .any(|e| matches!(e, TaskEvent::TaskNetworkRemoved)));
    let created: Vec<_> = status
        .events
        .iter()
        .filter_map(|e| match e {
            TaskEvent::ContainerCreated { container, .. } => Some(container.clone()),
            _ => None,
        })
        .collect();
    for container in created {
        assert!(status
            .events
            .iter()
            .any(|e| matches!(e, TaskEvent::ContainerRemoved { container: c } if c == &container)));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn single_worker_dispatcher_also_completes() {
    let cfg = ConfigFileBuilder::new("demo")
        .with_container("app", ContainerConfigBuilder::pulled("alpine:3.19").build())
        .with_task("run", "app")
        .build();
    let machine = machine_for(&cfg, "run", CleanupPolicy::CleanupAlways);

    let runner = FakeStepRunner::new(Arc::clone(&machine));
    let dispatcher = Dispatcher::new(Arc::clone(&machine), Arc::new(runner), 1);
    dispatcher.run().await;

    let status = machine.status();
    assert!(!status.failed);
    assert_eq!(status.exit_code, Some(0));
}
