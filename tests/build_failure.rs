mod common;

use common::{expect_idle, expect_none_ready, expect_step, machine_for};
use taskdock::docker::{DockerImage, DockerNetwork};
use taskdock::engine::{CleanupPolicy, ManualCleanup, TaskEvent, TaskStep};
use taskdock_test_utils::{ConfigFileBuilder, ContainerConfigBuilder};

fn app_with_built_db() -> taskdock::config::ConfigFile {
    ConfigFileBuilder::new("demo")
        .with_container(
            "app",
            ContainerConfigBuilder::pulled("app:latest")
                .depends_on("db")
                .build(),
        )
        .with_container("db", ContainerConfigBuilder::built("docker/db").build())
        .with_task("run", "app")
        .build()
}

#[test]
fn failed_dependency_build_cancels_the_run_and_cleans_up_the_network() {
    let cfg = app_with_built_db();
    let (machine, token) = machine_for(&cfg, "run", CleanupPolicy::CleanupAlways);

    let step = expect_step(&machine, false);
    assert!(matches!(step, TaskStep::PrepareTaskNetwork));
    machine.post_event(TaskEvent::TaskNetworkReady {
        network: DockerNetwork::new("n1", "demo-net"),
    });

    let step = expect_step(&machine, true);
    assert!(matches!(step, TaskStep::PullImage { ref container } if container.name == "app"));
    let step = expect_step(&machine, true);
    assert!(matches!(step, TaskStep::BuildImage { ref container } if container.name == "db"));

    // The build fails while the pull is still in flight.
    machine.post_event(TaskEvent::ImageBuildFailed {
        container: "db".into(),
        message: "oom".into(),
    });

    assert!(machine.task_failed());
    assert!(token.is_cancelled(), "failure must cancel in-flight work");

    // While the pull is draining, the machine hands out nothing.
    expect_none_ready(&machine, true);

    // The in-flight pull completes anyway; no container creation may follow.
    machine.post_event(TaskEvent::ImagePulled {
        container: "app".into(),
        image: DockerImage::new("img-app"),
    });
    expect_none_ready(&machine, true);

    // Drained: transition to cleanup. Nothing was created, so the only
    // teardown is the network itself.
    let step = expect_step(&machine, false);
    assert!(matches!(step, TaskStep::DeleteTaskNetwork { ref network } if network.id == "n1"));
    machine.post_event(TaskEvent::TaskNetworkRemoved);

    expect_idle(&machine);

    let status = machine.status();
    assert!(status.failed);
    assert_eq!(status.exit_code, None);
    assert_eq!(status.manual_cleanup, ManualCleanup::None);
    assert_ne!(status.process_exit_code(), 0);

    let failure_messages: Vec<_> = status
        .events
        .iter()
        .filter_map(|e| e.failure_message())
        .collect();
    assert!(failure_messages.iter().any(|m| m.contains("oom")));
}
