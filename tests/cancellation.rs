mod common;

use common::{expect_idle, expect_none_ready, expect_step, machine_for};
use taskdock::docker::{DockerContainer, DockerImage, DockerNetwork};
use taskdock::engine::{CleanupPolicy, ManualCleanup, TaskEvent, TaskStep};
use taskdock_test_utils::{ConfigFileBuilder, ContainerConfigBuilder};

#[test]
fn ctrl_c_while_task_is_running_tears_everything_down() {
    let cfg = ConfigFileBuilder::new("demo")
        .with_container(
            "app",
            ContainerConfigBuilder::pulled("app:latest")
                .depends_on("db")
                .build(),
        )
        .with_container(
            "db",
            ContainerConfigBuilder::pulled("postgres:13")
                .health_check("pg_isready")
                .build(),
        )
        .with_task("run", "app")
        .build();
    let (machine, token) = machine_for(&cfg, "run", CleanupPolicy::CleanupAlways);

    // Drive both containers up and the task container into its run.
    let _ = expect_step(&machine, false);
    machine.post_event(TaskEvent::TaskNetworkReady {
        network: DockerNetwork::new("n1", "demo-net"),
    });

    for name in ["app", "db"] {
        machine.post_event(TaskEvent::ImagePulled {
            container: name.into(),
            image: DockerImage::new(format!("img-{name}")),
        });
        machine.post_event(TaskEvent::ContainerCreated {
            container: name.into(),
            handle: DockerContainer::new(format!("c-{name}"), format!("demo-{name}")),
        });
        machine.post_event(TaskEvent::ContainerStarted {
            container: name.into(),
        });
        machine.post_event(TaskEvent::ContainerBecameHealthy {
            container: name.into(),
        });
        machine.post_event(TaskEvent::SetupCommandsCompleted {
            container: name.into(),
        });
    }

    // Drain the steps those events satisfied until the attached run pops.
    let run_step = loop {
        match expect_step(&machine, true) {
            step @ TaskStep::RunContainer { .. } => break step,
            _ => continue,
        }
    };
    assert!(
        matches!(run_step, TaskStep::RunContainer { ref container, .. } if container.name == "app")
    );

    // Ctrl-C.
    machine.post_event(TaskEvent::UserRequestedCancellation);
    assert!(token.is_cancelled());

    // The attached run is still in flight; nothing new is handed out.
    expect_none_ready(&machine, true);

    // The runner observes the cancellation and reports the run as failed.
    machine.post_event(TaskEvent::ContainerRunFailed {
        container: "app".into(),
        message: "operation cancelled".into(),
    });

    // Cleanup: both containers stopped and removed, then the network goes.
    let mut stopped = Vec::new();
    let mut removed = Vec::new();
    let mut network_removed = false;

    loop {
        match machine.pop_next_step(false) {
            taskdock::engine::NextStep::Ready(TaskStep::StopContainer {
                container, ..
            }) => {
                stopped.push(container.clone());
                machine.post_event(TaskEvent::ContainerStopped { container });
            }
            taskdock::engine::NextStep::Ready(TaskStep::RemoveContainer {
                container, ..
            }) => {
                removed.push(container.clone());
                machine.post_event(TaskEvent::ContainerRemoved { container });
            }
            taskdock::engine::NextStep::Ready(TaskStep::DeleteTaskNetwork { .. }) => {
                network_removed = true;
                machine.post_event(TaskEvent::TaskNetworkRemoved);
            }
            taskdock::engine::NextStep::NoneAndIdle => break,
            other => panic!("unexpected cleanup result: {other:?}"),
        }
    }

    assert!(stopped.contains(&"app".to_string()), "task container must be stopped");
    assert!(stopped.contains(&"db".to_string()));
    assert_eq!(removed.len(), 2);
    assert!(network_removed);

    let status = machine.status();
    assert!(status.failed);
    assert_eq!(status.manual_cleanup, ManualCleanup::None);
    assert_ne!(status.process_exit_code(), 0);
}

#[test]
fn cancellation_before_any_resources_exist_ends_quietly() {
    let cfg = ConfigFileBuilder::new("demo")
        .with_container("app", ContainerConfigBuilder::pulled("alpine:3.19").build())
        .with_task("run", "app")
        .build();
    let (machine, token) = machine_for(&cfg, "run", CleanupPolicy::CleanupAlways);

    // Interrupt before even the network preparation was handed out.
    machine.post_event(TaskEvent::UserRequestedCancellation);
    assert!(token.is_cancelled());

    // Nothing exists, so cleanup has nothing to do.
    expect_idle(&machine);

    let status = machine.status();
    assert!(status.failed);
    assert_eq!(status.manual_cleanup, ManualCleanup::None);
    assert_eq!(status.exit_code, None);
}
