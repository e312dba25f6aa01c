mod common;

use common::{expect_idle, expect_step, machine_for};
use taskdock::docker::{DockerContainer, DockerImage, DockerNetwork};
use taskdock::engine::{CleanupPolicy, ManualCleanup, TaskEvent, TaskStep};
use taskdock_test_utils::{ConfigFileBuilder, ContainerConfigBuilder};

fn solo_config() -> taskdock::config::ConfigFile {
    ConfigFileBuilder::new("demo")
        .with_container("app", ContainerConfigBuilder::pulled("alpine:3.19").build())
        .with_task("run", "app")
        .build()
}

#[test]
fn solo_pulled_task_runs_through_the_full_lifecycle() {
    let cfg = solo_config();
    let (machine, _token) = machine_for(&cfg, "run", CleanupPolicy::CleanupAlways);

    let step = expect_step(&machine, false);
    assert!(matches!(step, TaskStep::PrepareTaskNetwork));
    machine.post_event(TaskEvent::TaskNetworkReady {
        network: DockerNetwork::new("n1", "demo-net"),
    });

    let step = expect_step(&machine, false);
    assert!(matches!(step, TaskStep::PullImage { ref container } if container.name == "app"));
    machine.post_event(TaskEvent::ImagePulled {
        container: "app".into(),
        image: DockerImage::new("img-app"),
    });

    let step = expect_step(&machine, false);
    assert!(
        matches!(step, TaskStep::CreateContainer { ref container, ref image, ref network }
            if container.name == "app" && image.id == "img-app" && network.id == "n1")
    );
    machine.post_event(TaskEvent::ContainerCreated {
        container: "app".into(),
        handle: DockerContainer::new("c1", "demo-app"),
    });

    let step = expect_step(&machine, false);
    assert!(matches!(step, TaskStep::StartContainer { ref container, .. } if container.name == "app"));
    machine.post_event(TaskEvent::ContainerStarted {
        container: "app".into(),
    });

    let step = expect_step(&machine, false);
    assert!(matches!(step, TaskStep::WaitForHealth { ref container, .. } if container.name == "app"));
    machine.post_event(TaskEvent::ContainerBecameHealthy {
        container: "app".into(),
    });

    let step = expect_step(&machine, false);
    assert!(
        matches!(step, TaskStep::RunSetupCommands { ref container, .. } if container.name == "app")
    );
    machine.post_event(TaskEvent::SetupCommandsCompleted {
        container: "app".into(),
    });

    let step = expect_step(&machine, false);
    assert!(matches!(step, TaskStep::RunContainer { ref container, .. } if container.name == "app"));
    machine.post_event(TaskEvent::RunningContainerExited {
        container: "app".into(),
        exit_code: 0,
    });

    // Cleanup: stop, remove, delete the network.
    let step = expect_step(&machine, false);
    assert!(matches!(step, TaskStep::StopContainer { ref container, .. } if container == "app"));
    machine.post_event(TaskEvent::ContainerStopped {
        container: "app".into(),
    });

    let step = expect_step(&machine, false);
    assert!(matches!(step, TaskStep::RemoveContainer { ref container, .. } if container == "app"));
    machine.post_event(TaskEvent::ContainerRemoved {
        container: "app".into(),
    });

    let step = expect_step(&machine, false);
    assert!(matches!(step, TaskStep::DeleteTaskNetwork { ref network } if network.id == "n1"));
    machine.post_event(TaskEvent::TaskNetworkRemoved);

    expect_idle(&machine);

    let status = machine.status();
    assert_eq!(status.exit_code, Some(0));
    assert!(!status.failed);
    assert_eq!(status.manual_cleanup, ManualCleanup::None);
    assert_eq!(status.process_exit_code(), 0);
}

#[test]
fn idle_is_stable_once_reached() {
    let cfg = solo_config();
    let (machine, _token) = machine_for(&cfg, "run", CleanupPolicy::CleanupAlways);

    drive_to_completion(&machine, 0);

    expect_idle(&machine);
    expect_idle(&machine);
}

/// Drive a solo-app run to completion by answering every step with its
/// success event.
fn drive_to_completion(machine: &taskdock::engine::TaskStateMachine, exit_code: i64) {
    loop {
        let step = match machine.pop_next_step(false) {
            taskdock::engine::NextStep::Ready(step) => step,
            taskdock::engine::NextStep::NoneAndIdle => return,
            other => panic!("unexpected result while driving: {other:?}"),
        };

        match step {
            TaskStep::PrepareTaskNetwork => machine.post_event(TaskEvent::TaskNetworkReady {
                network: DockerNetwork::new("n1", "demo-net"),
            }),
            TaskStep::PullImage { container } => machine.post_event(TaskEvent::ImagePulled {
                container: container.name.clone(),
                image: DockerImage::new("img"),
            }),
            TaskStep::CreateContainer { container, .. } => {
                machine.post_event(TaskEvent::ContainerCreated {
                    container: container.name.clone(),
                    handle: DockerContainer::new("c1", "demo-app"),
                })
            }
            TaskStep::StartContainer { container, .. } => {
                machine.post_event(TaskEvent::ContainerStarted {
                    container: container.name.clone(),
                })
            }
            TaskStep::WaitForHealth { container, .. } => {
                machine.post_event(TaskEvent::ContainerBecameHealthy {
                    container: container.name.clone(),
                })
            }
            TaskStep::RunSetupCommands { container, .. } => {
                machine.post_event(TaskEvent::SetupCommandsCompleted {
                    container: container.name.clone(),
                })
            }
            TaskStep::RunContainer { container, .. } => {
                machine.post_event(TaskEvent::RunningContainerExited {
                    container: container.name.clone(),
                    exit_code,
                })
            }
            TaskStep::StopContainer { container, .. } => {
                machine.post_event(TaskEvent::ContainerStopped { container })
            }
            TaskStep::RemoveContainer { container, .. } => {
                machine.post_event(TaskEvent::ContainerRemoved { container })
            }
            TaskStep::DeleteTaskNetwork { .. } => {
                machine.post_event(TaskEvent::TaskNetworkRemoved)
            }
            other => panic!("unexpected step for a solo pulled task: {other}"),
        }
    }
}
