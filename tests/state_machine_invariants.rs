mod common;

use common::{expect_none_ready, expect_step, machine_for};
use taskdock::docker::{DockerImage, DockerNetwork};
use taskdock::engine::{CleanupPolicy, TaskEvent, TaskStep};
use taskdock_test_utils::{ConfigFileBuilder, ContainerConfigBuilder};

fn solo_config() -> taskdock::config::ConfigFile {
    ConfigFileBuilder::new("demo")
        .with_container("app", ContainerConfigBuilder::pulled("alpine:3.19").build())
        .with_task("run", "app")
        .build()
}

#[test]
fn posting_the_same_event_twice_is_idempotent() {
    let cfg = solo_config();
    let (machine, _token) = machine_for(&cfg, "run", CleanupPolicy::CleanupAlways);

    let _ = expect_step(&machine, false);

    let ready = TaskEvent::TaskNetworkReady {
        network: DockerNetwork::new("n1", "demo-net"),
    };
    machine.post_event(ready.clone());
    machine.post_event(ready);

    let status = machine.status();
    let count = status
        .events
        .iter()
        .filter(|e| matches!(e, TaskEvent::TaskNetworkReady { .. }))
        .count();
    assert_eq!(count, 1);
}

#[test]
fn steps_are_one_shot_per_stage() {
    let cfg = solo_config();
    let (machine, _token) = machine_for(&cfg, "run", CleanupPolicy::CleanupAlways);

    // The network rule fires exactly once, even though its preconditions
    // still hold on re-evaluation.
    let step = expect_step(&machine, false);
    assert!(matches!(step, TaskStep::PrepareTaskNetwork));
    expect_none_ready(&machine, true);

    // Same for a per-container rule.
    machine.post_event(TaskEvent::TaskNetworkReady {
        network: DockerNetwork::new("n1", "demo-net"),
    });
    let step = expect_step(&machine, true);
    assert!(matches!(step, TaskStep::PullImage { .. }));
    expect_none_ready(&machine, true);
}

#[test]
fn duplicate_completion_does_not_produce_a_second_step() {
    let cfg = solo_config();
    let (machine, _token) = machine_for(&cfg, "run", CleanupPolicy::CleanupAlways);

    let _ = expect_step(&machine, false);
    machine.post_event(TaskEvent::TaskNetworkReady {
        network: DockerNetwork::new("n1", "demo-net"),
    });

    let _ = expect_step(&machine, false);
    let pulled = TaskEvent::ImagePulled {
        container: "app".into(),
        image: DockerImage::new("img-app"),
    };
    machine.post_event(pulled.clone());

    let step = expect_step(&machine, false);
    assert!(matches!(step, TaskStep::CreateContainer { .. }));

    // Re-posting the pull completion must not re-arm the create rule.
    machine.post_event(pulled);
    expect_none_ready(&machine, true);
}

#[test]
#[should_panic(expected = "internal invariant violated")]
fn no_steps_ready_with_no_workers_running_is_fatal() {
    let cfg = solo_config();
    let (machine, _token) = machine_for(&cfg, "run", CleanupPolicy::CleanupAlways);

    // The network step is handed out but its completion never arrives, and
    // the caller claims nothing is running: an unreachable state.
    let _ = expect_step(&machine, false);
    let _ = machine.pop_next_step(false);
}

#[test]
fn progress_events_do_not_disturb_rule_evaluation() {
    let cfg = solo_config();
    let (machine, _token) = machine_for(&cfg, "run", CleanupPolicy::CleanupAlways);

    let _ = expect_step(&machine, false);
    machine.post_event(TaskEvent::TaskNetworkReady {
        network: DockerNetwork::new("n1", "demo-net"),
    });

    let _ = expect_step(&machine, false);
    machine.post_event(TaskEvent::ImagePullProgress {
        container: "app".into(),
        progress: "layer 1/5".into(),
    });
    machine.post_event(TaskEvent::ImagePullProgress {
        container: "app".into(),
        progress: "layer 2/5".into(),
    });

    // Progress alone is not completion.
    expect_none_ready(&machine, true);

    machine.post_event(TaskEvent::ImagePulled {
        container: "app".into(),
        image: DockerImage::new("img-app"),
    });
    let step = expect_step(&machine, false);
    assert!(matches!(step, TaskStep::CreateContainer { .. }));
}
