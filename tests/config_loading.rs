use std::io::Write;

use taskdock::config::model::{parse_duration, PullPolicy};
use taskdock::config::{load_and_validate, load_from_path};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("creating temp config");
    file.write_all(contents.as_bytes()).expect("writing config");
    file
}

#[test]
fn full_featured_config_loads() {
    let file = write_config(
        r#"
[project]
name = "shop"

[task.integration-tests]
description = "Run the integration test suite."
container = "tests"
dependencies = ["stub-payments"]

[container.tests]
build_directory = "docker/tests"
command = "./gradlew integrationTest"
working_directory = "/code"
environment = { DB_HOST = "db", GITHUB_TOKEN = "$GITHUB_TOKEN" }
dependencies = ["db"]
volumes = [".:/code:cached"]
ports = ["8080:80"]
run_as_current_user = true

[[container.tests.setup_commands]]
command = "./wait-for-migrations.sh"
working_directory = "/code/scripts"

[container.db]
image = "postgres:13"
pull_policy = "always"

[container.db.health_check]
command = "pg_isready -U postgres"
interval = "1s"
retries = 30
start_period = "2s"

[container.stub-payments]
image = "stub-payments:latest"
"#,
    );

    let cfg = load_and_validate(file.path()).expect("config should load");

    assert_eq!(cfg.project.name, "shop");
    assert_eq!(cfg.task.len(), 1);
    assert_eq!(cfg.container.len(), 3);

    let tests = &cfg.container["tests"];
    assert_eq!(tests.build_directory.as_deref(), Some("docker/tests"));
    assert_eq!(tests.dependencies, vec!["db".to_string()]);
    assert_eq!(tests.setup_commands.len(), 1);
    assert_eq!(
        tests.setup_commands[0].working_directory.as_deref(),
        Some("/code/scripts")
    );
    assert!(tests.run_as_current_user);
    assert_eq!(tests.environment["GITHUB_TOKEN"], "$GITHUB_TOKEN");

    let db = &cfg.container["db"];
    assert_eq!(db.pull_policy, PullPolicy::Always);
    let hc = db.health_check.as_ref().expect("db has a health check");
    assert_eq!(hc.effective_retries(), 30);
    assert_eq!(hc.effective_interval(), std::time::Duration::from_secs(1));
    assert_eq!(
        hc.effective_start_period(),
        std::time::Duration::from_secs(2)
    );

    let task = &cfg.task["integration-tests"];
    assert_eq!(task.container, "tests");
    assert_eq!(task.dependencies, vec!["stub-payments".to_string()]);
}

#[test]
fn missing_container_reference_is_rejected() {
    let file = write_config(
        r#"
[project]
name = "demo"

[task.run]
container = "ghost"
"#,
    );

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(err.to_string().contains("unknown container 'ghost'"));
}

#[test]
fn container_with_both_image_sources_is_rejected() {
    let file = write_config(
        r#"
[project]
name = "demo"

[task.run]
container = "app"

[container.app]
image = "app:latest"
build_directory = "docker/app"
"#,
    );

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(err.to_string().contains("both"));
}

#[test]
fn container_without_an_image_source_is_rejected() {
    let file = write_config(
        r#"
[project]
name = "demo"

[task.run]
container = "app"

[container.app]
command = "echo hi"
"#,
    );

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(err.to_string().contains("neither"));
}

#[test]
fn dependency_cycle_is_rejected() {
    let file = write_config(
        r#"
[project]
name = "demo"

[task.run]
container = "a"

[container.a]
image = "a:1"
dependencies = ["b"]

[container.b]
image = "b:1"
dependencies = ["a"]
"#,
    );

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(err.to_string().contains("cycle"));
}

#[test]
fn config_without_tasks_is_rejected() {
    let file = write_config(
        r#"
[project]
name = "demo"

[container.app]
image = "app:latest"
"#,
    );

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(err.to_string().contains("at least one"));
}

#[test]
fn self_dependency_is_rejected() {
    let file = write_config(
        r#"
[project]
name = "demo"

[task.run]
container = "app"

[container.app]
image = "app:latest"
dependencies = ["app"]
"#,
    );

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(err.to_string().contains("cannot depend on itself"));
}

#[test]
fn loading_without_validation_accepts_semantic_errors() {
    let file = write_config(
        r#"
[project]
name = "demo"

[task.run]
container = "ghost"
"#,
    );

    // Parsing alone succeeds; only validation rejects the dangling reference.
    assert!(load_from_path(file.path()).is_ok());
}

#[test]
fn duration_strings_parse() {
    use std::time::Duration;

    assert_eq!(parse_duration("300ms"), Some(Duration::from_millis(300)));
    assert_eq!(parse_duration("2s"), Some(Duration::from_secs(2)));
    assert_eq!(parse_duration("1m"), Some(Duration::from_secs(60)));
    assert_eq!(parse_duration(" 5s "), Some(Duration::from_secs(5)));
    assert_eq!(parse_duration("nonsense"), None);
    assert_eq!(parse_duration(""), None);
}
