//! Shared helpers for taskdock's integration tests: config builders and a
//! fake step runner that synthesizes lifecycle events without a daemon.

pub mod builders;
pub mod fake_runner;

pub use builders::{ConfigFileBuilder, ContainerConfigBuilder};
pub use fake_runner::FakeStepRunner;
