// src/dag/mod.rs

//! Container dependency graph.
//!
//! The graph is resolved once per task invocation: starting from the task
//! container, it pulls in every container transitively reachable through
//! `dependencies`, and rejects unknown references and cycles.

pub mod graph;

pub use graph::{Container, ContainerGraph, ContainerName, GraphError};
