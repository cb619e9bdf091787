//! Core build logic for the link graph.
//!
//! Ties a [`linkgraph_crawler::LinkSource`] and a
//! [`linkgraph_storage::KeyValueStore`] together into the two-phase build:
//! node construction, a barrier, then edge materialization.

pub mod edge_materializer;
pub mod executor;
pub mod failure;
pub mod node_builder;
pub mod pipeline;

#[cfg(test)]
mod testing;

pub use edge_materializer::{EdgeOutcome, LinkFailure, materialize_edges};
pub use executor::{LocalExecutor, TaskHandle, TaskOutcome};
pub use failure::{FailureKind, TitleFailure};
pub use node_builder::{BuiltNode, build_node};
pub use pipeline::{
    BuildReport, FailedTitle, GraphBuilder, Phase, PhaseReport, ProgressReporter, SilentProgress,
};
