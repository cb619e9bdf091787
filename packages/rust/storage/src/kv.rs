//! The key-value contract shared by every store backend.
//!
//! Backends provide single-key primitives; the edge upsert protocol is built on
//! top of them once, in [`KeyValueStore::add_edge`].

use async_trait::async_trait;
use tracing::debug;

use linkgraph_shared::{
    Capacity, DEFAULT_EDGE_RETRY_BUDGET, GraphRecord, LinkGraphError, LinkSet, Result, RunId,
    Table, TableInfo,
};

/// Outcome of a write guarded by a precondition.
///
/// A failed precondition is a normal outcome, not an error: it is the only
/// signal `add_edge` uses to switch between its append and create branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalWrite {
    Applied,
    PreconditionFailed,
}

/// How `add_edge` got the destination into the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeWrite {
    /// Merged into an existing aggregate (including a no-op re-add).
    Appended,
    /// Created the aggregate with the destination as its only member.
    Created,
}

/// Typed accessor over the `Nodes` and `Edges` tables.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Create both tables if absent, recording the capacity policy. Idempotent.
    async fn ensure_schema(&self, capacity: &Capacity) -> Result<()>;

    /// Cheap round-trip proving the store is reachable.
    async fn ping(&self) -> Result<()>;

    /// Unconditionally write (or overwrite) the node record for `title`.
    async fn put_node(&self, title: &str, links: &LinkSet) -> Result<()>;

    /// Links of the node `title`, or [`LinkGraphError::NodeNotFound`].
    async fn get_links(&self, title: &str) -> Result<LinkSet>;

    /// Whether a node record exists for `title`.
    async fn node_exists(&self, title: &str) -> Result<bool>;

    /// Add `destination` to the aggregate of `source` only if that aggregate exists.
    async fn append_edge_if_exists(&self, source: &str, destination: &str)
    -> Result<ConditionalWrite>;

    /// Create the aggregate `{destination}` for `source` only if none exists.
    async fn create_edge_if_absent(&self, source: &str, destination: &str)
    -> Result<ConditionalWrite>;

    /// Edge aggregate of `source`, if any.
    async fn get_edges(&self, source: &str) -> Result<Option<LinkSet>>;

    /// Every record in `table`, ordered by title.
    async fn scan_all(&self, table: Table) -> Result<Vec<GraphRecord>>;

    /// Drop `table` and its catalog entry. Missing tables are not an error.
    async fn delete_table(&self, table: Table) -> Result<()>;

    /// Catalog of tables created by `ensure_schema`.
    async fn list_tables(&self) -> Result<Vec<TableInfo>>;

    /// Record the start of an orchestrator run.
    async fn begin_run(&self, run_id: &RunId) -> Result<()>;

    /// Attach the final stats to a run started with `begin_run`.
    async fn finish_run(&self, run_id: &RunId, stats_json: &str) -> Result<()>;

    /// Attempts of the append-else-create loop in `add_edge`.
    fn edge_retry_budget(&self) -> u32 {
        DEFAULT_EDGE_RETRY_BUDGET
    }

    /// Ensure the aggregate for `source` contains `destination`.
    ///
    /// Tries a conditional append first and falls back to create-if-absent only
    /// when the append's precondition fails. If the create loses a race to a
    /// concurrent creator, the loop goes back to appending. Any other store error
    /// propagates unchanged and never triggers the create branch.
    async fn add_edge(&self, source: &str, destination: &str) -> Result<EdgeWrite> {
        let budget = self.edge_retry_budget().max(1);

        for attempt in 1..=budget {
            if self.append_edge_if_exists(source, destination).await? == ConditionalWrite::Applied
            {
                return Ok(EdgeWrite::Appended);
            }

            if self.create_edge_if_absent(source, destination).await? == ConditionalWrite::Applied
            {
                return Ok(EdgeWrite::Created);
            }

            debug!(source, destination, attempt, "edge aggregate appeared during create, retrying append");
        }

        Err(LinkGraphError::EdgeWriteConflict {
            source_title: source.to_string(),
            destination: destination.to_string(),
            attempts: budget,
        })
    }
}
