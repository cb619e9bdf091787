//! Core domain types for the link graph.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LinkGraphError;

/// Outbound link set of a title. Ordered only for stable output.
pub type LinkSet = BTreeSet<String>;

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// The two logical tables of the store, both keyed by title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    /// One record per crawled title holding its outbound links.
    Nodes,
    /// One adjacency aggregate per source title.
    Edges,
}

impl Table {
    /// Every logical table, in creation order.
    pub const ALL: [Table; 2] = [Table::Nodes, Table::Edges];

    /// Physical table name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nodes => "nodes",
            Self::Edges => "edges",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Table {
    type Err = LinkGraphError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nodes" => Ok(Self::Nodes),
            "edges" => Ok(Self::Edges),
            other => Err(LinkGraphError::validation(format!(
                "unknown table '{other}': expected 'nodes' or 'edges'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A stored record: a node's outbound links, or an edge aggregate's destinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRecord {
    /// Record key (node title or edge source title).
    pub title: String,
    /// Link set held by the record.
    pub links: LinkSet,
}

/// Catalog entry written by `ensure_schema`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub table: Table,
    pub read_capacity: u64,
    pub write_capacity: u64,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 identifier for one orchestrator run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}
