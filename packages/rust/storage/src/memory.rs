//! In-process store backend.
//!
//! Same semantics as [`crate::Storage`], including "table does not exist" errors
//! before `ensure_schema`. Used for tests and for exercising the pipeline without
//! a database file.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use linkgraph_shared::{
    Capacity, DEFAULT_EDGE_RETRY_BUDGET, GraphRecord, LinkGraphError, LinkSet, Result, RunId,
    Table, TableInfo,
};

use crate::kv::{ConditionalWrite, KeyValueStore};

struct TableState {
    info: TableInfo,
    rows: HashMap<String, LinkSet>,
}

#[derive(Default)]
struct Inner {
    tables: BTreeMap<Table, TableState>,
    runs: Vec<(RunId, Option<String>)>,
}

impl Inner {
    fn table(&self, table: Table) -> Result<&TableState> {
        self.tables
            .get(&table)
            .ok_or_else(|| LinkGraphError::Storage(format!("no such table: {table}")))
    }

    fn table_mut(&mut self, table: Table) -> Result<&mut TableState> {
        self.tables
            .get_mut(&table)
            .ok_or_else(|| LinkGraphError::Storage(format!("no such table: {table}")))
    }
}

/// A [`KeyValueStore`] held entirely in memory.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    edge_retry_budget: u32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            edge_retry_budget: DEFAULT_EDGE_RETRY_BUDGET,
        }
    }

    /// Override the number of attempts `add_edge` makes.
    pub fn with_edge_retry_budget(mut self, budget: u32) -> Self {
        self.edge_retry_budget = budget.max(1);
        self
    }

    /// Runs recorded so far, with their final stats if finished.
    pub async fn runs(&self) -> Vec<(RunId, Option<String>)> {
        self.inner.read().await.runs.clone()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn ensure_schema(&self, capacity: &Capacity) -> Result<()> {
        let mut inner = self.inner.write().await;
        for table in Table::ALL {
            inner.tables.entry(table).or_insert_with(|| {
                tracing::info!(
                    %table,
                    read_capacity = capacity.read_capacity,
                    write_capacity = capacity.write_capacity,
                    "created table"
                );
                TableState {
                    info: TableInfo {
                        table,
                        read_capacity: capacity.read_capacity,
                        write_capacity: capacity.write_capacity,
                        created_at: Utc::now(),
                    },
                    rows: HashMap::new(),
                }
            });
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn put_node(&self, title: &str, links: &LinkSet) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .table_mut(Table::Nodes)?
            .rows
            .insert(title.to_string(), links.clone());
        Ok(())
    }

    async fn get_links(&self, title: &str) -> Result<LinkSet> {
        let inner = self.inner.read().await;
        inner
            .table(Table::Nodes)?
            .rows
            .get(title)
            .cloned()
            .ok_or_else(|| LinkGraphError::NodeNotFound {
                title: title.to_string(),
            })
    }

    async fn node_exists(&self, title: &str) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner.table(Table::Nodes)?.rows.contains_key(title))
    }

    async fn append_edge_if_exists(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<ConditionalWrite> {
        let mut inner = self.inner.write().await;
        match inner.table_mut(Table::Edges)?.rows.get_mut(source) {
            Some(links) => {
                links.insert(destination.to_string());
                Ok(ConditionalWrite::Applied)
            }
            None => Ok(ConditionalWrite::PreconditionFailed),
        }
    }

    async fn create_edge_if_absent(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<ConditionalWrite> {
        let mut inner = self.inner.write().await;
        let rows = &mut inner.table_mut(Table::Edges)?.rows;
        if rows.contains_key(source) {
            return Ok(ConditionalWrite::PreconditionFailed);
        }
        rows.insert(
            source.to_string(),
            LinkSet::from([destination.to_string()]),
        );
        Ok(ConditionalWrite::Applied)
    }

    async fn get_edges(&self, source: &str) -> Result<Option<LinkSet>> {
        let inner = self.inner.read().await;
        Ok(inner.table(Table::Edges)?.rows.get(source).cloned())
    }

    async fn scan_all(&self, table: Table) -> Result<Vec<GraphRecord>> {
        let inner = self.inner.read().await;
        let mut records: Vec<GraphRecord> = inner
            .table(table)?
            .rows
            .iter()
            .map(|(title, links)| GraphRecord {
                title: title.clone(),
                links: links.clone(),
            })
            .collect();
        records.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(records)
    }

    async fn delete_table(&self, table: Table) -> Result<()> {
        self.inner.write().await.tables.remove(&table);
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let inner = self.inner.read().await;
        Ok(inner.tables.values().map(|t| t.info.clone()).collect())
    }

    async fn begin_run(&self, run_id: &RunId) -> Result<()> {
        self.inner.write().await.runs.push((run_id.clone(), None));
        Ok(())
    }

    async fn finish_run(&self, run_id: &RunId, stats_json: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let run = inner
            .runs
            .iter_mut()
            .find(|(id, _)| id == run_id)
            .ok_or_else(|| LinkGraphError::Storage(format!("unknown run {run_id}")))?;
        run.1 = Some(stats_json.to_string());
        Ok(())
    }

    fn edge_retry_budget(&self) -> u32 {
        self.edge_retry_budget
    }
}
