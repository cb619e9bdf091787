//! Test doubles for the build phases.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use linkgraph_crawler::{FetchError, FetchedArticle, LinkSource};
use linkgraph_shared::{
    Capacity, GraphRecord, LinkGraphError, LinkSet, Result, RunId, Table, TableInfo,
};
use linkgraph_storage::{ConditionalWrite, KeyValueStore, MemoryStore};

pub fn links(items: &[&str]) -> LinkSet {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn titles(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn capacity() -> Capacity {
    Capacity {
        read_capacity: 5,
        write_capacity: 5,
    }
}

/// A [`MemoryStore`] with the schema already in place.
pub async fn ready_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.ensure_schema(&capacity()).await.unwrap();
    store
}

// ---------------------------------------------------------------------------
// StaticSource
// ---------------------------------------------------------------------------

/// Link source answering from a fixed table. Unknown titles are `NotFound`.
#[derive(Default)]
pub struct StaticSource {
    pages: HashMap<String, std::result::Result<FetchedArticle, FetchError>>,
    panics: HashSet<String>,
    fetches: AtomicUsize,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, title: &str, out: &[&str]) -> Self {
        self.redirect(title, title, out)
    }

    pub fn redirect(mut self, title: &str, resolved: &str, out: &[&str]) -> Self {
        self.pages.insert(
            title.to_string(),
            Ok(FetchedArticle {
                title: title.to_string(),
                resolved_title: resolved.to_string(),
                links: links(out),
            }),
        );
        self
    }

    pub fn failing(mut self, title: &str, err: FetchError) -> Self {
        self.pages.insert(title.to_string(), Err(err));
        self
    }

    pub fn panicking(mut self, title: &str) -> Self {
        self.panics.insert(title.to_string());
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LinkSource for StaticSource {
    async fn fetch(&self, title: &str) -> std::result::Result<FetchedArticle, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.panics.contains(title) {
            panic!("source blew up on {title}");
        }
        self.pages.get(title).cloned().unwrap_or_else(|| {
            Err(FetchError::NotFound {
                title: title.to_string(),
            })
        })
    }

    fn name(&self) -> &str {
        "static"
    }
}

// ---------------------------------------------------------------------------
// ScriptedStore
// ---------------------------------------------------------------------------

/// Wraps a [`MemoryStore`] and injects failures.
pub struct ScriptedStore {
    inner: MemoryStore,
    unreachable: bool,
    broken_links: HashSet<String>,
    conflicting_links: HashSet<String>,
}

impl ScriptedStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            unreachable: false,
            broken_links: HashSet::new(),
            conflicting_links: HashSet::new(),
        }
    }

    /// Every operation fails.
    pub fn unreachable(inner: MemoryStore) -> Self {
        Self {
            unreachable: true,
            ..Self::new(inner)
        }
    }

    /// `node_exists(title)` fails.
    pub fn broken_link(mut self, title: &str) -> Self {
        self.broken_links.insert(title.to_string());
        self
    }

    /// Both conditional edge writes towards `title` always lose.
    pub fn conflicting_link(mut self, title: &str) -> Self {
        self.conflicting_links.insert(title.to_string());
        self
    }

    pub async fn ready(&self) {
        self.inner.ensure_schema(&capacity()).await.unwrap();
    }

    fn check(&self) -> Result<()> {
        if self.unreachable {
            return Err(LinkGraphError::Storage("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for ScriptedStore {
    async fn ensure_schema(&self, capacity: &Capacity) -> Result<()> {
        self.check()?;
        self.inner.ensure_schema(capacity).await
    }
    async fn ping(&self) -> Result<()> {
        self.check()?;
        self.inner.ping().await
    }
    async fn put_node(&self, title: &str, links: &LinkSet) -> Result<()> {
        self.check()?;
        self.inner.put_node(title, links).await
    }
    async fn get_links(&self, title: &str) -> Result<LinkSet> {
        self.check()?;
        self.inner.get_links(title).await
    }
    async fn node_exists(&self, title: &str) -> Result<bool> {
        self.check()?;
        if self.broken_links.contains(title) {
            return Err(LinkGraphError::Storage(format!("injected failure for {title}")));
        }
        self.inner.node_exists(title).await
    }
    async fn append_edge_if_exists(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<ConditionalWrite> {
        self.check()?;
        if self.conflicting_links.contains(destination) {
            return Ok(ConditionalWrite::PreconditionFailed);
        }
        self.inner.append_edge_if_exists(source, destination).await
    }
    async fn create_edge_if_absent(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<ConditionalWrite> {
        self.check()?;
        if self.conflicting_links.contains(destination) {
            return Ok(ConditionalWrite::PreconditionFailed);
        }
        self.inner.create_edge_if_absent(source, destination).await
    }
    async fn get_edges(&self, source: &str) -> Result<Option<LinkSet>> {
        self.check()?;
        self.inner.get_edges(source).await
    }
    async fn scan_all(&self, table: Table) -> Result<Vec<GraphRecord>> {
        self.check()?;
        self.inner.scan_all(table).await
    }
    async fn delete_table(&self, table: Table) -> Result<()> {
        self.check()?;
        self.inner.delete_table(table).await
    }
    async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        self.check()?;
        self.inner.list_tables().await
    }
    async fn begin_run(&self, run_id: &RunId) -> Result<()> {
        self.check()?;
        self.inner.begin_run(run_id).await
    }
    async fn finish_run(&self, run_id: &RunId, stats_json: &str) -> Result<()> {
        self.check()?;
        self.inner.finish_run(run_id, stats_json).await
    }
    fn edge_retry_budget(&self) -> u32 {
        self.inner.edge_retry_budget()
    }
}
