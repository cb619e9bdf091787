//! Turso Embedded / libSQL storage layer for the link graph.
//!
//! The [`Storage`] struct wraps a libSQL database holding the `nodes` and
//! `edges` tables (links stored as JSON arrays), the table catalog and the
//! build run history. [`MemoryStore`] implements the same [`KeyValueStore`]
//! contract in process.
//!
//! **Access rules:**
//! - `build` / `drop`: read-write via [`Storage::open`]
//! - inspection commands: read-only via [`Storage::open_readonly`]

mod kv;
mod memory;
mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, params};
use tracing::{info, instrument};

use linkgraph_shared::{
    Capacity, DEFAULT_EDGE_RETRY_BUDGET, GraphRecord, LinkGraphError, LinkSet, Result, RunId,
    Table, TableInfo,
};

pub use kv::{ConditionalWrite, EdgeWrite, KeyValueStore};
pub use memory::MemoryStore;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    edge_retry_budget: u32,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LinkGraphError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(LinkGraphError::storage)?;

        let conn = db.connect().map_err(LinkGraphError::storage)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
            edge_retry_budget: DEFAULT_EDGE_RETRY_BUDGET,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LinkGraphError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(LinkGraphError::storage)?;

        let conn = db.connect().map_err(LinkGraphError::storage)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
            edge_retry_budget: DEFAULT_EDGE_RETRY_BUDGET,
        })
    }

    /// Override the number of attempts `add_edge` makes.
    pub fn with_edge_retry_budget(mut self, budget: u32) -> Self {
        self.edge_retry_budget = budget.max(1);
        self
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        LinkGraphError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(LinkGraphError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    async fn table_exists(&self, table: Table) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table.as_str()],
            )
            .await
            .map_err(LinkGraphError::storage)?;
        Ok(rows.next().await.map_err(LinkGraphError::storage)?.is_some())
    }

    /// Fetch the `links` column of a single record.
    async fn read_links(&self, table: Table, title: &str) -> Result<Option<LinkSet>> {
        let sql = format!("SELECT links FROM {table} WHERE title = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![title])
            .await
            .map_err(LinkGraphError::storage)?;

        match rows.next().await.map_err(LinkGraphError::storage)? {
            Some(row) => {
                let raw: String = row.get(0).map_err(LinkGraphError::storage)?;
                Ok(Some(decode_links(&raw)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl KeyValueStore for Storage {
    #[instrument(skip_all)]
    async fn ensure_schema(&self, capacity: &Capacity) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();

        for table in Table::ALL {
            let existed = self.table_exists(table).await?;

            self.conn
                .execute_batch(&table_ddl(table))
                .await
                .map_err(|e| LinkGraphError::Storage(format!("create table {table}: {e}")))?;

            self.conn
                .execute(
                    "INSERT INTO table_catalog (name, read_capacity, write_capacity, created_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(name) DO NOTHING",
                    params![
                        table.as_str(),
                        capacity.read_capacity as i64,
                        capacity.write_capacity as i64,
                        now.as_str()
                    ],
                )
                .await
                .map_err(LinkGraphError::storage)?;

            if !existed {
                info!(
                    %table,
                    read_capacity = capacity.read_capacity,
                    write_capacity = capacity.write_capacity,
                    "created table"
                );
            }
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut rows = self
            .conn
            .query("SELECT 1", params![])
            .await
            .map_err(|e| LinkGraphError::Storage(format!("store unreachable: {e}")))?;
        rows.next()
            .await
            .map_err(|e| LinkGraphError::Storage(format!("store unreachable: {e}")))?;
        Ok(())
    }

    async fn put_node(&self, title: &str, links: &LinkSet) -> Result<()> {
        self.check_writable()?;
        let links_json = encode_links(links)?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO nodes (title, links, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(title) DO UPDATE SET
                   links = excluded.links,
                   updated_at = excluded.updated_at",
                params![title, links_json.as_str(), now.as_str()],
            )
            .await
            .map_err(LinkGraphError::storage)?;
        Ok(())
    }

    async fn get_links(&self, title: &str) -> Result<LinkSet> {
        self.read_links(Table::Nodes, title)
            .await?
            .ok_or_else(|| LinkGraphError::NodeNotFound {
                title: title.to_string(),
            })
    }

    async fn node_exists(&self, title: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM nodes WHERE title = ?1 LIMIT 1",
                params![title],
            )
            .await
            .map_err(LinkGraphError::storage)?;
        Ok(rows.next().await.map_err(LinkGraphError::storage)?.is_some())
    }

    async fn append_edge_if_exists(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<ConditionalWrite> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        // Set union inside a single statement. Applied iff the RETURNING row
        // comes back; the connection's change count is shared by every worker.
        let mut rows = self
            .conn
            .query(
                "UPDATE edges
                 SET links = (
                       SELECT json_group_array(value) FROM (
                           SELECT value FROM json_each(edges.links)
                           UNION
                           SELECT ?2
                       )
                     ),
                     updated_at = ?3
                 WHERE title = ?1
                 RETURNING title",
                params![source, destination, now.as_str()],
            )
            .await
            .map_err(LinkGraphError::storage)?;

        conditional_outcome(&mut rows).await
    }

    async fn create_edge_if_absent(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<ConditionalWrite> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let mut rows = self
            .conn
            .query(
                "INSERT INTO edges (title, links, updated_at) VALUES (?1, json_array(?2), ?3)
                 ON CONFLICT(title) DO NOTHING
                 RETURNING title",
                params![source, destination, now.as_str()],
            )
            .await
            .map_err(LinkGraphError::storage)?;

        conditional_outcome(&mut rows).await
    }

    async fn get_edges(&self, source: &str) -> Result<Option<LinkSet>> {
        self.read_links(Table::Edges, source).await
    }

    async fn scan_all(&self, table: Table) -> Result<Vec<GraphRecord>> {
        let sql = format!("SELECT title, links FROM {table} ORDER BY title");
        let mut rows = self
            .conn
            .query(&sql, params![])
            .await
            .map_err(LinkGraphError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(LinkGraphError::storage)? {
            let title: String = row.get(0).map_err(LinkGraphError::storage)?;
            let raw: String = row.get(1).map_err(LinkGraphError::storage)?;
            results.push(GraphRecord {
                title,
                links: decode_links(&raw)?,
            });
        }
        Ok(results)
    }

    async fn delete_table(&self, table: Table) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {table};"))
            .await
            .map_err(LinkGraphError::storage)?;
        self.conn
            .execute(
                "DELETE FROM table_catalog WHERE name = ?1",
                params![table.as_str()],
            )
            .await
            .map_err(LinkGraphError::storage)?;
        info!(%table, "dropped table");
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let mut rows = self
            .conn
            .query(
                "SELECT name, read_capacity, write_capacity, created_at
                 FROM table_catalog ORDER BY name DESC",
                params![],
            )
            .await
            .map_err(LinkGraphError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(LinkGraphError::storage)? {
            let name: String = row.get(0).map_err(LinkGraphError::storage)?;
            let created_at: String = row.get(3).map_err(LinkGraphError::storage)?;
            results.push(TableInfo {
                table: name.parse()?,
                read_capacity: row.get::<i64>(1).map_err(LinkGraphError::storage)? as u64,
                write_capacity: row.get::<i64>(2).map_err(LinkGraphError::storage)? as u64,
                created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| LinkGraphError::Storage(format!("invalid date: {e}")))?,
            });
        }
        Ok(results)
    }

    async fn begin_run(&self, run_id: &RunId) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO build_runs (id, started_at) VALUES (?1, ?2)",
                params![run_id.to_string(), now.as_str()],
            )
            .await
            .map_err(LinkGraphError::storage)?;
        Ok(())
    }

    async fn finish_run(&self, run_id: &RunId, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE build_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id.to_string()],
            )
            .await
            .map_err(LinkGraphError::storage)?;
        Ok(())
    }

    fn edge_retry_budget(&self) -> u32 {
        self.edge_retry_budget
    }
}

/// DDL for one logical table. Keys use SQLite's default BINARY collation, so
/// titles are case-sensitive.
fn table_ddl(table: Table) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            title      TEXT PRIMARY KEY NOT NULL,
            links      TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );"
    )
}

/// A guarded write applied iff it returned its row.
async fn conditional_outcome(rows: &mut libsql::Rows) -> Result<ConditionalWrite> {
    match rows.next().await.map_err(LinkGraphError::storage)? {
        Some(_) => Ok(ConditionalWrite::Applied),
        None => Ok(ConditionalWrite::PreconditionFailed),
    }
}

fn encode_links(links: &LinkSet) -> Result<String> {
    serde_json::to_string(links).map_err(|e| LinkGraphError::Storage(format!("encode links: {e}")))
}

fn decode_links(raw: &str) -> Result<LinkSet> {
    serde_json::from_str(raw).map_err(|e| LinkGraphError::Storage(format!("decode links: {e}")))
}
