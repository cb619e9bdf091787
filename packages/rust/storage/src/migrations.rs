//! SQL migration definitions for the LinkGraph bookkeeping tables.
//!
//! Migrations are applied in order on database open. They only cover the
//! catalog and run history; the `nodes` and `edges` tables are created (and
//! may be dropped and recreated) through `ensure_schema`.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Bookkeeping schema: table_catalog, build_runs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Logical tables created by ensure_schema, with their capacity policy
CREATE TABLE IF NOT EXISTS table_catalog (
    name           TEXT PRIMARY KEY,
    read_capacity  INTEGER NOT NULL,
    write_capacity INTEGER NOT NULL,
    created_at     TEXT NOT NULL
);

-- Orchestrator run history
CREATE TABLE IF NOT EXISTS build_runs (
    id          TEXT PRIMARY KEY,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
