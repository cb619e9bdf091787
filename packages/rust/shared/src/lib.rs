//! Shared types, error model, and configuration for LinkGraph.
//!
//! This crate is the foundation depended on by all other LinkGraph crates.
//! It provides:
//! - [`LinkGraphError`]: the unified error type
//! - Domain types ([`Table`], [`GraphRecord`], [`LinkSet`], [`RunId`])
//! - Configuration ([`AppConfig`], [`BuildConfig`], [`StoreConfig`], config loading)
//! - Seed list loading ([`load_seed_file`])

pub mod config;
pub mod error;
pub mod seeds;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BuildConfig, BuildSection, Capacity, DEFAULT_EDGE_RETRY_BUDGET, SourceConfig,
    SourceSection, StoreConfig, StoreSection, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{LinkGraphError, Result};
pub use seeds::{load_seed_file, parse_seeds};
pub use types::{GraphRecord, LinkSet, RunId, Table, TableInfo};
