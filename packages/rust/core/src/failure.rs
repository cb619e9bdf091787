//! Per-title failures recorded by the build phases.
//!
//! These never abort a phase; the orchestrator collects them and decides
//! afterwards whether the run as a whole failed.

use linkgraph_crawler::FetchError;
use serde::Serialize;

/// Coarse failure class, used for counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    FetchNotFound,
    FetchTransient,
    FetchParseError,
    PrecursorMissing,
    EdgeWriteConflict,
    Store,
    TaskCrashed,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchNotFound => "fetch_not_found",
            Self::FetchTransient => "fetch_transient",
            Self::FetchParseError => "fetch_parse_error",
            Self::PrecursorMissing => "precursor_missing",
            Self::EdgeWriteConflict => "edge_write_conflict",
            Self::Store => "store",
            Self::TaskCrashed => "task_crashed",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Why a title (or one of its links) did not make it into the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TitleFailure {
    #[error("article not found")]
    FetchNotFound,

    #[error("transient fetch failure: {message}")]
    FetchTransient { message: String },

    #[error("unusable fetch response: {message}")]
    FetchParseError { message: String },

    /// Phase 2 found no node record for the title (its phase-1 build failed or was skipped).
    #[error("no node record; node build failed or was skipped")]
    PrecursorMissing,

    #[error("edge write still conflicting after {attempts} attempts")]
    EdgeWriteConflict { attempts: u32 },

    #[error("store error: {message}")]
    Store { message: String },

    /// The worker panicked or was cancelled before returning.
    #[error("task crashed: {message}")]
    TaskCrashed { message: String },
}

impl TitleFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::FetchNotFound => FailureKind::FetchNotFound,
            Self::FetchTransient { .. } => FailureKind::FetchTransient,
            Self::FetchParseError { .. } => FailureKind::FetchParseError,
            Self::PrecursorMissing => FailureKind::PrecursorMissing,
            Self::EdgeWriteConflict { .. } => FailureKind::EdgeWriteConflict,
            Self::Store { .. } => FailureKind::Store,
            Self::TaskCrashed { .. } => FailureKind::TaskCrashed,
        }
    }

    pub(crate) fn store(err: impl std::fmt::Display) -> Self {
        Self::Store {
            message: err.to_string(),
        }
    }
}

impl From<FetchError> for TitleFailure {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NotFound { .. } => Self::FetchNotFound,
            FetchError::Transient { message, .. } => Self::FetchTransient { message },
            FetchError::Parse { message, .. } => Self::FetchParseError { message },
        }
    }
}
