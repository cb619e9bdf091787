//! End-to-end `build` pipeline: seeds → nodes → barrier → edges.
//!
//! Phase 1 fetches every seed and writes its node record. Phase 2 starts only
//! after every phase-1 task has settled, so the existence checks it performs
//! see the complete node set. Per-title failures are collected, never fatal;
//! only store setup and the barrier health check abort a run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use linkgraph_crawler::LinkSource;
use linkgraph_shared::{BuildConfig, LinkGraphError, Result, RunId};
use linkgraph_storage::KeyValueStore;

use crate::edge_materializer::materialize_edges;
use crate::executor::{LocalExecutor, TaskOutcome};
use crate::failure::{FailureKind, TitleFailure};
use crate::node_builder::build_node;

/// Build phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Nodes,
    Edges,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nodes => f.pad("nodes"),
            Self::Edges => f.pad("edges"),
        }
    }
}

/// One recorded failure. `destination` is set for per-link edge failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedTitle {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub failure: TitleFailure,
}

/// Outcome of one phase.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub phase: Phase,
    /// Titles the phase ran for.
    pub attempted: usize,
    /// Titles that completed without any failure.
    pub succeeded: usize,
    pub failures: Vec<FailedTitle>,
    pub duration_ms: u64,
}

impl PhaseReport {
    fn new(phase: Phase, attempted: usize) -> Self {
        Self {
            phase,
            attempted,
            succeeded: 0,
            failures: Vec::new(),
            duration_ms: 0,
        }
    }

    fn record(&mut self, title: String, destination: Option<String>, failure: TitleFailure) {
        self.failures.push(FailedTitle {
            title,
            destination,
            failure,
        });
    }

    /// Titles with at least one failure.
    ///
    /// In the edge phase this includes every seed whose node build failed, since
    /// it is attempted again and reports `PrecursorMissing`. One bad fetch can
    /// therefore count against both phases' rates.
    pub fn failed_titles(&self) -> usize {
        self.attempted - self.succeeded
    }

    /// Failed titles over attempted titles; `0.0` for an empty phase.
    pub fn failure_rate(&self) -> f64 {
        if self.attempted == 0 {
            return 0.0;
        }
        self.failed_titles() as f64 / self.attempted as f64
    }

    /// Number of recorded failures per kind.
    pub fn failure_counts(&self) -> BTreeMap<FailureKind, usize> {
        let mut counts = BTreeMap::new();
        for f in &self.failures {
            *counts.entry(f.failure.kind()).or_insert(0) += 1;
        }
        counts
    }
}

/// Result of a full build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub seeds: usize,
    pub max_failure_rate: f64,
    pub nodes: PhaseReport,
    /// `None` when phase 2 was skipped.
    pub edges: Option<PhaseReport>,
    /// Destinations written across all edge aggregates.
    pub edges_added: usize,
    /// Links dropped by the referential guard.
    pub edges_suppressed: usize,
    pub duration_ms: u64,
}

impl BuildReport {
    /// First phase whose failure rate is above the threshold.
    pub fn exceeded_phase(&self) -> Option<Phase> {
        if self.nodes.failure_rate() > self.max_failure_rate {
            return Some(Phase::Nodes);
        }
        match &self.edges {
            Some(edges) if edges.failure_rate() > self.max_failure_rate => Some(Phase::Edges),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exceeded_phase().is_none()
    }
}

/// Progress callback for reporting build status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a phase starts.
    fn phase(&self, phase: Phase, total: usize);
    /// Called as each title of the phase settles.
    fn title_done(&self, phase: Phase, title: &str, ok: bool, current: usize, total: usize);
    /// Called when the build completes.
    fn done(&self, report: &BuildReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _phase: Phase, _total: usize) {}
    fn title_done(&self, _phase: Phase, _title: &str, _ok: bool, _current: usize, _total: usize) {}
    fn done(&self, _report: &BuildReport) {}
}

/// Two-phase link graph builder.
pub struct GraphBuilder<S: KeyValueStore + ?Sized + 'static> {
    store: Arc<S>,
    source: Arc<dyn LinkSource>,
    executor: LocalExecutor,
    config: BuildConfig,
}

impl<S: KeyValueStore + ?Sized + 'static> GraphBuilder<S> {
    pub fn new(store: Arc<S>, source: Arc<dyn LinkSource>, config: BuildConfig) -> Self {
        Self {
            executor: LocalExecutor::new(config.concurrency),
            store,
            source,
            config,
        }
    }

    /// Run both phases over `seeds`.
    ///
    /// Returns `Err` only for fatal store problems. A run whose failure rate is
    /// too high still returns `Ok`; check [`BuildReport::exceeded_phase`].
    #[instrument(skip_all, fields(seeds = seeds.len(), concurrency = self.config.concurrency))]
    pub async fn run(
        &self,
        seeds: &[String],
        progress: &dyn ProgressReporter,
    ) -> Result<BuildReport> {
        let start = Instant::now();
        let started_at = Utc::now();
        let run_id = RunId::new();
        self.config.validate()?;

        info!(%run_id, seeds = seeds.len(), "starting build");
        if seeds.is_empty() {
            warn!("no seed titles; the graph will be empty");
        }

        // --- Setup ---
        self.store.ensure_schema(&self.config.capacity).await?;
        self.store.begin_run(&run_id).await?;

        // --- Phase 1: Nodes ---
        let nodes = self.run_node_phase(seeds, progress).await;
        info!(
            succeeded = nodes.succeeded,
            failed = nodes.failed_titles(),
            duration_ms = nodes.duration_ms,
            "node phase complete"
        );

        // --- Barrier ---
        self.store.ping().await?;

        let mut report = BuildReport {
            run_id: run_id.clone(),
            started_at,
            seeds: seeds.len(),
            max_failure_rate: self.config.max_failure_rate,
            nodes,
            edges: None,
            edges_added: 0,
            edges_suppressed: 0,
            duration_ms: 0,
        };

        // --- Phase 2: Edges ---
        if report.nodes.failure_rate() > self.config.max_failure_rate {
            warn!(
                failure_rate = report.nodes.failure_rate(),
                max_failure_rate = self.config.max_failure_rate,
                "node phase failure rate above threshold, skipping edge phase"
            );
        } else {
            let (edges, added, suppressed) = self.run_edge_phase(seeds, progress).await;
            info!(
                succeeded = edges.succeeded,
                failed = edges.failed_titles(),
                added,
                suppressed,
                duration_ms = edges.duration_ms,
                "edge phase complete"
            );
            report.edges = Some(edges);
            report.edges_added = added;
            report.edges_suppressed = suppressed;
        }

        report.duration_ms = elapsed_ms(start);

        let stats = serde_json::to_string(&report)
            .map_err(|e| LinkGraphError::parse(format!("failed to encode run stats: {e}")))?;
        if let Err(e) = self.store.finish_run(&run_id, &stats).await {
            warn!(%run_id, error = %e, "failed to record run stats");
        }

        progress.done(&report);
        info!(
            %run_id,
            exceeded = ?report.exceeded_phase(),
            duration_ms = report.duration_ms,
            "build complete"
        );

        Ok(report)
    }

    async fn run_node_phase(&self, seeds: &[String], progress: &dyn ProgressReporter) -> PhaseReport {
        let start = Instant::now();
        let total = seeds.len();
        progress.phase(Phase::Nodes, total);

        let store = self.store.clone();
        let source = self.source.clone();
        let handles = self.executor.map(seeds, move |title| {
            let store = store.clone();
            let source = source.clone();
            async move { build_node(store.as_ref(), source.as_ref(), &title).await }
        });

        let outcomes = LocalExecutor::wait_all(handles, |n, outcome| {
            let ok = matches!(outcome, TaskOutcome::Finished { output: Ok(_), .. });
            progress.title_done(Phase::Nodes, outcome.input(), ok, n, total);
        })
        .await;

        let mut report = PhaseReport::new(Phase::Nodes, total);
        for outcome in outcomes {
            match outcome {
                TaskOutcome::Finished { output: Ok(_), .. } => report.succeeded += 1,
                TaskOutcome::Finished {
                    input,
                    output: Err(failure),
                } => {
                    warn!(title = %input, kind = %failure.kind(), error = %failure, "node build failed");
                    report.record(input, None, failure);
                }
                TaskOutcome::Crashed { input, message } => {
                    warn!(title = %input, %message, "node task crashed");
                    report.record(input, None, TitleFailure::TaskCrashed { message });
                }
            }
        }
        report.duration_ms = elapsed_ms(start);
        report
    }

    /// Returns the phase report with the added and suppressed link totals.
    async fn run_edge_phase(
        &self,
        seeds: &[String],
        progress: &dyn ProgressReporter,
    ) -> (PhaseReport, usize, usize) {
        let start = Instant::now();
        let total = seeds.len();
        progress.phase(Phase::Edges, total);

        let store = self.store.clone();
        let handles = self.executor.map(seeds, move |title| {
            let store = store.clone();
            async move { materialize_edges(store.as_ref(), &title).await }
        });

        let outcomes = LocalExecutor::wait_all(handles, |n, outcome| {
            let ok = matches!(outcome, TaskOutcome::Finished { output: Ok(o), .. } if o.is_clean());
            progress.title_done(Phase::Edges, outcome.input(), ok, n, total);
        })
        .await;

        let mut report = PhaseReport::new(Phase::Edges, total);
        let (mut added, mut suppressed) = (0, 0);
        for outcome in outcomes {
            match outcome {
                TaskOutcome::Finished {
                    input,
                    output: Ok(edges),
                } => {
                    added += edges.added.len();
                    suppressed += edges.suppressed.len();
                    if edges.is_clean() {
                        report.succeeded += 1;
                    }
                    for link in edges.failed {
                        report.record(input.clone(), Some(link.destination), link.failure);
                    }
                }
                TaskOutcome::Finished {
                    input,
                    output: Err(failure),
                } => {
                    warn!(title = %input, kind = %failure.kind(), error = %failure, "edge materialization failed");
                    report.record(input, None, failure);
                }
                TaskOutcome::Crashed { input, message } => {
                    warn!(title = %input, %message, "edge task crashed");
                    report.record(input, None, TitleFailure::TaskCrashed { message });
                }
            }
        }
        report.duration_ms = elapsed_ms(start);
        (report, added, suppressed)
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
