//! Progress reporting.
//!
//! Observers are told about each generation once its barrier has passed.
//! Nothing they see feeds back into the propagation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use crate::propagation::SeedSet;

/// What happened in one generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationReport {
    /// 0 for the generation expanding the seed labels.
    pub generation: usize,
    /// Labels expanded in this generation.
    pub frontier_size: usize,
    /// Candidate labels tested against the store.
    pub relaxations_attempted: u64,
    /// Candidates that improved a distance; the next frontier's size.
    pub improvements: usize,
    pub workers: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropagationSummary {
    pub seeds: Vec<String>,
    /// Number of generations expanded before the frontier ran dry.
    pub generations: usize,
    /// Successful relaxations, seed labels included.
    pub improvements: u64,
    pub relaxations_attempted: u64,
    pub elapsed: Duration,
}

/// Hook invoked by the engine. Implementations must be cheap; they run on
/// the engine's task between generations.
pub trait ProgressObserver: Send + Sync {
    fn on_start(&self, _seeds: &SeedSet) {}

    fn on_generation(&self, report: &GenerationReport);

    fn on_finish(&self, _summary: &PropagationSummary) {}
}

/// Default observer: one `info` line per generation.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressObserver for TracingProgress {
    fn on_start(&self, seeds: &SeedSet) {
        info!(seeds = %seeds, "initializing macro-categories");
    }

    fn on_generation(&self, report: &GenerationReport) {
        info!(
            generation = report.generation,
            frontier = report.frontier_size,
            pending = report.improvements,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "generation finished"
        );
    }

    fn on_finish(&self, summary: &PropagationSummary) {
        info!(
            generations = summary.generations,
            improvements = summary.improvements,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "distances converged"
        );
    }
}

/// Observer that keeps every report, for inspection after a run.
#[derive(Debug, Default)]
pub struct ProgressLog {
    reports: Mutex<Vec<GenerationReport>>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<GenerationReport> {
        self.reports.lock().clone()
    }
}

impl ProgressObserver for ProgressLog {
    fn on_generation(&self, report: &GenerationReport) {
        self.reports.lock().push(report.clone());
    }
}
