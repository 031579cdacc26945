//! Observation of optimizer steps.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// One optimizer step as seen by the driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepRecord {
    /// One-based count of optimizer steps so far.
    pub iteration: usize,
    pub cost: f64,
    pub maximal_deformation: f64,
    /// Time since the driver started.
    pub elapsed: Duration,
}

/// Observer notified by the optimization driver.
pub trait StepObserver: Send + Sync {
    /// Called after every optimizer step.
    fn on_step(&self, record: &StepRecord);

    /// Called once when the optimizer stops moving nodes.
    fn on_converged(&self, _record: &StepRecord) {}
}

/// Logs steps to tracing every `log_interval` iterations.
#[derive(Debug, Clone)]
pub struct LoggingObserver {
    pub log_interval: usize,
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self { log_interval: 10 }
    }
}

impl LoggingObserver {
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl StepObserver for LoggingObserver {
    fn on_step(&self, record: &StepRecord) {
        if record.iteration % self.log_interval == 0 {
            tracing::info!(
                "Iter {} | Cost: {:.6} | Max deformation: {:.6} | Elapsed: {:.2}s",
                record.iteration,
                record.cost,
                record.maximal_deformation,
                record.elapsed.as_secs_f64()
            );
        }
    }

    fn on_converged(&self, record: &StepRecord) {
        tracing::info!(
            "Optimization converged after {} iterations in {:.2}s with cost {:.6}",
            record.iteration,
            record.elapsed.as_secs_f64(),
            record.cost
        );
    }
}

/// Records every step for later inspection.
#[derive(Debug, Clone, Default)]
pub struct HistoryObserver {
    history: Arc<Mutex<Vec<StepRecord>>>,
}

impl HistoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<StepRecord> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StepRecord>> {
        // A panicking observer elsewhere leaves the records intact.
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StepObserver for HistoryObserver {
    fn on_step(&self, record: &StepRecord) {
        self.lock().push(*record);
    }
}
