//! Pipeline Registry
//!
//! In-memory table of pipeline runs keyed by run id. Shared between the
//! tasks executing runs and the API handlers querying them.

use netauto_core::domain::pipeline::{PipelineRun, PipelineStatus};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Mutex;

/// Result of a cancellation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    AlreadyFinished(PipelineStatus),
    NotFound,
}

#[derive(Default)]
pub struct PipelineRegistry {
    runs: Mutex<HashMap<String, PipelineRun>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, run: PipelineRun) {
        self.runs.lock().unwrap().insert(run.id.clone(), run);
    }

    /// Snapshot of one run
    pub fn get(&self, id: &str) -> Option<PipelineRun> {
        self.runs.lock().unwrap().get(id).cloned()
    }

    pub fn status(&self, id: &str) -> Option<PipelineStatus> {
        self.runs.lock().unwrap().get(id).map(|run| run.status)
    }

    /// Snapshots of every run, oldest first
    pub fn list(&self) -> Vec<PipelineRun> {
        let mut runs: Vec<PipelineRun> = self.runs.lock().unwrap().values().cloned().collect();
        runs.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        runs
    }

    /// Applies `f` to a run. Returns `false` when the id is unknown.
    pub fn update<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut PipelineRun),
    {
        match self.runs.lock().unwrap().get_mut(id) {
            Some(run) => {
                f(run);
                true
            }
            None => false,
        }
    }

    pub fn record_step(&self, id: &str, step: &str, payload: JsonValue) {
        self.update(id, |run| run.record_step(step, payload));
    }

    pub fn push_error(&self, id: &str, message: impl Into<String>) {
        let message = message.into();
        self.update(id, |run| {
            if !run.status.is_terminal() {
                run.errors.push(message);
            }
        });
    }

    pub fn push_warning(&self, id: &str, message: impl Into<String>) {
        let message = message.into();
        self.update(id, |run| {
            if !run.status.is_terminal() {
                run.warnings.push(message);
            }
        });
    }

    /// Moves a running entry into a terminal status.
    ///
    /// Returns the status the run ended up in, which differs from `status`
    /// when the run was already terminal (for example cancelled).
    pub fn finish(&self, id: &str, status: PipelineStatus) -> Option<PipelineStatus> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs.get_mut(id)?;
        run.finish(status);
        Some(run.status)
    }

    pub fn cancel(&self, id: &str) -> CancelOutcome {
        let mut runs = self.runs.lock().unwrap();
        match runs.get_mut(id) {
            None => CancelOutcome::NotFound,
            Some(run) if run.status.is_terminal() => CancelOutcome::AlreadyFinished(run.status),
            Some(run) => {
                run.finish(PipelineStatus::Cancelled);
                CancelOutcome::Cancelled
            }
        }
    }

    /// Evicts every terminal run; returns how many were removed
    pub fn remove_terminal(&self) -> usize {
        let mut runs = self.runs.lock().unwrap();
        let before = runs.len();
        runs.retain(|_, run| !run.status.is_terminal());
        before - runs.len()
    }
}
