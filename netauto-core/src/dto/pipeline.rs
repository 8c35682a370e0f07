//! Pipeline DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::domain::pipeline::{PipelineKind, PipelineRun, PipelineStatus, ValidationLevel};

/// Request to run the configuration generation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateConfig {
    pub requirements: String,
    pub device_type: String,
    pub user_id: String,
    #[serde(default)]
    pub validation_level: ValidationLevel,
    #[serde(default)]
    pub parameters: Map<String, JsonValue>,
}

/// Request to run the configuration deployment pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    pub config: String,
    pub device_id: String,
    pub user_id: String,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_true")]
    pub backup_current: bool,
    #[serde(default = "default_true")]
    pub rollback_on_failure: bool,
}

fn default_true() -> bool {
    true
}

/// Registry entry as exposed over the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunView {
    pub id: String,
    pub kind: PipelineKind,
    pub status: PipelineStatus,
    pub data: Map<String, JsonValue>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
}

impl From<PipelineRun> for PipelineRunView {
    fn from(run: PipelineRun) -> Self {
        let duration_seconds = run.duration_seconds();
        Self {
            id: run.id,
            kind: run.kind,
            status: run.status,
            data: run.data,
            errors: run.errors,
            warnings: run.warnings,
            started_at: run.started_at,
            finished_at: run.finished_at,
            duration_seconds,
        }
    }
}

/// Number of registry entries evicted by a cleanup sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupSummary {
    pub removed: usize,
}
