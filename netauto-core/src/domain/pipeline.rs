//! Pipeline domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Workflow executed by a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Generation,
    Deployment,
}

impl PipelineKind {
    /// Prefix used when allocating run identifiers
    pub fn id_prefix(&self) -> &'static str {
        match self {
            PipelineKind::Generation => "gen",
            PipelineKind::Deployment => "deploy",
        }
    }

    /// Operation name recorded in the audit log
    pub fn operation_name(&self) -> &'static str {
        match self {
            PipelineKind::Generation => "config_generation",
            PipelineKind::Deployment => "config_deployment",
        }
    }
}

/// Lifecycle status of a pipeline run
///
/// `Pending` is declared for completeness; runs are created directly in `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl PipelineStatus {
    /// Terminal statuses never change again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Success | PipelineStatus::Failed | PipelineStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Pending => "pending",
            PipelineStatus::Running => "running",
            PipelineStatus::Success => "success",
            PipelineStatus::Failed => "failed",
            PipelineStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Depth of checks requested from the validation step
///
/// Passed through to the LLM provider; the orchestrator does not interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    /// Syntax only
    Basic,
    /// Syntax and logic
    #[default]
    Advanced,
    /// Syntax, logic and security
    Full,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationLevel::Basic => "basic",
            ValidationLevel::Advanced => "advanced",
            ValidationLevel::Full => "full",
        }
    }
}

/// One invocation of a pipeline, as tracked by the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: String,
    pub kind: PipelineKind,
    pub status: PipelineStatus,
    /// Step name -> step payload, in completion order
    pub data: Map<String, JsonValue>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Creates a run that is already `Running`
    pub fn start(id: impl Into<String>, kind: PipelineKind) -> Self {
        Self {
            id: id.into(),
            kind,
            status: PipelineStatus::Running,
            data: Map::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Moves the run into a terminal status.
    ///
    /// Returns `false` and leaves the run untouched when it is already terminal
    /// or when `status` is not terminal.
    pub fn finish(&mut self, status: PipelineStatus) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.finished_at = Some(Utc::now());
        true
    }

    /// Appends a step payload. Ignored once the run is terminal.
    pub fn record_step(&mut self, step: &str, payload: JsonValue) {
        if !self.status.is_terminal() {
            self.data.insert(step.to_string(), payload);
        }
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.finished_at.map(|finished| {
            (finished - self.started_at).num_microseconds().unwrap_or(0) as f64 / 1e6
        })
    }
}

/// Classification of everything that can go wrong inside a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    EnhancementSkipped,
    ValidationDegraded,
    OptimizationSkipped,
    PreCheckFailure,
    BackupFailure,
    DeployFailure,
    PostCheckFailure,
    AccessDenied,
    NotFound,
    GenerationFailure,
    Cancelled,
}

/// A failure captured while running a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineIssue {
    pub step: String,
    pub kind: IssueKind,
    pub message: String,
}

impl PipelineIssue {
    pub fn new(step: impl Into<String>, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Outcome handed back to the caller of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub success: bool,
    pub message: String,
    pub data: Map<String, JsonValue>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub issues: Vec<PipelineIssue>,
    pub execution_time_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

impl PipelineResult {
    pub fn pipeline_id(&self) -> Option<&str> {
        self.data.get("pipeline_id").and_then(JsonValue::as_str)
    }
}
