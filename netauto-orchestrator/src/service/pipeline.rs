//! Pipeline Service
//!
//! Runs the configuration generation and deployment pipelines.
//!
//! Each run is a fixed sequence of steps executed one after another. Only
//! the failures listed in [`PipelineError`] stop a run; every other step
//! failure is downgraded to a [`PipelineIssue`] and the run carries on, so the
//! caller always gets a [`PipelineResult`] back.
//!
//! Cancellation is checked between steps. A step already talking to the LLM
//! or a device runs to completion first. Once a configuration has been pushed
//! to a device the run no longer stops early: the remaining checks still run
//! and the cancelled result reports what was changed.

use chrono::Utc;
use netauto_core::domain::audit::OperationLog;
use netauto_core::domain::deployment::{
    DeploymentOutcome, PostDeploymentChecks, PreDeploymentChecks,
};
use netauto_core::domain::device::{BackupResult, Device};
use netauto_core::domain::event::OperationType;
use netauto_core::domain::generation::{EnhancedRequirements, ValidationResult};
use netauto_core::domain::pipeline::{
    IssueKind, PipelineIssue, PipelineKind, PipelineResult, PipelineRun, PipelineStatus,
    ValidationLevel,
};
use serde_json::{Map, Value as JsonValue, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::repository::audit::AuditStore;
use crate::repository::device::DeviceDriver;
use crate::repository::llm::LlmProvider;
use crate::service::notification::NotificationHub;
use crate::service::registry::{CancelOutcome, PipelineRegistry};

/// Operation type pipeline progress is published under
pub const PIPELINE_OPERATION_TYPE: OperationType = OperationType::CommandExecution;

pub const GENERATION_STEPS: [&str; 4] = [
    "enhance_requirements",
    "generate_configuration",
    "validate_configuration",
    "optimize_configuration",
];

pub const DEPLOYMENT_STEPS: [&str; 5] = [
    "validate_device_access",
    "pre_deployment_checks",
    "backup_current_config",
    "deploy_configuration",
    "post_deployment_checks",
];

const ROLLBACK_NOT_PERFORMED: &str = "rollback requested but not performed";

/// Failures that stop a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("access denied to device {0}")]
    AccessDenied(String),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("configuration generation failed: {0}")]
    GenerationFailure(String),

    #[error("pipeline not found: {0}")]
    NotFound(String),
}

impl PipelineError {
    pub fn issue_kind(&self) -> IssueKind {
        match self {
            PipelineError::AccessDenied(_) => IssueKind::AccessDenied,
            PipelineError::DeviceNotFound(_) | PipelineError::NotFound(_) => IssueKind::NotFound,
            PipelineError::GenerationFailure(_) => IssueKind::GenerationFailure,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Why a run stopped before its last step
enum Halt {
    Cancelled { before: &'static str },
    Aborted { step: &'static str, error: PipelineError },
}

/// Allocates a process-wide strictly increasing microsecond stamp
fn next_stamp() -> i64 {
    static LAST: AtomicI64 = AtomicI64::new(0);

    let now = Utc::now().timestamp_micros();
    let mut prev = LAST.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST.compare_exchange_weak(prev, next, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

fn pipeline_id(kind: PipelineKind, user_id: &str) -> String {
    format!("{}_{}_{}", kind.id_prefix(), user_id, next_stamp())
}

// =============================================================================
// Run Context
// =============================================================================

/// Bookkeeping shared by the steps of one run
struct RunContext<'a> {
    orchestrator: &'a PipelineOrchestrator,
    id: String,
    kind: PipelineKind,
    total_steps: usize,
    completed: usize,
    /// Step payloads of this run, kept even after the registry entry is terminal
    steps: Map<String, JsonValue>,
    /// Set once the run has started changing a device
    committed: bool,
    issues: Vec<PipelineIssue>,
    warnings: Vec<String>,
    started: Instant,
}

impl RunContext<'_> {
    fn id(&self) -> &str {
        &self.id
    }

    /// Stops the run if it was cancelled since the previous step
    fn checkpoint(&self, next_step: &'static str) -> std::result::Result<(), Halt> {
        if self.committed {
            return Ok(());
        }
        if self.orchestrator.registry.status(&self.id) == Some(PipelineStatus::Cancelled) {
            return Err(Halt::Cancelled { before: next_step });
        }
        Ok(())
    }

    async fn complete_step(&mut self, step: &str, payload: JsonValue) {
        let registry = &self.orchestrator.registry;
        registry.record_step(&self.id, step, payload.clone());
        self.steps.insert(step.to_string(), payload);
        self.completed += 1;
        if registry.status(&self.id).is_some_and(|status| status.is_terminal()) {
            return;
        }

        let progress = self.progress();
        debug!("Pipeline {} completed {} ({}%)", self.id, step, progress);
        self.notify("running", progress, format!("Completed {}", step)).await;
    }

    fn record_issue(&mut self, step: &str, kind: IssueKind, message: impl Into<String>) {
        let issue = PipelineIssue::new(step, kind, message);
        warn!("Pipeline {} step {}: {}", self.id, step, issue.message);
        self.orchestrator
            .registry
            .push_warning(&self.id, format!("{}: {}", step, issue.message));
        self.issues.push(issue);
    }

    fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.orchestrator.registry.push_warning(&self.id, message.clone());
        self.warnings.push(message);
    }

    async fn notify(&self, status: &str, progress: u8, message: impl Into<String>) {
        self.orchestrator
            .hub
            .send_operation_update(&self.id, PIPELINE_OPERATION_TYPE, status, progress, message)
            .await;
    }

    fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn result(
        &self,
        success: bool,
        message: impl Into<String>,
        mut data: Map<String, JsonValue>,
        errors: Vec<String>,
    ) -> PipelineResult {
        data.insert("pipeline_id".to_string(), json!(self.id));
        PipelineResult {
            success,
            message: message.into(),
            data,
            errors,
            warnings: self.warnings.clone(),
            issues: self.issues.clone(),
            execution_time_seconds: self.elapsed(),
            timestamp: Utc::now(),
        }
    }

    /// Result for a run that stopped early; the registry entry is finished here
    async fn halted(&mut self, halt: Halt) -> PipelineResult {
        match halt {
            Halt::Cancelled { before } => {
                info!("Pipeline {} cancelled before {}", self.id, before);
                self.issues.push(PipelineIssue::new(
                    before,
                    IssueKind::Cancelled,
                    "pipeline was cancelled",
                ));
                self.notify("cancelled", self.progress(), "Pipeline cancelled").await;
                let data = self.steps.clone();
                self.result(false, "Pipeline cancelled", data, Vec::new())
            }
            Halt::Aborted { step, error } => {
                error!("Pipeline {} aborted at {}: {}", self.id, step, error);
                let registry = &self.orchestrator.registry;
                registry.push_error(&self.id, error.to_string());
                let status = registry.finish(&self.id, PipelineStatus::Failed);
                self.issues
                    .push(PipelineIssue::new(step, error.issue_kind(), error.to_string()));

                // Access failures are reported to the caller only
                if !matches!(
                    error,
                    PipelineError::AccessDenied(_) | PipelineError::DeviceNotFound(_)
                ) {
                    let status = status.unwrap_or(PipelineStatus::Failed);
                    self.notify(status.as_str(), self.progress(), error.to_string()).await;
                }

                let message = match self.kind {
                    PipelineKind::Generation => "Configuration generation failed".to_string(),
                    PipelineKind::Deployment => format!("Deployment failed: {}", error),
                };
                self.result(false, message, Map::new(), vec![error.to_string()])
            }
        }
    }

    fn progress(&self) -> u8 {
        (self.completed * 100 / self.total_steps) as u8
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct PipelineOrchestrator {
    llm: Arc<dyn LlmProvider>,
    devices: Arc<dyn DeviceDriver>,
    audit: Arc<dyn AuditStore>,
    hub: Arc<NotificationHub>,
    registry: PipelineRegistry,
}

impl PipelineOrchestrator {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        devices: Arc<dyn DeviceDriver>,
        audit: Arc<dyn AuditStore>,
        hub: Arc<NotificationHub>,
    ) -> Self {
        Self {
            llm,
            devices,
            audit,
            hub,
            registry: PipelineRegistry::new(),
        }
    }

    fn begin(&self, kind: PipelineKind, user_id: &str, total_steps: usize) -> RunContext<'_> {
        let id = pipeline_id(kind, user_id);
        self.registry.insert(PipelineRun::start(id.clone(), kind));
        info!("Pipeline {} started", id);

        RunContext {
            orchestrator: self,
            id,
            kind,
            total_steps,
            completed: 0,
            steps: Map::new(),
            committed: false,
            issues: Vec::new(),
            warnings: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Finishes a run that went through every step.
    ///
    /// A cancellation that landed during the last steps wins over `success`.
    async fn complete(
        &self,
        ctx: &mut RunContext<'_>,
        success: bool,
        message: &str,
        data: Map<String, JsonValue>,
        errors: Vec<String>,
    ) -> PipelineResult {
        let status = self
            .registry
            .finish(ctx.id(), PipelineStatus::Success)
            .unwrap_or(PipelineStatus::Success);
        info!("Pipeline {} finished with status {}", ctx.id(), status);

        if status != PipelineStatus::Cancelled {
            ctx.notify(status.as_str(), 100, message).await;
            return ctx.result(success, message, data, errors);
        }

        let last_step = match ctx.kind {
            PipelineKind::Generation => GENERATION_STEPS[GENERATION_STEPS.len() - 1],
            PipelineKind::Deployment => DEPLOYMENT_STEPS[DEPLOYMENT_STEPS.len() - 1],
        };
        let message = if ctx.committed {
            "Pipeline cancelled after the configuration was pushed"
        } else {
            "Pipeline cancelled"
        };
        ctx.issues.push(PipelineIssue::new(
            last_step,
            IssueKind::Cancelled,
            "pipeline was cancelled before it finished",
        ));
        ctx.notify("cancelled", 100, message).await;
        ctx.result(false, message, data, errors)
    }

    async fn audit_run(
        &self,
        ctx: &RunContext<'_>,
        user_id: &str,
        device_id: Option<&str>,
        result: &PipelineResult,
    ) {
        let status = self
            .registry
            .status(ctx.id())
            .unwrap_or(PipelineStatus::Failed);

        let mut entry = OperationLog::new(ctx.kind.operation_name(), status.as_str());
        entry.user_id = Some(user_id.to_string());
        entry.device_id = device_id.map(str::to_string);
        entry.result = Some(result.message.clone());
        entry.error_message = result.errors.first().cloned();
        entry.execution_time_ms = (result.execution_time_seconds * 1000.0) as u64;

        if let Err(e) = self.audit.record(entry).await {
            warn!("Failed to record audit entry for {}: {}", ctx.id(), e);
        }
    }

    // =========================================================================
    // Generation
    // =========================================================================

    /// Generates a device configuration from free-form requirements
    pub async fn run_generation_pipeline(
        &self,
        requirements: &str,
        device_type: &str,
        user_id: &str,
        validation_level: ValidationLevel,
        parameters: Map<String, JsonValue>,
    ) -> PipelineResult {
        let mut ctx = self.begin(PipelineKind::Generation, user_id, GENERATION_STEPS.len());
        ctx.notify("running", 0, "Configuration generation started").await;

        let result = match self
            .generation_steps(&mut ctx, requirements, device_type, validation_level, parameters)
            .await
        {
            Ok((data, validation_warnings)) => {
                for warning in validation_warnings {
                    ctx.warn(warning);
                }
                let message = "Configuration generated successfully";
                self.complete(&mut ctx, true, message, data, Vec::new()).await
            }
            Err(halt) => ctx.halted(halt).await,
        };

        self.audit_run(&ctx, user_id, None, &result).await;
        result
    }

    async fn generation_steps(
        &self,
        ctx: &mut RunContext<'_>,
        requirements: &str,
        device_type: &str,
        validation_level: ValidationLevel,
        parameters: Map<String, JsonValue>,
    ) -> std::result::Result<(Map<String, JsonValue>, Vec<String>), Halt> {
        let [enhance, generate, validate, optimize] = GENERATION_STEPS;

        // Enhancement is best effort
        ctx.checkpoint(enhance)?;
        let enhancement = self.llm.enhance(requirements, device_type, &parameters).await;
        let enhanced = match enhancement {
            Ok(enhanced) => enhanced,
            Err(e) => {
                ctx.record_issue(enhance, IssueKind::EnhancementSkipped, e.to_string());
                EnhancedRequirements::unenhanced(requirements, device_type, parameters)
            }
        };
        ctx.complete_step(enhance, json!(enhanced)).await;

        ctx.checkpoint(generate)?;
        let config = match self.llm.generate(&enhanced, device_type).await {
            Ok(config) if config.trim().is_empty() => {
                return Err(Halt::Aborted {
                    step: generate,
                    error: PipelineError::GenerationFailure(
                        "provider returned an empty configuration".to_string(),
                    ),
                });
            }
            Ok(config) => config,
            Err(e) => {
                return Err(Halt::Aborted {
                    step: generate,
                    error: PipelineError::GenerationFailure(e.to_string()),
                });
            }
        };
        ctx.complete_step(generate, json!({ "config": config })).await;

        ctx.checkpoint(validate)?;
        let validation = match self.llm.validate(&config, device_type, validation_level).await {
            Ok(validation) => validation,
            Err(e) => {
                ctx.record_issue(validate, IssueKind::ValidationDegraded, e.to_string());
                ValidationResult::degraded(e.to_string())
            }
        };
        ctx.complete_step(validate, json!(validation)).await;

        ctx.checkpoint(optimize)?;
        let (config, optimized) = if validation.skips_optimization() {
            (config, false)
        } else {
            let optimization = self.llm.optimize(&config, device_type, &validation).await;
            match optimization {
                Ok(optimized) if !optimized.trim().is_empty() => (optimized, true),
                Ok(_) => {
                    ctx.record_issue(
                        optimize,
                        IssueKind::OptimizationSkipped,
                        "provider returned an empty configuration",
                    );
                    (config, false)
                }
                Err(e) => {
                    ctx.record_issue(optimize, IssueKind::OptimizationSkipped, e.to_string());
                    (config, false)
                }
            }
        };
        let payload = json!({ "optimized": optimized, "config": config });
        ctx.complete_step(optimize, payload).await;

        let mut data = Map::new();
        data.insert("original_requirements".to_string(), json!(requirements));
        data.insert("enhanced_requirements".to_string(), json!(enhanced));
        data.insert("generated_config".to_string(), json!(config));
        data.insert("validation".to_string(), json!(validation));
        data.insert("device_type".to_string(), json!(device_type));
        Ok((data, validation.warnings.clone()))
    }

    // =========================================================================
    // Deployment
    // =========================================================================

    /// Pushes a configuration to a device the user owns
    ///
    /// `rollback_on_failure` is recorded but no rollback is performed.
    pub async fn run_deployment_pipeline(
        &self,
        config: &str,
        device_id: &str,
        user_id: &str,
        dry_run: bool,
        backup_current: bool,
        rollback_on_failure: bool,
    ) -> PipelineResult {
        let mut ctx = self.begin(PipelineKind::Deployment, user_id, DEPLOYMENT_STEPS.len());

        let result = match self
            .deployment_steps(
                &mut ctx,
                config,
                device_id,
                user_id,
                dry_run,
                backup_current,
                rollback_on_failure,
            )
            .await
        {
            Ok((success, data, errors)) => {
                let message = if dry_run {
                    "Dry run completed successfully"
                } else if success {
                    "Configuration deployed successfully"
                } else {
                    "Configuration deployment failed"
                };
                self.complete(&mut ctx, success, message, data, errors).await
            }
            Err(halt) => ctx.halted(halt).await,
        };

        self.audit_run(&ctx, user_id, Some(device_id), &result).await;
        result
    }

    async fn validate_device_access(&self, device_id: &str, user_id: &str) -> Result<Device> {
        let device = self
            .devices
            .resolve(device_id)
            .await
            .ok_or_else(|| PipelineError::DeviceNotFound(device_id.to_string()))?;

        if device.owner_id != user_id {
            return Err(PipelineError::AccessDenied(device_id.to_string()));
        }
        Ok(device)
    }

    #[allow(clippy::too_many_arguments)]
    async fn deployment_steps(
        &self,
        ctx: &mut RunContext<'_>,
        config: &str,
        device_id: &str,
        user_id: &str,
        dry_run: bool,
        backup_current: bool,
        rollback_on_failure: bool,
    ) -> std::result::Result<(bool, Map<String, JsonValue>, Vec<String>), Halt> {
        let [access, pre_check, backup_step, deploy, post_check] = DEPLOYMENT_STEPS;

        ctx.checkpoint(access)?;
        let device = self
            .validate_device_access(device_id, user_id)
            .await
            .map_err(|error| Halt::Aborted { step: access, error })?;
        ctx.notify("running", 0, "Configuration deployment started").await;
        ctx.complete_step(
            access,
            json!({ "device_id": device.id, "device_name": device.name, "access": "granted" }),
        )
        .await;

        ctx.checkpoint(pre_check)?;
        let pre_checks = self.pre_deployment_checks(ctx, &device, config, dry_run).await;
        ctx.complete_step(pre_check, json!(pre_checks)).await;

        ctx.checkpoint(backup_step)?;
        let backup = if backup_current && !dry_run {
            Some(self.backup_current_config(ctx, &device).await)
        } else {
            None
        };
        ctx.complete_step(backup_step, json!(backup)).await;

        ctx.checkpoint(deploy)?;
        ctx.committed = !dry_run;
        let deployment = self.deploy_configuration(ctx, &device, config, dry_run).await;
        if !deployment.success && rollback_on_failure {
            ctx.warn(ROLLBACK_NOT_PERFORMED);
        }
        ctx.complete_step(deploy, json!(deployment)).await;

        ctx.checkpoint(post_check)?;
        let post_checks = self.post_deployment_checks(ctx, &device, &deployment, dry_run).await;
        ctx.complete_step(post_check, json!(post_checks)).await;

        for err in &deployment.errors {
            self.registry.push_error(ctx.id(), err.clone());
        }

        let mut data = Map::new();
        data.insert("device_id".to_string(), json!(device.id));
        data.insert("device_name".to_string(), json!(device.name));
        data.insert("dry_run".to_string(), json!(dry_run));
        data.insert("rollback_on_failure".to_string(), json!(rollback_on_failure));
        data.insert("pre_checks".to_string(), json!(pre_checks));
        data.insert("backup".to_string(), json!(backup));
        data.insert("deployment".to_string(), json!(deployment));
        data.insert("post_checks".to_string(), json!(post_checks));
        Ok((deployment.success, data, deployment.errors.clone()))
    }

    async fn pre_deployment_checks(
        &self,
        ctx: &mut RunContext<'_>,
        device: &Device,
        config: &str,
        dry_run: bool,
    ) -> PreDeploymentChecks {
        let step = DEPLOYMENT_STEPS[1];
        let mut checks = PreDeploymentChecks::default();

        match self
            .llm
            .validate(config, &device.device_type, ValidationLevel::Basic)
            .await
        {
            Ok(validation) => {
                checks.syntax_valid = validation.valid;
                if !validation.valid {
                    checks.errors.extend(validation.errors);
                }
                checks.warnings.extend(validation.warnings);
            }
            Err(e) => {
                checks.errors.push(format!("Syntax validation failed: {}", e));
                ctx.record_issue(step, IssueKind::PreCheckFailure, e.to_string());
            }
        }

        if dry_run {
            checks.connectivity = true;
            checks.device_ready = true;
            return checks;
        }

        match self.devices.test_connectivity(&device.id).await {
            Ok(status) => {
                checks.connectivity = status.is_online();
                checks.device_ready = status.is_online();
                if !status.is_online() {
                    checks.errors.push(format!("Device {} is {}", device.name, status));
                }
            }
            Err(e) => {
                checks.errors.push(format!("Connectivity test failed: {}", e));
                ctx.record_issue(step, IssueKind::PreCheckFailure, e.to_string());
            }
        }
        checks
    }

    async fn backup_current_config(
        &self,
        ctx: &mut RunContext<'_>,
        device: &Device,
    ) -> BackupResult {
        let step = DEPLOYMENT_STEPS[2];
        match self.devices.backup(&device.id).await {
            Ok(backup) => {
                if !backup.success {
                    let reason = backup
                        .error
                        .clone()
                        .unwrap_or_else(|| "backup failed".to_string());
                    ctx.record_issue(step, IssueKind::BackupFailure, reason);
                }
                backup
            }
            Err(e) => {
                ctx.record_issue(step, IssueKind::BackupFailure, e.to_string());
                BackupResult::failed(e.to_string())
            }
        }
    }

    async fn deploy_configuration(
        &self,
        ctx: &mut RunContext<'_>,
        device: &Device,
        config: &str,
        dry_run: bool,
    ) -> DeploymentOutcome {
        let step = DEPLOYMENT_STEPS[3];
        if dry_run {
            return DeploymentOutcome::preview(config);
        }

        match self.devices.deploy(&device.id, config).await {
            Ok(result) => {
                if !result.success {
                    ctx.record_issue(step, IssueKind::DeployFailure, result.errors.join("; "));
                }
                DeploymentOutcome {
                    success: result.success,
                    dry_run: false,
                    message: result
                        .success
                        .then(|| format!("Configuration applied to {}", device.name)),
                    changes_preview: None,
                    errors: result.errors,
                }
            }
            Err(e) => {
                ctx.record_issue(step, IssueKind::DeployFailure, e.to_string());
                DeploymentOutcome::failed(e.to_string())
            }
        }
    }

    async fn post_deployment_checks(
        &self,
        ctx: &mut RunContext<'_>,
        device: &Device,
        deployment: &DeploymentOutcome,
        dry_run: bool,
    ) -> PostDeploymentChecks {
        if dry_run {
            return PostDeploymentChecks::assumed_healthy();
        }

        let step = DEPLOYMENT_STEPS[4];
        let mut checks = PostDeploymentChecks {
            configuration_applied: deployment.success,
            ..PostDeploymentChecks::default()
        };

        match self.devices.test_connectivity(&device.id).await {
            Ok(status) => {
                checks.device_responsive = status.is_online();
                checks.services_running = status.is_online();
                if !status.is_online() {
                    checks
                        .warnings
                        .push(format!("Device {} not responding after deployment", device.name));
                }
            }
            Err(e) => {
                checks.errors.push(format!("Connectivity test failed: {}", e));
                ctx.record_issue(step, IssueKind::PostCheckFailure, e.to_string());
            }
        }
        checks
    }

    // =========================================================================
    // Bookkeeping
    // =========================================================================

    pub fn get_pipeline_status(&self, id: &str) -> Result<PipelineRun> {
        self.registry
            .get(id)
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))
    }

    /// Requests cancellation; takes effect at the run's next step boundary
    pub fn cancel_pipeline(&self, id: &str) -> CancelOutcome {
        let outcome = self.registry.cancel(id);
        if outcome == CancelOutcome::Cancelled {
            info!("Pipeline {} cancelled", id);
        }
        outcome
    }

    /// Evicts every finished run; returns how many were removed
    pub fn cleanup_completed_pipelines(&self) -> usize {
        let removed = self.registry.remove_terminal();
        if removed > 0 {
            info!("Cleaned up {} completed pipeline(s)", removed);
        }
        removed
    }

    pub fn list_pipelines(&self) -> Vec<PipelineRun> {
        self.registry.list()
    }

    /// Starts a background task sweeping finished runs every `period`
    pub fn spawn_cleanup_task(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let orchestrator = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                debug!("Sweeping completed pipelines");
                orchestrator.cleanup_completed_pipelines();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::audit::InMemoryAuditStore;
    use crate::service::test_support::{Gate, MockDevices, MockLlm, RecordingConnection};
    use std::collections::HashSet;

    struct Harness {
        orchestrator: Arc<PipelineOrchestrator>,
        llm: Arc<MockLlm>,
        devices: Arc<MockDevices>,
        audit: Arc<InMemoryAuditStore>,
        hub: Arc<NotificationHub>,
    }

    fn harness(llm: MockLlm, devices: MockDevices) -> Harness {
        let llm = Arc::new(llm);
        let devices = Arc::new(devices);
        let audit = Arc::new(InMemoryAuditStore::new());
        let hub = Arc::new(NotificationHub::new());
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            llm.clone(),
            devices.clone(),
            audit.clone(),
            hub.clone(),
        ));
        Harness {
            orchestrator,
            llm,
            devices,
            audit,
            hub,
        }
    }

    async fn subscriber(hub: &NotificationHub) -> Arc<RecordingConnection> {
        let conn = Arc::new(RecordingConnection::new());
        hub.connect(conn.clone(), "watcher", Some(PIPELINE_OPERATION_TYPE)).await;
        conn
    }

    async fn generate(h: &Harness, requirements: &str) -> PipelineResult {
        h.orchestrator
            .run_generation_pipeline(
                requirements,
                "cisco-ios",
                "u1",
                ValidationLevel::Advanced,
                Map::new(),
            )
            .await
    }

    async fn deploy(h: &Harness, user_id: &str, dry_run: bool) -> PipelineResult {
        h.orchestrator
            .run_deployment_pipeline(
                "vlan 10\n name engineering\n",
                "r1",
                user_id,
                dry_run,
                true,
                true,
            )
            .await
    }

    fn status_of(h: &Harness, result: &PipelineResult) -> PipelineStatus {
        h.orchestrator
            .get_pipeline_status(result.pipeline_id().unwrap())
            .unwrap()
            .status
    }

    #[test]
    fn test_pipeline_ids_are_unique() {
        let ids: HashSet<String> = (0..1000)
            .map(|_| pipeline_id(PipelineKind::Generation, "u1"))
            .collect();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| id.starts_with("gen_u1_")));
    }

    // -------------------------------------------------------------------------
    // Generation
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_generation_success() {
        let h = harness(MockLlm::new(), MockDevices::new());
        let result = generate(&h, "create VLAN 10 for engineering").await;

        assert!(result.success);
        let config = result.data["generated_config"].as_str().unwrap();
        assert!(config.contains("create VLAN 10 for engineering"));
        assert!(result.data["validation"]["valid"].is_boolean());
        assert_eq!(result.data["device_type"], "cisco-ios");
        assert_eq!(result.warnings, vec!["no interface descriptions".to_string()]);
        assert!(result.errors.is_empty());
        assert_eq!(status_of(&h, &result), PipelineStatus::Success);

        assert_eq!(h.llm.validate_levels(), vec![ValidationLevel::Advanced]);
        // Valid with score 0.9 skips optimization
        assert_eq!(h.llm.optimize_calls(), 0);
    }

    #[tokio::test]
    async fn test_generation_records_steps_in_order() {
        let h = harness(MockLlm::new(), MockDevices::new());
        let result = generate(&h, "create VLAN 10").await;

        let run = h
            .orchestrator
            .get_pipeline_status(result.pipeline_id().unwrap())
            .unwrap();
        let steps: Vec<&str> = run.data.keys().map(String::as_str).collect();
        assert_eq!(steps, GENERATION_STEPS.to_vec());
        assert!(run.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_generation_failure_aborts() {
        let h = harness(MockLlm::new().failing_generate(), MockDevices::new());
        let result = generate(&h, "create VLAN 10").await;

        assert!(!result.success);
        assert_eq!(result.data.len(), 1);
        assert!(result.pipeline_id().is_some());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.issues.last().unwrap().kind, IssueKind::GenerationFailure);
        assert_eq!(h.llm.validate_calls(), 0);
        assert_eq!(status_of(&h, &result), PipelineStatus::Failed);
    }

    #[tokio::test]
    async fn test_empty_generated_config_aborts() {
        let h = harness(MockLlm::new().empty_generate(), MockDevices::new());
        let result = generate(&h, "create VLAN 10").await;

        assert!(!result.success);
        assert_eq!(result.data.len(), 1);
    }

    #[tokio::test]
    async fn test_validation_failure_degrades() {
        let h = harness(MockLlm::new().failing_validate(), MockDevices::new());
        let result = generate(&h, "create VLAN 10").await;

        assert!(result.success);
        assert_eq!(result.data["validation"]["valid"], false);
        assert_eq!(result.data["validation"]["score"], 0.0);
        assert!(!result.data["generated_config"].as_str().unwrap().is_empty());
        assert!(result
            .issues
            .iter()
            .any(|issue| issue.kind == IssueKind::ValidationDegraded));
        // Invalid verdict sends the config through optimization
        assert_eq!(h.llm.optimize_calls(), 1);
    }

    #[tokio::test]
    async fn test_enhancement_failure_falls_back() {
        let h = harness(MockLlm::new().failing_enhance(), MockDevices::new());
        let result = generate(&h, "create VLAN 10").await;

        assert!(result.success);
        let enhanced = &result.data["enhanced_requirements"];
        assert_eq!(enhanced["original"], "create VLAN 10");
        assert!(enhanced.get("enhanced").is_none());
        assert_eq!(result.issues[0].kind, IssueKind::EnhancementSkipped);
    }

    #[tokio::test]
    async fn test_low_score_is_optimized() {
        let h = harness(MockLlm::new().with_validation(true, 0.8), MockDevices::new());
        let result = generate(&h, "create VLAN 10").await;

        assert_eq!(h.llm.optimize_calls(), 1);
        assert!(result.data["generated_config"]
            .as_str()
            .unwrap()
            .ends_with("! optimized\n"));
    }

    #[tokio::test]
    async fn test_optimization_failure_keeps_config() {
        let h = harness(
            MockLlm::new().with_validation(false, 0.3).failing_optimize(),
            MockDevices::new(),
        );
        let result = generate(&h, "create VLAN 10").await;

        assert!(result.success);
        let config = result.data["generated_config"].as_str().unwrap();
        assert!(!config.contains("optimized"));
        assert_eq!(result.issues[0].kind, IssueKind::OptimizationSkipped);
    }

    #[tokio::test]
    async fn test_concurrent_generations_are_isolated() {
        let h = harness(MockLlm::new(), MockDevices::new());
        let (first, second) = tokio::join!(
            generate(&h, "create VLAN 10 for engineering"),
            generate(&h, "create VLAN 20 for sales"),
        );

        let first_id = first.pipeline_id().unwrap();
        let second_id = second.pipeline_id().unwrap();
        assert_ne!(first_id, second_id);

        assert!(first.data["generated_config"].as_str().unwrap().contains("VLAN 10"));
        assert!(!first.data["generated_config"].as_str().unwrap().contains("VLAN 20"));
        assert!(second.data["generated_config"].as_str().unwrap().contains("VLAN 20"));

        assert!(h.orchestrator.get_pipeline_status(first_id).is_ok());
        assert!(h.orchestrator.get_pipeline_status(second_id).is_ok());
    }

    #[tokio::test]
    async fn test_generation_publishes_progress() {
        let h = harness(MockLlm::new(), MockDevices::new());
        let conn = subscriber(&h.hub).await;
        let result = generate(&h, "create VLAN 10").await;

        let updates: Vec<JsonValue> = conn
            .envelopes()
            .into_iter()
            .filter(|e| e["type"] == "operation_update")
            .collect();
        let progress: Vec<u64> = updates
            .iter()
            .map(|e| e["progress"].as_u64().unwrap())
            .collect();
        assert_eq!(progress, vec![0, 25, 50, 75, 100, 100]);
        assert!(updates
            .iter()
            .all(|e| e["operation_id"] == result.pipeline_id().unwrap()));
        assert_eq!(updates.last().unwrap()["status"], "success");
    }

    #[tokio::test]
    async fn test_generation_is_audited() {
        let h = harness(MockLlm::new().failing_generate(), MockDevices::new());
        generate(&h, "create VLAN 10").await;

        let entries = h.audit.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation_type, "config_generation");
        assert_eq!(entries[0].status, "failed");
        assert_eq!(entries[0].user_id.as_deref(), Some("u1"));
        assert!(entries[0].error_message.is_some());
    }

    // -------------------------------------------------------------------------
    // Deployment
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_dry_run_never_touches_device() {
        let h = harness(MockLlm::new(), MockDevices::new().with_device("r1", "u1").offline());
        let result = deploy(&h, "u1", true).await;

        assert!(result.success);
        assert!(result.data["backup"].is_null());
        assert_eq!(result.data["deployment"]["dry_run"], true);
        assert!(result.data["deployment"]["changes_preview"].is_object());
        assert_eq!(result.data["pre_checks"]["connectivity"], true);
        assert_eq!(result.data["post_checks"]["device_responsive"], true);

        assert_eq!(h.devices.deploy_calls(), 0);
        assert_eq!(h.devices.backup_calls(), 0);
        assert_eq!(h.devices.connectivity_calls(), 0);
        assert_eq!(h.llm.validate_levels(), vec![ValidationLevel::Basic]);
    }

    #[tokio::test]
    async fn test_access_denied_short_circuits() {
        let h = harness(MockLlm::new(), MockDevices::new().with_device("r1", "owner"));
        let conn = subscriber(&h.hub).await;
        let result = deploy(&h, "intruder", false).await;

        assert!(!result.success);
        assert!(result.message.contains("access"));
        assert_eq!(result.data.len(), 1);
        assert!(result.data.get("backup").is_none());
        assert!(result.data.get("deployment").is_none());
        assert_eq!(result.issues[0].kind, IssueKind::AccessDenied);

        assert_eq!(h.llm.validate_calls(), 0);
        assert_eq!(h.devices.backup_calls(), 0);
        assert_eq!(h.devices.deploy_calls(), 0);
        assert_eq!(status_of(&h, &result), PipelineStatus::Failed);
        // Only the connection confirmation
        assert_eq!(conn.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_device_aborts() {
        let h = harness(MockLlm::new(), MockDevices::new());
        let result = deploy(&h, "u1", false).await;

        assert!(!result.success);
        assert!(result.message.contains("not found"));
        assert_eq!(result.issues[0].kind, IssueKind::NotFound);
    }

    #[tokio::test]
    async fn test_deployment_success() {
        let h = harness(MockLlm::new(), MockDevices::new().with_device("r1", "u1"));
        let result = deploy(&h, "u1", false).await;

        assert!(result.success);
        assert_eq!(result.data["device_name"], "r1-name");
        assert_eq!(result.data["backup"]["success"], true);
        assert_eq!(result.data["deployment"]["success"], true);
        assert_eq!(result.data["post_checks"]["configuration_applied"], true);
        assert_eq!(h.devices.backup_calls(), 1);
        assert_eq!(h.devices.deploy_calls(), 1);
        assert_eq!(h.devices.connectivity_calls(), 2);

        let run = h
            .orchestrator
            .get_pipeline_status(result.pipeline_id().unwrap())
            .unwrap();
        let steps: Vec<&str> = run.data.keys().map(String::as_str).collect();
        assert_eq!(steps, DEPLOYMENT_STEPS.to_vec());
    }

    #[tokio::test]
    async fn test_backup_failure_does_not_block_deploy() {
        let h = harness(
            MockLlm::new(),
            MockDevices::new().with_device("r1", "u1").failing_backup(),
        );
        let result = deploy(&h, "u1", false).await;

        assert!(result.success);
        assert_eq!(result.data["backup"]["success"], false);
        assert_eq!(h.devices.deploy_calls(), 1);
        assert!(result
            .issues
            .iter()
            .any(|issue| issue.kind == IssueKind::BackupFailure));
    }

    #[tokio::test]
    async fn test_deploy_failure_is_reported_not_raised() {
        let h = harness(
            MockLlm::new(),
            MockDevices::new().with_device("r1", "u1").failing_deploy(),
        );
        let result = deploy(&h, "u1", false).await;

        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.data["post_checks"]["configuration_applied"], false);
        assert_eq!(result.data["rollback_on_failure"], true);
        assert!(result.warnings.contains(&ROLLBACK_NOT_PERFORMED.to_string()));
        // Every step ran, so the run itself completed
        assert_eq!(status_of(&h, &result), PipelineStatus::Success);
    }

    #[tokio::test]
    async fn test_rejected_deploy_keeps_device_errors() {
        let h = harness(
            MockLlm::new(),
            MockDevices::new().with_device("r1", "u1").rejecting_deploy(),
        );
        let result = h
            .orchestrator
            .run_deployment_pipeline("vlan 10", "r1", "u1", false, false, false)
            .await;

        assert!(!result.success);
        assert_eq!(result.errors, vec!["% Invalid input detected".to_string()]);
        assert!(result.warnings.is_empty());
        assert!(result.data["backup"].is_null());
    }

    #[tokio::test]
    async fn test_offline_device_fails_pre_checks_without_aborting() {
        let h = harness(MockLlm::new(), MockDevices::new().with_device("r1", "u1").offline());
        let result = deploy(&h, "u1", false).await;

        assert_eq!(result.data["pre_checks"]["connectivity"], false);
        assert_eq!(result.data["pre_checks"]["device_ready"], false);
        assert_eq!(result.data["post_checks"]["device_responsive"], false);
        assert_eq!(h.devices.deploy_calls(), 1);
    }

    #[tokio::test]
    async fn test_connectivity_errors_become_issues() {
        let h = harness(
            MockLlm::new().failing_validate(),
            MockDevices::new().with_device("r1", "u1").failing_connectivity(),
        );
        let result = deploy(&h, "u1", false).await;

        let kinds: Vec<IssueKind> = result.issues.iter().map(|issue| issue.kind).collect();
        assert!(kinds.contains(&IssueKind::PreCheckFailure));
        assert!(kinds.contains(&IssueKind::PostCheckFailure));
        assert_eq!(result.data["pre_checks"]["syntax_valid"], false);
        assert_eq!(
            result.data["pre_checks"]["errors"].as_array().unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_deployment_publishes_after_access_check() {
        let h = harness(MockLlm::new(), MockDevices::new().with_device("r1", "u1"));
        let conn = subscriber(&h.hub).await;
        deploy(&h, "u1", true).await;

        let progress: Vec<u64> = conn
            .envelopes()
            .into_iter()
            .filter(|e| e["type"] == "operation_update")
            .map(|e| e["progress"].as_u64().unwrap())
            .collect();
        assert_eq!(progress, vec![0, 20, 40, 60, 80, 100, 100]);
    }

    // -------------------------------------------------------------------------
    // Bookkeeping
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_cancellation_stops_at_next_step() {
        let gate = Arc::new(Gate::default());
        let h = harness(MockLlm::new().gated_generate(gate.clone()), MockDevices::new());

        let orchestrator = h.orchestrator.clone();
        let run = tokio::spawn(async move {
            orchestrator
                .run_generation_pipeline(
                    "create VLAN 10",
                    "cisco-ios",
                    "u1",
                    ValidationLevel::Basic,
                    Map::new(),
                )
                .await
        });

        gate.entered.notified().await;
        let id = h.orchestrator.list_pipelines()[0].id.clone();
        assert_eq!(h.orchestrator.cancel_pipeline(&id), CancelOutcome::Cancelled);
        gate.release.notify_one();

        let result = run.await.unwrap();
        assert!(!result.success);
        assert_eq!(result.issues.last().unwrap().kind, IssueKind::Cancelled);
        assert_eq!(result.issues.last().unwrap().step, "validate_configuration");
        assert_eq!(h.llm.validate_calls(), 0);

        // The generated config is still handed back to the caller
        assert!(result.data.contains_key("generate_configuration"));

        let stored = h.orchestrator.get_pipeline_status(&id).unwrap();
        assert_eq!(stored.status, PipelineStatus::Cancelled);
        assert!(stored.data.get("generate_configuration").is_none());

        let entries = h.audit.list().await.unwrap();
        assert_eq!(entries[0].status, "cancelled");
    }

    #[tokio::test]
    async fn test_cancel_during_last_step_is_not_reported_as_success() {
        let gate = Arc::new(Gate::default());
        let llm = MockLlm::new()
            .with_validation(false, 0.2)
            .gated_optimize(gate.clone());
        let h = harness(llm, MockDevices::new());
        let conn = subscriber(&h.hub).await;

        let orchestrator = h.orchestrator.clone();
        let run = tokio::spawn(async move {
            orchestrator
                .run_generation_pipeline(
                    "vlan 10",
                    "cisco-ios",
                    "u1",
                    ValidationLevel::Basic,
                    Map::new(),
                )
                .await
        });

        gate.entered.notified().await;
        let id = h.orchestrator.list_pipelines()[0].id.clone();
        assert_eq!(h.orchestrator.cancel_pipeline(&id), CancelOutcome::Cancelled);
        gate.release.notify_one();

        let result = run.await.unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "Pipeline cancelled");
        assert_eq!(h.llm.optimize_calls(), 1);
        assert!(result.data["generated_config"]
            .as_str()
            .unwrap()
            .ends_with("! optimized\n"));

        let issue = result.issues.last().unwrap();
        assert_eq!(issue.kind, IssueKind::Cancelled);
        assert_eq!(issue.step, "optimize_configuration");

        assert_eq!(status_of(&h, &result), PipelineStatus::Cancelled);
        let entries = h.audit.list().await.unwrap();
        assert_eq!(entries[0].status, "cancelled");
        assert_eq!(entries[0].result.as_deref(), Some("Pipeline cancelled"));

        let last = conn.envelopes().pop().unwrap();
        assert_eq!(last["status"], "cancelled");
    }

    #[tokio::test]
    async fn test_cancel_during_deploy_keeps_device_changes() {
        let gate = Arc::new(Gate::default());
        let devices = MockDevices::new()
            .with_device("r1", "u1")
            .gated_deploy(gate.clone());
        let h = harness(MockLlm::new(), devices);

        let orchestrator = h.orchestrator.clone();
        let run = tokio::spawn(async move {
            orchestrator
                .run_deployment_pipeline("vlan 10\n", "r1", "u1", false, true, true)
                .await
        });

        gate.entered.notified().await;
        let id = h.orchestrator.list_pipelines()[0].id.clone();
        assert_eq!(h.orchestrator.cancel_pipeline(&id), CancelOutcome::Cancelled);
        gate.release.notify_one();

        let result = run.await.unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "Pipeline cancelled after the configuration was pushed");
        assert_eq!(h.devices.deploy_calls(), 1);
        assert_eq!(result.data["deployment"]["success"], true);
        assert_eq!(result.data["backup"]["success"], true);
        assert!(result.data.contains_key("post_checks"));
        // Post-deployment checks still probed the device
        assert_eq!(h.devices.connectivity_calls(), 2);

        let issue = result.issues.last().unwrap();
        assert_eq!(issue.kind, IssueKind::Cancelled);
        assert_eq!(issue.step, "post_deployment_checks");

        assert_eq!(status_of(&h, &result), PipelineStatus::Cancelled);
        let entries = h.audit.list().await.unwrap();
        assert_eq!(entries[0].status, "cancelled");
        assert_eq!(entries[0].device_id.as_deref(), Some("r1"));
        assert_eq!(
            entries[0].result.as_deref(),
            Some("Pipeline cancelled after the configuration was pushed")
        );
    }

    #[tokio::test]
    async fn test_cancel_finished_and_unknown() {
        let h = harness(MockLlm::new(), MockDevices::new());
        let result = generate(&h, "create VLAN 10").await;

        assert_eq!(
            h.orchestrator.cancel_pipeline(result.pipeline_id().unwrap()),
            CancelOutcome::AlreadyFinished(PipelineStatus::Success)
        );
        assert_eq!(h.orchestrator.cancel_pipeline("gen_nobody_1"), CancelOutcome::NotFound);
        assert!(matches!(
            h.orchestrator.get_pipeline_status("gen_nobody_1"),
            Err(PipelineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let h = harness(MockLlm::new(), MockDevices::new().with_device("r1", "u1"));
        generate(&h, "create VLAN 10").await;
        deploy(&h, "u1", true).await;
        assert_eq!(h.orchestrator.list_pipelines().len(), 2);

        assert_eq!(h.orchestrator.cleanup_completed_pipelines(), 2);
        assert_eq!(h.orchestrator.cleanup_completed_pipelines(), 0);
        assert!(h.orchestrator.list_pipelines().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_spares_running_runs() {
        let gate = Arc::new(Gate::default());
        let h = harness(MockLlm::new().gated_generate(gate.clone()), MockDevices::new());

        let orchestrator = h.orchestrator.clone();
        let run = tokio::spawn(async move {
            orchestrator
                .run_generation_pipeline(
                    "vlan 10",
                    "cisco-ios",
                    "u1",
                    ValidationLevel::Basic,
                    Map::new(),
                )
                .await
        });
        gate.entered.notified().await;

        assert_eq!(h.orchestrator.cleanup_completed_pipelines(), 0);
        assert_eq!(h.orchestrator.list_pipelines().len(), 1);

        gate.release.notify_one();
        assert!(run.await.unwrap().success);
        assert_eq!(h.orchestrator.cleanup_completed_pipelines(), 1);
    }
}
