//! Pipeline API Handlers
//!
//! HTTP endpoints for running pipelines and inspecting their runs.

use axum::{
    Json,
    extract::{Path, State},
};
use netauto_core::domain::pipeline::PipelineResult;
use netauto_core::dto::pipeline::{CleanupSummary, DeployConfig, GenerateConfig, PipelineRunView};
use serde_json::{Value as JsonValue, json};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult, require};
use crate::service::CancelOutcome;

/// POST /pipeline/generate
pub async fn generate_config(
    State(state): State<AppState>,
    Json(req): Json<GenerateConfig>,
) -> ApiResult<Json<PipelineResult>> {
    require("requirements", &req.requirements)?;
    require("device_type", &req.device_type)?;
    require("user_id", &req.user_id)?;

    tracing::info!(
        "Generating {} configuration for user {}",
        req.device_type,
        req.user_id
    );

    let result = state
        .orchestrator
        .run_generation_pipeline(
            &req.requirements,
            &req.device_type,
            &req.user_id,
            req.validation_level,
            req.parameters,
        )
        .await;

    Ok(Json(result))
}

/// POST /pipeline/deploy
pub async fn deploy_config(
    State(state): State<AppState>,
    Json(req): Json<DeployConfig>,
) -> ApiResult<Json<PipelineResult>> {
    require("config", &req.config)?;
    require("device_id", &req.device_id)?;
    require("user_id", &req.user_id)?;

    tracing::info!(
        "Deploying configuration to {} for user {} (dry_run: {})",
        req.device_id,
        req.user_id,
        req.dry_run
    );

    let result = state
        .orchestrator
        .run_deployment_pipeline(
            &req.config,
            &req.device_id,
            &req.user_id,
            req.dry_run,
            req.backup_current,
            req.rollback_on_failure,
        )
        .await;

    Ok(Json(result))
}

/// GET /pipeline/list
pub async fn list_pipelines(State(state): State<AppState>) -> Json<Vec<PipelineRunView>> {
    tracing::debug!("Listing pipeline runs");

    let runs = state
        .orchestrator
        .list_pipelines()
        .into_iter()
        .map(PipelineRunView::from)
        .collect();

    Json(runs)
}

/// GET /pipeline/{id}
pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PipelineRunView>> {
    tracing::debug!("Getting pipeline run: {}", id);

    let run = state.orchestrator.get_pipeline_status(&id)?;
    Ok(Json(run.into()))
}

/// POST /pipeline/{id}/cancel
pub async fn cancel_pipeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JsonValue>> {
    match state.orchestrator.cancel_pipeline(&id) {
        CancelOutcome::Cancelled => Ok(Json(json!({ "id": id, "status": "cancelled" }))),
        CancelOutcome::AlreadyFinished(status) => Err(ApiError::BadRequest(format!(
            "Pipeline {} already finished with status {}",
            id, status
        ))),
        CancelOutcome::NotFound => Err(ApiError::NotFound(format!("Pipeline {} not found", id))),
    }
}

/// POST /pipeline/cleanup
pub async fn cleanup_pipelines(State(state): State<AppState>) -> Json<CleanupSummary> {
    let removed = state.orchestrator.cleanup_completed_pipelines();
    Json(CleanupSummary { removed })
}
