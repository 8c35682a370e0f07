//! API Module
//!
//! HTTP and WebSocket layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod llm;
pub mod operations;
pub mod pipeline;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::repository::{AuditStore, ProviderRegistry};
use crate::service::{CommandExecutor, NotificationHub, PipelineOrchestrator};

/// Shared handles every handler can extract
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub hub: Arc<NotificationHub>,
    pub commands: Arc<CommandExecutor>,
    pub providers: Arc<ProviderRegistry>,
    pub audit: Arc<dyn AuditStore>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route("/pipeline/generate", post(pipeline::generate_config))
        .route("/pipeline/deploy", post(pipeline::deploy_config))
        .route("/pipeline/list", get(pipeline::list_pipelines))
        .route("/pipeline/cleanup", post(pipeline::cleanup_pipelines))
        .route("/pipeline/{id}", get(pipeline::get_pipeline))
        .route("/pipeline/{id}/cancel", post(pipeline::cancel_pipeline))
        // LLM provider endpoints
        .route("/llm/providers", get(llm::list_providers))
        .route(
            "/llm/providers/{name}/activate",
            post(llm::activate_provider),
        )
        // Operation endpoints
        .route("/operations/execute-command", post(operations::execute_command))
        .route("/operations/logs", get(operations::list_logs))
        .route("/ws/operations", get(operations::operations_socket))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
