//! LLM Provider API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use netauto_core::dto::llm::ProviderList;

use crate::api::AppState;
use crate::api::error::ApiResult;

fn provider_list(state: &AppState) -> ProviderList {
    ProviderList {
        active: state.providers.active_name(),
        providers: state.providers.names(),
    }
}

/// GET /llm/providers
pub async fn list_providers(State(state): State<AppState>) -> Json<ProviderList> {
    Json(provider_list(&state))
}

/// POST /llm/providers/{name}/activate
pub async fn activate_provider(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ProviderList>> {
    state.providers.switch(&name)?;
    Ok(Json(provider_list(&state)))
}
