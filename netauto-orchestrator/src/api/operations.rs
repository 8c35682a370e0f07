//! Operations API Handlers
//!
//! Device command execution, the audit log, and the WebSocket endpoint
//! clients use to follow operations live.

use axum::{
    Json,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use netauto_core::domain::audit::OperationLog;
use netauto_core::domain::event::OperationType;
use netauto_core::dto::operation::{CommandOutcome, ExecuteCommand};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::{ApiResult, require};
use crate::service::{ChannelConnection, NotificationHub};

/// Envelopes queued for a socket before the client is dropped as stalled
const OUTBOUND_CAPACITY: usize = 256;

/// POST /operations/execute-command
pub async fn execute_command(
    State(state): State<AppState>,
    Json(req): Json<ExecuteCommand>,
) -> ApiResult<Json<CommandOutcome>> {
    require("device_id", &req.device_id)?;

    let outcome = state.commands.execute(&req.device_id, &req.command).await?;
    Ok(Json(outcome))
}

/// GET /operations/logs
pub async fn list_logs(State(state): State<AppState>) -> ApiResult<Json<Vec<OperationLog>>> {
    let logs = state.audit.list().await?;
    Ok(Json(logs))
}

/// GET /ws/operations
pub async fn operations_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(mut socket: WebSocket, hub: Arc<NotificationHub>) {
    let client_id = Uuid::new_v4().to_string();
    let (connection, mut outbound) = ChannelConnection::channel(OUTBOUND_CAPACITY);
    hub.connect(Arc::new(connection), &client_id, Some(OperationType::CommandExecution)).await;

    loop {
        tokio::select! {
            queued = outbound.recv() => {
                let Some(text) = queued else { break };
                if let Err(e) = socket.send(Message::Text(text.into())).await {
                    tracing::debug!("WebSocket send to {} failed: {}", client_id, e);
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    hub.handle_inbound(&client_id, text.as_str()).await
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("WebSocket receive from {} failed: {}", client_id, e);
                    break;
                }
            },
        }
    }

    hub.disconnect(&client_id);
}
