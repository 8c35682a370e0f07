//! Audit domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted record of one operation (pipeline run or device command)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationLog {
    pub id: Uuid,
    /// e.g. "config_generation", "config_deployment", "command_execution"
    pub operation_type: String,
    pub status: String,
    pub device_id: Option<String>,
    pub user_id: Option<String>,
    pub command: Option<String>,
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub execution_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl OperationLog {
    pub fn new(operation_type: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation_type: operation_type.into(),
            status: status.into(),
            device_id: None,
            user_id: None,
            command: None,
            result: None,
            error_message: None,
            execution_time_ms: 0,
            created_at: Utc::now(),
        }
    }
}
