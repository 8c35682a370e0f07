//! Operation DTOs

use serde::{Deserialize, Serialize};

/// Request to run a command on a device with live updates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteCommand {
    pub device_id: String,
    pub command: String,
}

/// Result of a command execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_seconds: f64,
}
