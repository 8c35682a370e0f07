//! Real-time event types
//!
//! The envelope is the single shape delivered to WebSocket clients.
//! Its `type` field discriminates the event; every other field is optional
//! except the timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Class of operation a client can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Audit,
    Troubleshoot,
    Baseline,
    CommandExecution,
}

impl OperationType {
    pub const ALL: [OperationType; 4] = [
        OperationType::Audit,
        OperationType::Troubleshoot,
        OperationType::Baseline,
        OperationType::CommandExecution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Audit => "audit",
            OperationType::Troubleshoot => "troubleshoot",
            OperationType::Baseline => "baseline",
            OperationType::CommandExecution => "command_execution",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationType::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("Unknown operation type: {}", s))
    }
}

/// Discriminator of an [`Envelope`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ConnectionConfirmed,
    OperationUpdate,
    DeviceStatus,
    CommandResult,
    Subscribed,
    Pong,
}

/// Event delivered to subscribed clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_type: Option<OperationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            client_id: None,
            operation_id: None,
            operation_type: None,
            status: None,
            progress: None,
            message: None,
            data: None,
            timestamp: Utc::now(),
        }
    }

    pub fn connection_confirmed(client_id: impl Into<String>) -> Self {
        let mut envelope = Self::new(EventKind::ConnectionConfirmed);
        envelope.client_id = Some(client_id.into());
        envelope.message = Some("Connected to real-time updates".to_string());
        envelope
    }

    pub fn pong() -> Self {
        Self::new(EventKind::Pong)
    }

    pub fn subscribed(operation_type: OperationType) -> Self {
        let mut envelope = Self::new(EventKind::Subscribed);
        envelope.operation_type = Some(operation_type);
        envelope.message = Some(format!("Subscribed to {} updates", operation_type));
        envelope
    }

    /// Progress report for a long-running operation
    pub fn operation_update(
        operation_id: impl Into<String>,
        operation_type: OperationType,
        status: impl Into<String>,
    ) -> Self {
        let mut envelope = Self::new(EventKind::OperationUpdate);
        envelope.operation_id = Some(operation_id.into());
        envelope.operation_type = Some(operation_type);
        envelope.status = Some(status.into());
        envelope
    }

    /// Connection state of a device during command execution
    pub fn device_status(
        device_id: impl Into<String>,
        device_name: impl Into<String>,
        status: impl Into<String>,
        details: JsonValue,
    ) -> Self {
        let device_id = device_id.into();
        let mut envelope = Self::new(EventKind::DeviceStatus);
        envelope.operation_id = Some(device_id.clone());
        envelope.operation_type = Some(OperationType::CommandExecution);
        envelope.status = Some(status.into());
        envelope.data = Some(serde_json::json!({
            "device_id": device_id,
            "device_name": device_name.into(),
            "details": details,
        }));
        envelope
    }

    /// Output of a command run on a device
    pub fn command_result(
        device_id: impl Into<String>,
        command: impl Into<String>,
        result: impl Into<String>,
        success: bool,
        execution_time_seconds: Option<f64>,
    ) -> Self {
        let device_id = device_id.into();
        let mut envelope = Self::new(EventKind::CommandResult);
        envelope.operation_id = Some(device_id.clone());
        envelope.operation_type = Some(OperationType::CommandExecution);
        envelope.status = Some(if success { "success" } else { "error" }.to_string());
        envelope.data = Some(serde_json::json!({
            "device_id": device_id,
            "command": command.into(),
            "result": result.into(),
            "success": success,
            "execution_time": execution_time_seconds,
        }));
        envelope
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }
}

/// Message sent by a client over its connection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Ping,
    Subscribe {
        #[serde(default)]
        operation_type: Option<String>,
    },
}
