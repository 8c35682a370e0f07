//! Command Service
//!
//! Runs a single command on a device while streaming its progress to
//! `command_execution` subscribers.

use netauto_core::domain::audit::OperationLog;
use netauto_core::domain::event::OperationType;
use netauto_core::dto::operation::CommandOutcome;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::repository::audit::AuditStore;
use crate::repository::device::DeviceDriver;
use crate::service::notification::NotificationHub;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("command must not be empty")]
    EmptyCommand,
}

pub struct CommandExecutor {
    devices: Arc<dyn DeviceDriver>,
    audit: Arc<dyn AuditStore>,
    hub: Arc<NotificationHub>,
}

impl CommandExecutor {
    pub fn new(
        devices: Arc<dyn DeviceDriver>,
        audit: Arc<dyn AuditStore>,
        hub: Arc<NotificationHub>,
    ) -> Self {
        Self {
            devices,
            audit,
            hub,
        }
    }

    /// Executes `command` on a device.
    ///
    /// Device failures are reported in the outcome; only an unknown device
    /// or an empty command is an error.
    pub async fn execute(
        &self,
        device_id: &str,
        command: &str,
    ) -> Result<CommandOutcome, CommandError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(CommandError::EmptyCommand);
        }
        let device = self
            .devices
            .resolve(device_id)
            .await
            .ok_or_else(|| CommandError::DeviceNotFound(device_id.to_string()))?;

        tracing::info!("Executing '{}' on {}", command, device.name);
        let started = Instant::now();

        let details = json!({ "command": command });
        self.hub
            .send_device_status(&device.id, &device.name, "connecting", details.clone())
            .await;
        self.hub
            .send_device_status(&device.id, &device.name, "connected", details)
            .await;

        let outcome = self.devices.execute_command(&device.id, command).await;
        let elapsed = started.elapsed().as_secs_f64();

        let outcome = match outcome {
            Ok(output) => {
                self.hub
                    .send_command_result(&device.id, command, &output, true, Some(elapsed))
                    .await;
                self.hub
                    .send_device_status(
                        &device.id,
                        &device.name,
                        "command_completed",
                        json!({ "command": command, "execution_time": elapsed }),
                    )
                    .await;
                CommandOutcome {
                    success: true,
                    result: Some(output),
                    error: None,
                    execution_time_seconds: elapsed,
                }
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!("Command '{}' on {} failed: {}", command, device.name, message);
                self.hub
                    .send_command_result(&device.id, command, &message, false, Some(elapsed))
                    .await;
                self.hub
                    .send_device_status(
                        &device.id,
                        &device.name,
                        "error",
                        json!({ "command": command, "error": message }),
                    )
                    .await;
                CommandOutcome {
                    success: false,
                    result: None,
                    error: Some(message),
                    execution_time_seconds: elapsed,
                }
            }
        };

        let mut entry = OperationLog::new(
            OperationType::CommandExecution.as_str(),
            if outcome.success { "success" } else { "failed" },
        );
        entry.device_id = Some(device.id.clone());
        entry.command = Some(command.to_string());
        entry.result = outcome.result.clone();
        entry.error_message = outcome.error.clone();
        entry.execution_time_ms = (elapsed * 1000.0) as u64;
        if let Err(e) = self.audit.record(entry).await {
            tracing::warn!("Failed to record command execution: {}", e);
        }

        Ok(outcome)
    }
}
