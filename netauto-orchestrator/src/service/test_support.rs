//! Recording collaborators for service tests

use async_trait::async_trait;
use netauto_core::domain::device::{BackupResult, ConnectivityStatus, DeployResult, Device};
use netauto_core::domain::generation::{EnhancedRequirements, ValidationResult};
use netauto_core::domain::pipeline::ValidationLevel;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::repository::device::{DeviceDriver, DeviceError};
use crate::repository::llm::{LlmError, LlmProvider};
use crate::service::notification::{ClientConnection, HubError};

// =============================================================================
// LLM
// =============================================================================

/// Pauses a call until the test releases it
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

impl Gate {
    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

pub struct MockLlm {
    fail_enhance: bool,
    fail_generate: bool,
    fail_validate: bool,
    fail_optimize: bool,
    empty_generate: bool,
    validation: ValidationResult,
    generate_gate: Option<Arc<Gate>>,
    optimize_gate: Option<Arc<Gate>>,
    enhance_calls: AtomicUsize,
    generate_calls: AtomicUsize,
    validate_calls: AtomicUsize,
    optimize_calls: AtomicUsize,
    validate_levels: Mutex<Vec<ValidationLevel>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            fail_enhance: false,
            fail_generate: false,
            fail_validate: false,
            fail_optimize: false,
            empty_generate: false,
            validation: ValidationResult {
                valid: true,
                errors: Vec::new(),
                warnings: vec!["no interface descriptions".to_string()],
                score: 0.9,
                level: None,
            },
            generate_gate: None,
            optimize_gate: None,
            enhance_calls: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
            validate_calls: AtomicUsize::new(0),
            optimize_calls: AtomicUsize::new(0),
            validate_levels: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_enhance(mut self) -> Self {
        self.fail_enhance = true;
        self
    }

    pub fn failing_generate(mut self) -> Self {
        self.fail_generate = true;
        self
    }

    pub fn failing_validate(mut self) -> Self {
        self.fail_validate = true;
        self
    }

    pub fn failing_optimize(mut self) -> Self {
        self.fail_optimize = true;
        self
    }

    pub fn empty_generate(mut self) -> Self {
        self.empty_generate = true;
        self
    }

    pub fn with_validation(mut self, valid: bool, score: f64) -> Self {
        self.validation.valid = valid;
        self.validation.score = score;
        self
    }

    pub fn gated_generate(mut self, gate: Arc<Gate>) -> Self {
        self.generate_gate = Some(gate);
        self
    }

    pub fn gated_optimize(mut self, gate: Arc<Gate>) -> Self {
        self.optimize_gate = Some(gate);
        self
    }

    pub fn enhance_calls(&self) -> usize {
        self.enhance_calls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    pub fn optimize_calls(&self) -> usize {
        self.optimize_calls.load(Ordering::SeqCst)
    }

    pub fn validate_levels(&self) -> Vec<ValidationLevel> {
        self.validate_levels.lock().unwrap().clone()
    }
}

fn unavailable(call: &str) -> LlmError {
    LlmError::ApiError {
        status: 503,
        message: format!("{} unavailable", call),
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    async fn enhance(
        &self,
        requirements: &str,
        device_type: &str,
        parameters: &Map<String, JsonValue>,
    ) -> Result<EnhancedRequirements, LlmError> {
        self.enhance_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_enhance {
            return Err(unavailable("enhance"));
        }
        Ok(EnhancedRequirements {
            original: requirements.to_string(),
            enhanced: Some(format!("{} (with security hardening)", requirements)),
            device_type: device_type.to_string(),
            parameters: parameters.clone(),
        })
    }

    async fn generate(
        &self,
        requirements: &EnhancedRequirements,
        device_type: &str,
    ) -> Result<String, LlmError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.generate_gate {
            gate.pass().await;
        }
        if self.fail_generate {
            return Err(unavailable("generate"));
        }
        if self.empty_generate {
            return Ok(String::new());
        }
        Ok(format!(
            "! {} for {}\nhostname edge-1\n",
            requirements.original, device_type
        ))
    }

    async fn validate(
        &self,
        _config: &str,
        _device_type: &str,
        level: ValidationLevel,
    ) -> Result<ValidationResult, LlmError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        self.validate_levels.lock().unwrap().push(level);
        if self.fail_validate {
            return Err(unavailable("validate"));
        }
        let mut result = self.validation.clone();
        result.level = Some(level);
        Ok(result)
    }

    async fn optimize(
        &self,
        config: &str,
        _device_type: &str,
        _validation: &ValidationResult,
    ) -> Result<String, LlmError> {
        self.optimize_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.optimize_gate {
            gate.pass().await;
        }
        if self.fail_optimize {
            return Err(unavailable("optimize"));
        }
        Ok(format!("{}! optimized\n", config))
    }
}

// =============================================================================
// Devices
// =============================================================================

pub struct MockDevices {
    devices: HashMap<String, Device>,
    connectivity: ConnectivityStatus,
    fail_connectivity: bool,
    fail_backup: bool,
    fail_deploy: bool,
    reject_deploy: bool,
    fail_command: bool,
    deploy_gate: Option<Arc<Gate>>,
    connectivity_calls: AtomicUsize,
    backup_calls: AtomicUsize,
    deploy_calls: AtomicUsize,
    command_calls: AtomicUsize,
}

impl MockDevices {
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
            connectivity: ConnectivityStatus::Online,
            fail_connectivity: false,
            fail_backup: false,
            fail_deploy: false,
            reject_deploy: false,
            fail_command: false,
            deploy_gate: None,
            connectivity_calls: AtomicUsize::new(0),
            backup_calls: AtomicUsize::new(0),
            deploy_calls: AtomicUsize::new(0),
            command_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_device(mut self, id: &str, owner_id: &str) -> Self {
        self.devices.insert(
            id.to_string(),
            Device {
                id: id.to_string(),
                name: format!("{}-name", id),
                owner_id: owner_id.to_string(),
                device_type: "cisco-ios".to_string(),
            },
        );
        self
    }

    pub fn offline(mut self) -> Self {
        self.connectivity = ConnectivityStatus::Offline;
        self
    }

    pub fn failing_connectivity(mut self) -> Self {
        self.fail_connectivity = true;
        self
    }

    pub fn failing_backup(mut self) -> Self {
        self.fail_backup = true;
        self
    }

    pub fn failing_deploy(mut self) -> Self {
        self.fail_deploy = true;
        self
    }

    /// Deploy returns normally but reports the push as unsuccessful
    pub fn rejecting_deploy(mut self) -> Self {
        self.reject_deploy = true;
        self
    }

    pub fn failing_command(mut self) -> Self {
        self.fail_command = true;
        self
    }

    pub fn gated_deploy(mut self, gate: Arc<Gate>) -> Self {
        self.deploy_gate = Some(gate);
        self
    }

    pub fn connectivity_calls(&self) -> usize {
        self.connectivity_calls.load(Ordering::SeqCst)
    }

    pub fn backup_calls(&self) -> usize {
        self.backup_calls.load(Ordering::SeqCst)
    }

    pub fn deploy_calls(&self) -> usize {
        self.deploy_calls.load(Ordering::SeqCst)
    }

    pub fn command_calls(&self) -> usize {
        self.command_calls.load(Ordering::SeqCst)
    }

    fn unreachable(device_id: &str) -> DeviceError {
        DeviceError::ConnectionFailed {
            device_id: device_id.to_string(),
            message: "connection timed out".to_string(),
        }
    }
}

#[async_trait]
impl DeviceDriver for MockDevices {
    async fn resolve(&self, device_id: &str) -> Option<Device> {
        self.devices.get(device_id).cloned()
    }

    async fn test_connectivity(&self, device_id: &str) -> Result<ConnectivityStatus, DeviceError> {
        self.connectivity_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connectivity {
            return Err(Self::unreachable(device_id));
        }
        Ok(self.connectivity)
    }

    async fn backup(&self, device_id: &str) -> Result<BackupResult, DeviceError> {
        self.backup_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_backup {
            return Err(Self::unreachable(device_id));
        }
        Ok(BackupResult {
            success: true,
            size_bytes: 2048,
            error: None,
        })
    }

    async fn deploy(&self, device_id: &str, _config: &str) -> Result<DeployResult, DeviceError> {
        self.deploy_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.deploy_gate {
            gate.pass().await;
        }
        if self.fail_deploy {
            return Err(Self::unreachable(device_id));
        }
        if self.reject_deploy {
            return Ok(DeployResult {
                success: false,
                errors: vec!["% Invalid input detected".to_string()],
            });
        }
        Ok(DeployResult {
            success: true,
            errors: Vec::new(),
        })
    }

    async fn execute_command(&self, device_id: &str, command: &str) -> Result<String, DeviceError> {
        self.command_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_command {
            return Err(Self::unreachable(device_id));
        }
        Ok(format!("{}: output of '{}'", device_id, command))
    }
}

// =============================================================================
// Connections
// =============================================================================

#[derive(Default)]
pub struct RecordingConnection {
    messages: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn envelopes(&self) -> Vec<JsonValue> {
        self.messages()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

#[async_trait]
impl ClientConnection for RecordingConnection {
    async fn send_text(&self, text: String) -> Result<(), HubError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(HubError::Closed);
        }
        self.messages.lock().unwrap().push(text);
        Ok(())
    }
}
