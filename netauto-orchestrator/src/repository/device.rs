//! Device Repository
//!
//! Access to managed network devices: lookup, reachability, configuration
//! backup and push, and command execution.

use async_trait::async_trait;
use netauto_core::domain::device::{BackupResult, ConnectivityStatus, DeployResult, Device};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;

const DEFAULT_PORT: u16 = 22;

/// Errors raised by device drivers
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Connection to device {device_id} failed: {message}")]
    ConnectionFailed { device_id: String, message: String },

    #[error("Unsupported command: {0}")]
    UnsupportedCommand(String),

    #[error("Invalid device inventory: {0}")]
    Inventory(String),
}

/// Operations the pipelines perform against devices
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    /// Looks up a device by id
    async fn resolve(&self, device_id: &str) -> Option<Device>;

    async fn test_connectivity(&self, device_id: &str) -> Result<ConnectivityStatus, DeviceError>;

    /// Saves the device's current running configuration
    async fn backup(&self, device_id: &str) -> Result<BackupResult, DeviceError>;

    /// Replaces the device's running configuration with `config`
    async fn deploy(&self, device_id: &str, config: &str) -> Result<DeployResult, DeviceError>;

    async fn execute_command(&self, device_id: &str, command: &str) -> Result<String, DeviceError>;
}

/// One entry of the JSON device inventory
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryEntry {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub device_type: String,
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub running_config: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[derive(Debug, Default)]
struct ConfigState {
    running: String,
    backup: Option<String>,
}

/// Driver over a static device inventory
///
/// Reachability is a TCP connect probe against each device's management
/// address. Running configurations and backups live in memory.
pub struct InventoryDeviceDriver {
    entries: HashMap<String, InventoryEntry>,
    configs: Mutex<HashMap<String, ConfigState>>,
    connect_timeout: Duration,
}

impl InventoryDeviceDriver {
    pub fn new(entries: Vec<InventoryEntry>, connect_timeout: Duration) -> Self {
        let configs = entries
            .iter()
            .map(|entry| {
                (
                    entry.id.clone(),
                    ConfigState {
                        running: entry.running_config.clone(),
                        backup: None,
                    },
                )
            })
            .collect();
        let entries = entries
            .into_iter()
            .map(|entry| (entry.id.clone(), entry))
            .collect();

        Self {
            entries,
            configs: Mutex::new(configs),
            connect_timeout,
        }
    }

    /// Driver with no devices; every lookup fails
    pub fn empty(connect_timeout: Duration) -> Self {
        Self::new(Vec::new(), connect_timeout)
    }

    /// Loads the inventory from a JSON file
    pub fn from_file(
        path: impl AsRef<Path>,
        connect_timeout: Duration,
    ) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DeviceError::Inventory(format!("{}: {}", path.display(), e)))?;
        let entries: Vec<InventoryEntry> = serde_json::from_str(&content)
            .map_err(|e| DeviceError::Inventory(format!("{}: {}", path.display(), e)))?;

        tracing::info!("Loaded {} device(s) from {}", entries.len(), path.display());
        Ok(Self::new(entries, connect_timeout))
    }

    fn entry(&self, device_id: &str) -> Result<&InventoryEntry, DeviceError> {
        self.entries
            .get(device_id)
            .ok_or_else(|| DeviceError::NotFound(device_id.to_string()))
    }

    async fn probe(&self, entry: &InventoryEntry) -> bool {
        let target = (entry.address.as_str(), entry.port);
        matches!(
            tokio::time::timeout(self.connect_timeout, TcpStream::connect(target)).await,
            Ok(Ok(_))
        )
    }
}

#[async_trait]
impl DeviceDriver for InventoryDeviceDriver {
    async fn resolve(&self, device_id: &str) -> Option<Device> {
        self.entries.get(device_id).map(|entry| Device {
            id: entry.id.clone(),
            name: entry.name.clone(),
            owner_id: entry.owner_id.clone(),
            device_type: entry.device_type.clone(),
        })
    }

    async fn test_connectivity(&self, device_id: &str) -> Result<ConnectivityStatus, DeviceError> {
        let entry = self.entry(device_id)?;
        let status = if self.probe(entry).await {
            ConnectivityStatus::Online
        } else {
            ConnectivityStatus::Offline
        };

        tracing::debug!(
            "Device {} ({}:{}) is {}",
            device_id,
            entry.address,
            entry.port,
            status
        );
        Ok(status)
    }

    async fn backup(&self, device_id: &str) -> Result<BackupResult, DeviceError> {
        let entry = self.entry(device_id)?;
        if !self.probe(entry).await {
            return Err(DeviceError::ConnectionFailed {
                device_id: device_id.to_string(),
                message: "device unreachable".to_string(),
            });
        }

        let mut configs = self.configs.lock().unwrap();
        let state = configs.entry(device_id.to_string()).or_default();
        state.backup = Some(state.running.clone());

        Ok(BackupResult {
            success: true,
            size_bytes: state.running.len() as u64,
            error: None,
        })
    }

    async fn deploy(&self, device_id: &str, config: &str) -> Result<DeployResult, DeviceError> {
        let entry = self.entry(device_id)?;
        if config.trim().is_empty() {
            return Ok(DeployResult {
                success: false,
                errors: vec!["Configuration is empty".to_string()],
            });
        }
        if !self.probe(entry).await {
            return Err(DeviceError::ConnectionFailed {
                device_id: device_id.to_string(),
                message: "device unreachable".to_string(),
            });
        }

        let mut configs = self.configs.lock().unwrap();
        configs.entry(device_id.to_string()).or_default().running = config.to_string();

        tracing::info!("Applied {} byte configuration to {}", config.len(), device_id);
        Ok(DeployResult {
            success: true,
            errors: Vec::new(),
        })
    }

    async fn execute_command(&self, device_id: &str, command: &str) -> Result<String, DeviceError> {
        self.entry(device_id)?;
        match command.trim() {
            "show running-config" | "show run" => {
                let configs = self.configs.lock().unwrap();
                Ok(configs
                    .get(device_id)
                    .map(|state| state.running.clone())
                    .unwrap_or_default())
            }
            // Configuration saved by the last backup, empty if none was taken
            "show backup" => {
                let configs = self.configs.lock().unwrap();
                Ok(configs
                    .get(device_id)
                    .and_then(|state| state.backup.clone())
                    .unwrap_or_default())
            }
            other => Err(DeviceError::UnsupportedCommand(other.to_string())),
        }
    }
}
