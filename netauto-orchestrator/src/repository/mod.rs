//! Repository Module
//!
//! Collaborators the orchestrator talks to: language model providers,
//! network devices and the audit log.

pub mod audit;
pub mod chat;
pub mod device;
pub mod llm;

// Re-export for convenience
pub use audit::{AuditError, AuditStore, InMemoryAuditStore};
pub use chat::{ChatCompletionsProvider, ProviderKind, ProviderSettings};
pub use device::{DeviceDriver, DeviceError, InventoryDeviceDriver};
pub use llm::{LlmError, LlmProvider, ProviderRegistry};
