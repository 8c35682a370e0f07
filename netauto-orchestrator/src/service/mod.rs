//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services coordinate the collaborators in `repository` and own the
//! in-memory state shared between requests.

pub mod command;
pub mod notification;
pub mod pipeline;
pub mod registry;

#[cfg(test)]
pub mod test_support;

// Re-export for convenience
pub use command::{CommandError, CommandExecutor};
pub use notification::{ChannelConnection, ClientConnection, HubError, NotificationHub};
pub use pipeline::{PIPELINE_OPERATION_TYPE, PipelineError, PipelineOrchestrator};
pub use registry::{CancelOutcome, PipelineRegistry};
