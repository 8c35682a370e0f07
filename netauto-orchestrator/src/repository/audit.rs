//! Audit Repository
//!
//! Persistence of operation logs.

use async_trait::async_trait;
use netauto_core::domain::audit::OperationLog;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Oldest entries are dropped beyond this many
const MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit store unavailable: {0}")]
    Unavailable(String),
}

/// Sink for operation logs
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn record(&self, entry: OperationLog) -> Result<(), AuditError>;

    /// All entries, oldest first
    async fn list(&self) -> Result<Vec<OperationLog>, AuditError>;
}

/// Bounded in-memory audit log
#[derive(Clone, Default)]
pub struct InMemoryAuditStore {
    entries: Arc<Mutex<Vec<OperationLog>>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, Vec<OperationLog>>, AuditError> {
        self.entries
            .lock()
            .map_err(|_| AuditError::Unavailable("audit log lock poisoned".to_string()))
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn record(&self, entry: OperationLog) -> Result<(), AuditError> {
        let mut entries = self.entries()?;
        if entries.len() >= MAX_ENTRIES {
            entries.remove(0);
        }
        entries.push(entry);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<OperationLog>, AuditError> {
        Ok(self.entries()?.clone())
    }
}
