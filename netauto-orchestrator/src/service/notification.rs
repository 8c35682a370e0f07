//! Notification Hub
//!
//! Tracks live client connections and which operation types each client
//! subscribed to, and delivers event envelopes to them.
//!
//! A connection whose write fails is considered dead and torn down on the
//! spot, so one bad socket never stalls a broadcast.

use async_trait::async_trait;
use netauto_core::domain::event::{Envelope, InboundMessage, OperationType};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("Connection closed")]
    Closed,

    #[error("Outbound queue is full")]
    Backlogged,

    #[error("Failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Client {0} is not connected")]
    NotConnected(String),
}

/// Transport to one client
#[async_trait]
pub trait ClientConnection: Send + Sync {
    async fn send_text(&self, text: String) -> Result<(), HubError>;
}

/// Connection backed by a bounded channel drained by the socket task.
///
/// A peer that stops reading fills the queue; the next send then fails and
/// the hub tears the connection down.
pub struct ChannelConnection {
    tx: mpsc::Sender<String>,
}

impl ChannelConnection {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ClientConnection for ChannelConnection {
    async fn send_text(&self, text: String) -> Result<(), HubError> {
        self.tx.try_send(text).map_err(|e| match e {
            TrySendError::Full(_) => HubError::Backlogged,
            TrySendError::Closed(_) => HubError::Closed,
        })
    }
}

struct HubState {
    connections: HashMap<String, Arc<dyn ClientConnection>>,
    subscriptions: HashMap<OperationType, HashSet<String>>,
}

impl Default for HubState {
    fn default() -> Self {
        Self {
            connections: HashMap::new(),
            subscriptions: OperationType::ALL
                .into_iter()
                .map(|op| (op, HashSet::new()))
                .collect(),
        }
    }
}

impl HubState {
    fn remove(&mut self, client_id: &str) -> bool {
        let existed = self.connections.remove(client_id).is_some();
        for subscribers in self.subscriptions.values_mut() {
            subscribers.remove(client_id);
        }
        existed
    }
}

#[derive(Default)]
pub struct NotificationHub {
    state: Mutex<HubState>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Connection Management
    // =========================================================================

    /// Registers a connection and confirms it to the client.
    ///
    /// A previous connection under the same id is replaced along with its
    /// subscriptions.
    pub async fn connect(
        &self,
        connection: Arc<dyn ClientConnection>,
        client_id: &str,
        operation_type: Option<OperationType>,
    ) {
        {
            let mut state = self.state.lock().unwrap();
            if state.remove(client_id) {
                tracing::debug!("Replacing connection for client {}", client_id);
            }
            state.connections.insert(client_id.to_string(), connection);
            if let Some(op) = operation_type {
                state
                    .subscriptions
                    .entry(op)
                    .or_default()
                    .insert(client_id.to_string());
            }
        }

        tracing::info!(
            "Client {} connected{}",
            client_id,
            operation_type
                .map(|op| format!(" for {}", op))
                .unwrap_or_default()
        );

        let _ = self
            .send_personal(&Envelope::connection_confirmed(client_id), client_id)
            .await;
    }

    /// Removes a client from the connection table and every subscriber set.
    ///
    /// Returns whether the client was connected.
    pub fn disconnect(&self, client_id: &str) -> bool {
        let existed = self.state.lock().unwrap().remove(client_id);
        if existed {
            tracing::info!("Client {} disconnected", client_id);
        }
        existed
    }

    /// Adds a connected client to an operation type's subscribers
    pub fn subscribe(&self, client_id: &str, operation_type: OperationType) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.connections.contains_key(client_id) {
            return false;
        }
        state
            .subscriptions
            .entry(operation_type)
            .or_default()
            .insert(client_id.to_string());
        true
    }

    pub fn is_connected(&self, client_id: &str) -> bool {
        self.state.lock().unwrap().connections.contains_key(client_id)
    }

    pub fn connected_clients(&self) -> Vec<String> {
        let mut clients: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .connections
            .keys()
            .cloned()
            .collect();
        clients.sort();
        clients
    }

    pub fn subscribers(&self, operation_type: OperationType) -> Vec<String> {
        let mut clients: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .subscriptions
            .get(&operation_type)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        clients.sort();
        clients
    }

    /// Tears down `connection` if it is still the one registered for the client
    fn evict(&self, client_id: &str, connection: &Arc<dyn ClientConnection>) {
        let mut state = self.state.lock().unwrap();
        let current = state
            .connections
            .get(client_id)
            .is_some_and(|registered| {
                std::ptr::addr_eq(Arc::as_ptr(registered), Arc::as_ptr(connection))
            });
        if current {
            state.remove(client_id);
            tracing::info!("Client {} removed after failed send", client_id);
        }
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    /// Writes one envelope to one client
    pub async fn send_personal(
        &self,
        envelope: &Envelope,
        client_id: &str,
    ) -> Result<(), HubError> {
        let connection = self
            .state
            .lock()
            .unwrap()
            .connections
            .get(client_id)
            .cloned()
            .ok_or_else(|| HubError::NotConnected(client_id.to_string()))?;

        let text = serde_json::to_string(envelope)?;
        if let Err(e) = connection.send_text(text).await {
            tracing::error!("Failed to send message to client {}: {}", client_id, e);
            self.evict(client_id, &connection);
            return Err(e);
        }
        Ok(())
    }

    /// Delivers to every subscriber of `operation_type`; returns the number reached
    pub async fn broadcast_to_operation(
        &self,
        envelope: &Envelope,
        operation_type: OperationType,
    ) -> usize {
        let targets: Vec<(String, Arc<dyn ClientConnection>)> = {
            let state = self.state.lock().unwrap();
            state
                .subscriptions
                .get(&operation_type)
                .into_iter()
                .flatten()
                .filter_map(|id| {
                    state
                        .connections
                        .get(id)
                        .map(|conn| (id.clone(), conn.clone()))
                })
                .collect()
        };
        self.deliver(envelope, targets).await
    }

    /// Delivers to every connected client; returns the number reached
    pub async fn broadcast_all(&self, envelope: &Envelope) -> usize {
        let targets: Vec<(String, Arc<dyn ClientConnection>)> = self
            .state
            .lock()
            .unwrap()
            .connections
            .iter()
            .map(|(id, conn)| (id.clone(), conn.clone()))
            .collect();
        self.deliver(envelope, targets).await
    }

    async fn deliver(
        &self,
        envelope: &Envelope,
        targets: Vec<(String, Arc<dyn ClientConnection>)>,
    ) -> usize {
        if targets.is_empty() {
            return 0;
        }
        let text = match serde_json::to_string(envelope) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Failed to encode envelope: {}", e);
                return 0;
            }
        };

        let mut delivered = 0;
        for (client_id, connection) in targets {
            match connection.send_text(text.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::error!("Failed to send message to client {}: {}", client_id, e);
                    self.evict(&client_id, &connection);
                }
            }
        }
        delivered
    }

    // =========================================================================
    // Convenience Emitters
    // =========================================================================

    pub async fn send_operation_update(
        &self,
        operation_id: &str,
        operation_type: OperationType,
        status: &str,
        progress: u8,
        message: impl Into<String>,
    ) -> usize {
        let envelope = Envelope::operation_update(operation_id, operation_type, status)
            .with_progress(progress)
            .with_message(message);
        self.broadcast_to_operation(&envelope, operation_type).await
    }

    pub async fn send_device_status(
        &self,
        device_id: &str,
        device_name: &str,
        status: &str,
        details: JsonValue,
    ) -> usize {
        let envelope = Envelope::device_status(device_id, device_name, status, details);
        self.broadcast_to_operation(&envelope, OperationType::CommandExecution).await
    }

    pub async fn send_command_result(
        &self,
        device_id: &str,
        command: &str,
        result: &str,
        success: bool,
        execution_time_seconds: Option<f64>,
    ) -> usize {
        let envelope =
            Envelope::command_result(device_id, command, result, success, execution_time_seconds);
        self.broadcast_to_operation(&envelope, OperationType::CommandExecution).await
    }

    // =========================================================================
    // Inbound Messages
    // =========================================================================

    /// Answers a text frame received from a client.
    ///
    /// Malformed frames and unknown operation types are ignored.
    pub async fn handle_inbound(&self, client_id: &str, text: &str) {
        let message: InboundMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!("Ignoring message from {}: {}", client_id, e);
                return;
            }
        };

        match message {
            InboundMessage::Ping => {
                let _ = self.send_personal(&Envelope::pong(), client_id).await;
            }
            InboundMessage::Subscribe { operation_type } => {
                let Some(op) = operation_type.and_then(|raw| raw.parse::<OperationType>().ok())
                else {
                    tracing::debug!(
                        "Ignoring subscribe without a known operation type from {}",
                        client_id
                    );
                    return;
                };
                if self.subscribe(client_id, op) {
                    let _ = self.send_personal(&Envelope::subscribed(op), client_id).await;
                }
            }
        }
    }
}
