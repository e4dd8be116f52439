//! WebSocket Event Types
//!
//! Mutations broadcast one of these to every connected client. The wire form
//! is `{"type": "<snake_case name>", "payload": {...}}`.

use opsflow_core::{Customer, CustomerAction, CustomerId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedCustomer {
    pub id: CustomerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WsEvent {
    // ========================================================================
    // CUSTOMER EVENTS
    // ========================================================================
    CustomerCreated(Customer),

    CustomerUpdated(Customer),

    CustomerDeleted(DeletedCustomer),

    // ========================================================================
    // ACTION EVENTS
    // ========================================================================
    ActionCreated(CustomerAction),

    // ========================================================================
    // CONNECTION EVENTS
    // ========================================================================
    /// First frame on a new connection.
    Connected { connection_id: Uuid },

    /// Sent when the client fell behind and events were dropped.
    Error { message: String },
}

impl WsEvent {
    pub fn customer_deleted(id: CustomerId) -> Self {
        WsEvent::CustomerDeleted(DeletedCustomer { id })
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            WsEvent::CustomerCreated(_) => "customer_created",
            WsEvent::CustomerUpdated(_) => "customer_updated",
            WsEvent::CustomerDeleted(_) => "customer_deleted",
            WsEvent::ActionCreated(_) => "action_created",
            WsEvent::Connected { .. } => "connected",
            WsEvent::Error { .. } => "error",
        }
    }
}
