//! WebSocket Event Broadcasting
//!
//! Clients connect to `/ws` and receive every [`WsEvent`] published after
//! they connect. Events fan out through a `tokio::sync::broadcast` channel;
//! a client that falls behind gets an `error` frame and skips ahead.
//! Incoming text is logged and otherwise ignored.

use crate::events::WsEvent;
use crate::telemetry::metrics;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
    Json,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use opsflow_core::Timestamp;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub client_id: Option<String>,
    pub connected_at: Timestamp,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub total_connections: usize,
    pub connections: Vec<ConnectionInfo>,
}

#[derive(Clone)]
pub struct WsState {
    tx: broadcast::Sender<WsEvent>,
    connections: Arc<DashMap<Uuid, ConnectionInfo>>,
}

impl WsState {
    /// `capacity` events are buffered per client before it lags.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            connections: Arc::new(DashMap::new()),
        }
    }

    /// Publish to every connected client. Dropped when nobody listens.
    pub fn broadcast(&self, event: WsEvent) {
        let event_type = event.event_type();
        match self.tx.send(event) {
            Ok(receivers) => debug!(event_type, receivers, "Broadcast event"),
            Err(_) => debug!(event_type, "No receivers for event"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsEvent> {
        self.tx.subscribe()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            total_connections: self.connections.len(),
            connections: self.connections.iter().map(|e| e.value().clone()).collect(),
        }
    }

    fn register(&self, client_id: Option<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.connections.insert(
            id,
            ConnectionInfo {
                client_id,
                connected_at: chrono::Utc::now(),
            },
        );
        if let Some(m) = metrics() {
            m.ws_connected();
        }
        info!(total = self.connections.len(), "WebSocket connected");
        id
    }

    fn unregister(&self, id: Uuid) {
        if self.connections.remove(&id).is_some() {
            if let Some(m) = metrics() {
                m.ws_disconnected();
            }
            info!(total = self.connections.len(), "WebSocket disconnected");
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    pub client_id: Option<String>,
}

/// GET /ws
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsState>>,
    Query(params): Query<WsParams>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.client_id))
}

/// GET /ws/status
pub async fn ws_status(State(state): State<Arc<WsState>>) -> Json<ConnectionStatus> {
    Json(state.status())
}

async fn handle_socket(socket: WebSocket, state: Arc<WsState>, client_id: Option<String>) {
    let connection_id = state.register(client_id);
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.subscribe();

    if let Err(e) = send_event(&mut sender, WsEvent::Connected { connection_id }).await {
        error!(%connection_id, error = %e, "Failed to send Connected event");
        state.unregister(connection_id);
        return;
    }

    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(Message::Text(text)) => {
                    debug!(%connection_id, text = %text, "Received message");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(%connection_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            result = rx.recv() => match result {
                Ok(event) => {
                    if let Err(e) = send_event(&mut sender, event).await {
                        error!(%connection_id, error = %e, "Failed to send event, closing connection");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(%connection_id, skipped, "Client lagged, some events were dropped");
                    let lagged = WsEvent::Error {
                        message: format!("Lagged: {} events dropped", skipped),
                    };
                    if send_event(&mut sender, lagged).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = &mut recv_task => break,
        }
    }

    recv_task.abort();
    state.unregister(connection_id);
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: WsEvent,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(&event).map_err(|e| {
        error!(error = %e, "Failed to serialize event");
        axum::Error::new(e)
    })?;
    sender.send(Message::Text(json)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_no_receivers() {
        let state = WsState::new(16);
        state.broadcast(WsEvent::customer_deleted(Uuid::new_v4()));
    }

    #[test]
    fn test_broadcast_with_receiver() {
        let state = WsState::new(16);
        let mut rx = state.subscribe();
        let event = WsEvent::customer_deleted(Uuid::new_v4());
        state.broadcast(event.clone());
        assert_eq!(rx.try_recv().unwrap(), event);
    }

    #[test]
    fn test_register_and_status() {
        let state = WsState::new(16);
        let a = state.register(Some("dashboard".to_string()));
        let _b = state.register(None);
        assert_eq!(state.connection_count(), 2);

        let status = state.status();
        assert_eq!(status.total_connections, 2);
        assert!(status
            .connections
            .iter()
            .any(|c| c.client_id.as_deref() == Some("dashboard")));

        state.unregister(a);
        state.unregister(a);
        assert_eq!(state.connection_count(), 1);
    }
}
