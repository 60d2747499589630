use crate::scheduler::SchedulerMetrics;
use crate::snapshot::Snapshot;
use crate::subscription::protocol::{ClientMessage, ErrorMessage, SnapshotMessage};
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Manages a single WebSocket connection with entity subscriptions
pub struct ConnectionManager {
    /// Entity ids this connection is subscribed to; empty means all
    subscriptions: HashSet<String>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            subscriptions: HashSet::new(),
        }
    }

    /// Handle WebSocket connection lifecycle.
    ///
    /// Sends `initial` right away, then one message per published snapshot.
    pub async fn handle(
        mut self,
        socket: WebSocket,
        initial: Arc<Snapshot>,
        mut snapshot_rx: broadcast::Receiver<Arc<Snapshot>>,
        metrics: SchedulerMetrics,
    ) {
        metrics.increment_ws_connection();
        info!("WebSocket connection established");

        let (mut sender, mut receiver) = socket.split();
        let mut latest = initial;

        if let Err(e) = self.send_snapshot(&mut sender, &latest).await {
            error!(error = %e, "Failed to send initial snapshot");
            metrics.decrement_ws_connection();
            return;
        }

        loop {
            tokio::select! {
                // Handle incoming client messages
                Some(msg) = receiver.next() => {
                    match msg {
                        Ok(Message::Text(text)) => {
                            if let Err(e) = self.handle_client_message(&mut sender, &text, &latest).await {
                                error!(error = %e, "Error handling client message");
                                break;
                            }
                        }
                        Ok(Message::Close(_)) => {
                            info!("WebSocket client disconnected");
                            break;
                        }
                        Ok(Message::Ping(data)) => {
                            if let Err(e) = sender.send(Message::Pong(data)).await {
                                error!(error = %e, "Failed to send pong");
                                break;
                            }
                        }
                        Ok(_) => {
                            // Ignore binary, pong messages
                        }
                        Err(e) => {
                            warn!(error = %e, "WebSocket error");
                            break;
                        }
                    }
                }

                // Forward snapshots from the scheduler
                result = snapshot_rx.recv() => {
                    match result {
                        Ok(snapshot) => {
                            latest = snapshot;
                            if let Err(e) = self.send_snapshot(&mut sender, &latest).await {
                                error!(error = %e, "Failed to send snapshot");
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // Next recv yields the oldest retained snapshot
                            warn!(skipped = skipped, "WebSocket lagged, skipped snapshots");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("Snapshot channel closed");
                            break;
                        }
                    }
                }

                else => {
                    break;
                }
            }
        }

        metrics.decrement_ws_connection();
        info!("WebSocket connection closed");
    }

    /// Handle client message (subscribe/unsubscribe).
    ///
    /// A subscription change re-sends the latest snapshot with the new filter.
    async fn handle_client_message(
        &mut self,
        sender: &mut SplitSink<WebSocket, Message>,
        text: &str,
        latest: &Snapshot,
    ) -> anyhow::Result<()> {
        let msg: ClientMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Invalid client message");
                return send_json(sender, &ErrorMessage::new(format!("invalid message: {}", e)))
                    .await;
            }
        };

        match msg {
            ClientMessage::Subscribe { entity_id } => {
                info!(entity_id = %entity_id, "Client subscribed to entity");
                self.subscriptions.insert(entity_id);
            }
            ClientMessage::Unsubscribe { entity_id } => {
                info!(entity_id = %entity_id, "Client unsubscribed from entity");
                self.subscriptions.remove(&entity_id);
            }
        }

        self.send_snapshot(sender, latest).await
    }

    /// Send snapshot to client, filtered to this connection's subscriptions
    async fn send_snapshot(
        &self,
        sender: &mut SplitSink<WebSocket, Message>,
        snapshot: &Snapshot,
    ) -> anyhow::Result<()> {
        let msg = SnapshotMessage::filtered(snapshot, &self.subscriptions);
        send_json(sender, &msg).await
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn send_json<T: Serialize>(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &T,
) -> anyhow::Result<()> {
    let json = serde_json::to_string(msg)?;
    sender.send(Message::Text(json)).await?;
    Ok(())
}
