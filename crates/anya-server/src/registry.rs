//! Live connection tracking and best-effort fan-out.

use crate::error::TransportError;
use crate::protocol::Envelope;
use axum::extract::ws::Message;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// How long a broadcast waits on a single recipient's outbound queue.
const BROADCAST_SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle to one connected client.
///
/// Frames pushed through the handle are written to the socket by the
/// connection's writer task, so sending never touches the socket directly.
#[derive(Debug)]
pub struct ClientConnection {
    id: Uuid,
    remote_addr: SocketAddr,
    tx: mpsc::Sender<Message>,
    /// Set by any inbound frame, cleared by each heartbeat tick.
    pub(crate) is_alive: AtomicBool,
}

impl ClientConnection {
    pub fn new(remote_addr: SocketAddr, tx: mpsc::Sender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            remote_addr,
            tx,
            is_alive: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Queues a raw frame, waiting if the outbound buffer is full.
    pub async fn send(&self, message: Message) -> Result<(), TransportError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| TransportError::Closed(self.id))
    }

    pub async fn send_envelope(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let json = envelope.to_json()?;
        self.send(Message::Text(json.into())).await
    }

    /// Like [`send_envelope`](Self::send_envelope) but gives up after `timeout`.
    pub async fn send_envelope_timeout(
        &self,
        envelope: &Envelope,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let json = envelope.to_json()?;
        self.tx
            .send_timeout(Message::Text(json.into()), timeout)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => TransportError::Timeout(self.id),
                mpsc::error::SendTimeoutError::Closed(_) => TransportError::Closed(self.id),
            })
    }

    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    pub fn check_alive(&self) -> bool {
        self.is_alive.load(Ordering::Relaxed)
    }

    /// Queues an envelope only if the outbound buffer has room.
    pub fn try_send_envelope(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let json = envelope.to_json()?;
        self.tx
            .try_send(Message::Text(json.into()))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => TransportError::Full(self.id),
                mpsc::error::TrySendError::Closed(_) => TransportError::Closed(self.id),
            })
    }
}

/// Outcome of a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections the envelope was queued for.
    pub delivered: usize,
    /// Connections that failed and were unregistered.
    pub failed: Vec<Uuid>,
}

impl BroadcastReport {
    pub fn recipients(&self) -> usize {
        self.delivered + self.failed.len()
    }
}

/// The set of live connections, keyed by connection id.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<Uuid, Arc<ClientConnection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection. Returns `false` if it was already registered.
    pub async fn register(&self, connection: Arc<ClientConnection>) -> bool {
        let mut connections = self.connections.write().await;
        if connections.contains_key(&connection.id()) {
            return false;
        }
        connections.insert(connection.id(), connection);
        true
    }

    /// Removes a connection. Returns `false` if it was not registered.
    pub async fn unregister(&self, id: Uuid) -> bool {
        self.connections.write().await.remove(&id).is_some()
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Copies the current membership so callers can iterate without holding
    /// the lock.
    pub async fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Sends one envelope to every registered connection concurrently.
    ///
    /// Each recipient is independent: a closed or stalled connection counts
    /// as failed and is unregistered, and never delays delivery to the rest.
    pub async fn broadcast(&self, kind: &str, content: &str) -> BroadcastReport {
        let envelope = Envelope::new(kind, content);
        let recipients = self.snapshot().await;

        let sends = recipients.iter().map(|connection| {
            let envelope = &envelope;
            async move {
                let result = connection
                    .send_envelope_timeout(envelope, BROADCAST_SEND_TIMEOUT)
                    .await;
                (connection.id(), result)
            }
        });

        let mut report = BroadcastReport::default();
        for (id, result) in join_all(sends).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(connection_id = %id, "broadcast delivery failed: {}", e);
                    self.unregister(id).await;
                    report.failed.push(id);
                }
            }
        }

        tracing::debug!(
            kind,
            delivered = report.delivered,
            failed = report.failed.len(),
            "broadcast complete"
        );
        report
    }
}
