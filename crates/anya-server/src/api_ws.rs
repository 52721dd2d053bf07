//! WebSocket endpoint and the per-connection lifecycle.
//!
//! Each accepted socket is split into a reader task, a writer task and a
//! heartbeat task around a single dispatch loop. The dispatch loop owns the
//! connection's [`ConversationSession`] and handles one envelope at a time,
//! so responses leave in request order while pongs and liveness keep
//! flowing during slow inference calls.

use crate::error::RequestError;
use crate::heartbeat::{run_heartbeat, HeartbeatResult};
use crate::protocol::Envelope;
use crate::registry::ClientConnection;
use crate::AppState;
use anya_conversation::ConversationSession;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        ConnectInfo, Extension, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{FutureExt, SinkExt, StreamExt};
use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Text frames read ahead of the dispatch loop. Frames beyond this are
/// answered with an `error` envelope and dropped so the reader keeps
/// observing liveness.
const INBOUND_BUFFER: usize = 16;

/// How long teardown waits for queued frames to reach the socket.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Why a connection's dispatch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    /// The peer closed, errored, or stopped answering heartbeats.
    Peer,
    /// The server is shutting down.
    Shutdown,
}

/// Handler for `GET /ws`.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    if state.shutdown.is_cancelled() {
        tracing::debug!(remote_addr = %addr, "rejecting websocket during shutdown");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let max_size = state.transport.max_message_size;
    let tracker = state.tracker.clone();
    ws.max_message_size(max_size)
        .max_frame_size(max_size)
        .on_failed_upgrade(move |e| {
            tracing::warn!(remote_addr = %addr, "websocket upgrade failed: {}", e);
        })
        .on_upgrade(move |socket| tracker.track_future(handle_socket(socket, state, addr)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, remote_addr: SocketAddr) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(state.transport.outbound_buffer.max(1));
    let connection = Arc::new(ClientConnection::new(remote_addr, tx));
    let connection_id = connection.id();
    // Cancelled when the peer goes away. Independent of the server shutdown
    // token so an in-flight request can finish during a graceful stop.
    let peer_gone = CancellationToken::new();

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() || closing {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let (inbound_tx, mut inbound_rx) = mpsc::channel::<String>(INBOUND_BUFFER);
    let reader = {
        let connection = connection.clone();
        let peer_gone = peer_gone.clone();
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let message = match frame {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::debug!(connection_id = %connection.id(), "websocket read error: {}", e);
                        break;
                    }
                };
                connection.mark_alive();
                match message {
                    Message::Text(text) => match inbound_tx.try_send(text.to_string()) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            tracing::warn!(
                                connection_id = %connection.id(),
                                "inbound queue full, dropping envelope"
                            );
                            let envelope =
                                Envelope::error(RequestError::Overloaded.client_message());
                            if let Err(e) = connection.try_send_envelope(&envelope) {
                                tracing::debug!(
                                    connection_id = %connection.id(),
                                    "could not report dropped envelope: {}",
                                    e
                                );
                            }
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    },
                    Message::Binary(_) => {
                        tracing::debug!(connection_id = %connection.id(), "ignoring binary frame");
                    }
                    Message::Close(_) => break,
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
            peer_gone.cancel();
        })
    };

    let heartbeat = {
        let connection = connection.clone();
        let peer_gone = peer_gone.clone();
        let interval = state.transport.heartbeat_interval();
        let timeout = state.transport.heartbeat_timeout();
        tokio::spawn(async move {
            let result = run_heartbeat(connection.clone(), interval, timeout, peer_gone.clone()).await;
            if result == HeartbeatResult::TimedOut {
                tracing::info!(connection_id = %connection.id(), "heartbeat timed out");
            }
            peer_gone.cancel();
        })
    };

    state.registry.register(connection.clone()).await;
    tracing::info!(
        connection_id = %connection_id,
        remote_addr = %remote_addr,
        "client connected"
    );

    let mut session = ConversationSession::new(state.personality.clone(), state.limits);
    let reason = if connection
        .send_envelope(&Envelope::welcome(&state.personality))
        .await
        .is_err()
    {
        CloseReason::Peer
    } else {
        dispatch_loop(&state, &connection, &mut session, &mut inbound_rx, &peer_gone).await
    };

    if reason == CloseReason::Shutdown {
        let frame = CloseFrame {
            code: close_code::AWAY,
            reason: "server shutting down".into(),
        };
        let _ = connection.send(Message::Close(Some(frame))).await;
    }

    state.registry.unregister(connection_id).await;
    peer_gone.cancel();
    reader.abort();
    let _ = heartbeat.await;
    drop(connection);
    if tokio::time::timeout(WRITER_FLUSH_TIMEOUT, writer).await.is_err() {
        tracing::debug!(connection_id = %connection_id, "writer did not flush before teardown");
    }

    tracing::info!(
        connection_id = %connection_id,
        remote_addr = %remote_addr,
        messages = session.len(),
        ?reason,
        "client disconnected"
    );
}

async fn dispatch_loop(
    state: &AppState,
    connection: &ClientConnection,
    session: &mut ConversationSession,
    inbound: &mut mpsc::Receiver<String>,
    peer_gone: &CancellationToken,
) -> CloseReason {
    loop {
        let raw = tokio::select! {
            biased;
            () = state.shutdown.cancelled() => return CloseReason::Shutdown,
            () = peer_gone.cancelled() => return CloseReason::Peer,
            next = inbound.recv() => match next {
                Some(raw) => raw,
                None => return CloseReason::Peer,
            },
        };

        let dispatch = AssertUnwindSafe(state.router.dispatch(session, connection, &raw));
        tokio::select! {
            biased;
            () = peer_gone.cancelled() => return CloseReason::Peer,
            outcome = dispatch.catch_unwind() => {
                if let Err(panic) = outcome {
                    let detail = panic_detail(panic.as_ref());
                    tracing::error!(
                        connection_id = %connection.id(),
                        "message handler panicked: {}",
                        detail
                    );
                    let envelope = Envelope::error(RequestError::Internal(detail).client_message());
                    if connection.send_envelope(&envelope).await.is_err() {
                        return CloseReason::Peer;
                    }
                }
            }
        }
    }
}

fn panic_detail(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
