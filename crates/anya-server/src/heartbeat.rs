//! Heartbeat ping/pong liveness monitoring.

use crate::registry::ClientConnection;
use axum::extract::ws::Message;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client stopped responding within the timeout window.
    TimedOut,
    /// The outbound queue is gone; the connection is already closing.
    Disconnected,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Pings a connection every `interval` until it dies or `cancel` fires.
///
/// Any inbound frame marks the connection alive. Each ping that starts a
/// liveness check clears the flag and arms a deadline `timeout` later; a
/// deadline that finds the flag still cleared ends the loop with
/// [`HeartbeatResult::TimedOut`]. Pings sent while a check is pending do not
/// move its deadline.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    let mut deadline: Option<Instant> = None;

    loop {
        let pending_check = async move {
            match deadline {
                Some(at) => time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
            () = pending_check => {
                if !connection.check_alive() {
                    return HeartbeatResult::TimedOut;
                }
                deadline = None;
            }
            _ = ticker.tick() => {
                if deadline.is_none() {
                    connection.is_alive.store(false, Ordering::Relaxed);
                    deadline = Some(Instant::now() + timeout);
                }
                if connection.send(Message::Ping(Default::default())).await.is_err() {
                    return HeartbeatResult::Disconnected;
                }
            }
        }
    }
}
