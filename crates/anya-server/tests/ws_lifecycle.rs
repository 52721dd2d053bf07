//! Registration, broadcast, heartbeat and shutdown behaviour.

mod common;

use common::{
    connect, recv_json, send_json, start_server, wait_for_connections, Options, TestServer,
};
use futures_util::StreamExt;
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::Message;

#[tokio::test]
async fn connections_register_and_unregister() {
    let server = start_server(Options::default()).await;
    let mut a = connect(&server).await;
    let _b = connect(&server).await;
    wait_for_connections(&server, 2).await;

    a.close(None).await.unwrap();
    wait_for_connections(&server, 1).await;
}

#[tokio::test]
async fn dropped_socket_is_unregistered() {
    let server = start_server(Options::default()).await;
    let ws = connect(&server).await;
    wait_for_connections(&server, 1).await;

    drop(ws);
    wait_for_connections(&server, 0).await;
}

#[tokio::test]
async fn broadcast_reaches_every_client() {
    let server = start_server(Options::default()).await;
    let mut a = connect(&server).await;
    let mut b = connect(&server).await;
    wait_for_connections(&server, 2).await;

    let report = server
        .server
        .registry()
        .broadcast("status", "model reloaded")
        .await;
    assert_eq!(report.delivered, 2);
    assert!(report.failed.is_empty());

    for ws in [&mut a, &mut b] {
        let envelope = recv_json(ws).await;
        assert_eq!(envelope["type"], "status");
        assert_eq!(envelope["content"], "model reloaded");
    }
}

#[tokio::test]
async fn silent_peer_is_reaped_by_heartbeat() {
    let server = start_server(Options {
        configure: |config| {
            config.transport.heartbeat_interval_secs = 1;
            config.transport.heartbeat_timeout_secs = 1;
        },
        ..Options::default()
    })
    .await;

    // Never polled after the welcome, so pings go unanswered.
    let _silent = connect(&server).await;
    wait_for_connections(&server, 1).await;

    for _ in 0..50 {
        if server.server.registry().is_empty().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("silent connection was never reaped");
}

#[tokio::test]
async fn flooding_client_stays_alive_during_slow_request() {
    let server = start_server(Options {
        configure: |config| {
            config.transport.heartbeat_interval_secs = 1;
            config.transport.heartbeat_timeout_secs = 1;
        },
        ..Options::default()
    })
    .await;
    let mut ws = connect(&server).await;
    wait_for_connections(&server, 1).await;

    send_json(&mut ws, json!({"type": "user_message", "content": "slow one"})).await;
    for _ in 0..20 {
        send_json(&mut ws, json!({"type": "ping"})).await;
    }

    // Keep reading so heartbeat pings are answered while inference sleeps.
    let mut kinds = Vec::new();
    loop {
        let envelope = recv_json(&mut ws).await;
        let kind = envelope["type"].as_str().unwrap().to_string();
        if kind == "error" {
            assert_eq!(
                envelope["content"],
                "Too many pending messages, request dropped"
            );
        }
        let done = kind == "ai_response_audio";
        kinds.push(kind);
        if done {
            break;
        }
    }

    assert!(kinds.iter().any(|k| k.as_str() == "typing"));
    let dropped = kinds.iter().filter(|k| k.as_str() == "error").count();
    assert!(dropped >= 4, "expected overflow errors, got {kinds:?}");
    assert_eq!(server.server.registry().len().await, 1);

    let queued = 20 - dropped;
    for _ in 0..queued {
        assert_eq!(recv_json(&mut ws).await["type"], "pong");
    }
}

#[tokio::test]
async fn stop_closes_clients_and_releases_the_port() {
    let fixture = start_server(Options::default()).await;
    let mut ws = connect(&fixture).await;
    wait_for_connections(&fixture, 1).await;

    let addr = fixture.addr;
    let TestServer {
        server, dir: _dir, ..
    } = fixture;
    tokio::time::timeout(Duration::from_secs(10), server.stop())
        .await
        .expect("stop did not finish")
        .unwrap();

    let close = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(frame))) => return frame,
                Some(Ok(_)) => continue,
                other => panic!("expected close frame, got {other:?}"),
            }
        }
    })
    .await
    .expect("no close frame");
    assert_eq!(close.unwrap().code, CloseCode::Away);

    TcpListener::bind(addr)
        .await
        .expect("listener should be released after stop");
}
