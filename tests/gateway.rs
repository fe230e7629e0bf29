//! End-to-end checks against a gateway bound to an ephemeral port.

use std::net::SocketAddr;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use webssh_gateway::{routes, AppState, Config, LogControl};

async fn spawn_gateway() -> SocketAddr {
    let mut config = Config::default();
    config.ssh.default_host = "127.0.0.1".to_string();
    config.ssh.connect_timeout_secs = 2;
    let state = AppState::new(config, LogControl::detached("info"));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, routes::router(state)).await.unwrap();
    });
    addr
}

fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn missing_parameters_are_rejected_before_upgrade() {
    let addr = spawn_gateway().await;
    let url = format!("ws://{addr}/api/v1/webssh?deviceId=d1&user=alice&port=22");

    match tokio_tungstenite::connect_async(url).await {
        Err(WsError::Http(resp)) => assert_eq!(resp.status(), 400),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("upgrade should have been refused"),
    }
}

#[tokio::test]
async fn unreachable_host_closes_with_internal_error() {
    let addr = spawn_gateway().await;
    let port = closed_port();
    let url = format!("ws://{addr}/api/v1/webssh?deviceId=d1&user=alice&pwd=secret&port={port}");

    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    let close = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(msg) = ws.next().await {
            match msg.unwrap() {
                Message::Close(frame) => return frame,
                Message::Binary(data) => panic!("unexpected output frame: {data:?}"),
                _ => {}
            }
        }
        None
    })
    .await
    .unwrap()
    .expect("close frame");

    assert_eq!(close.code, CloseCode::Error);
    assert_eq!(close.reason.as_str(), "dial_error");

    let health = http_get(addr, "/api/health").await;
    assert!(health.contains("\"tunnels\":0"), "{health}");
}

#[tokio::test]
async fn log_level_endpoints() {
    let addr = spawn_gateway().await;

    let resp = http_get(addr, "/api/log/debug").await;
    assert!(resp.starts_with("HTTP/1.1 200"), "{resp}");
    let resp = http_get(addr, "/api/log/level").await;
    assert!(resp.contains("\"level\":\"debug\""), "{resp}");

    let resp = http_get(addr, "/api/log/info").await;
    assert!(resp.starts_with("HTTP/1.1 200"), "{resp}");
    let resp = http_get(addr, "/api/log/level").await;
    assert!(resp.contains("\"level\":\"info\""), "{resp}");
}
