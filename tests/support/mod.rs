// Shared helpers: one server per test binary plus small WebSocket client utilities.
#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

// Base URL published once the server thread has bound its port.
static SERVER_URL: OnceLock<String> = OnceLock::new();
static SERVER_READY: OnceLock<()> = OnceLock::new();

// Ensure the test server is running and return the shared base URL.
pub fn ensure_server() -> &'static str {
    SERVER_READY.get_or_init(|| {
        let published_url = Arc::new(OnceLock::<String>::new());
        let published_url_thread = Arc::clone(&published_url);
        // Spawn an OS thread so the server outlives individual `#[tokio::test]` runtimes.
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("test runtime");
            runtime.block_on(async move {
                // Ephemeral port avoids collisions with a locally running server.
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral test port");
                let addr = listener.local_addr().expect("get local addr");
                let _ = published_url_thread.set(format!("http://{}", addr));
                blueprint_server::run(listener).await.expect("server failed");
            });
        });
        wait_for_server_url_and_readiness(published_url);
    });

    SERVER_URL
        .get()
        .expect("server url should be initialized")
        .as_str()
}

fn wait_for_server_url_and_readiness(published_url: Arc<OnceLock<String>>) {
    let base_url = loop {
        if let Some(url) = published_url.get() {
            break url.clone();
        }
        std::thread::sleep(Duration::from_millis(10));
    };

    let _ = SERVER_URL.set(base_url.clone());

    let addr = base_url
        .strip_prefix("http://")
        .expect("base url should use http://");

    // Retry for a short period to avoid racing server bind/accept.
    for _ in 0..100 {
        if std::net::TcpStream::connect(addr).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    panic!("server did not become ready in time");
}

/// Creates a room over HTTP and returns its code.
pub async fn create_room(options: Value) -> String {
    let base_url = ensure_server();
    let res = reqwest::Client::new()
        .post(format!("{base_url}/api/rooms"))
        .json(&json!({ "options": options }))
        .send()
        .await
        .expect("create room request");
    assert_eq!(res.status(), reqwest::StatusCode::CREATED);
    let body: Value = res.json().await.expect("create room body");
    body["roomCode"]
        .as_str()
        .expect("roomCode in response")
        .to_string()
}

pub async fn send(ws: &mut Ws, msg_type: &str, data: Value) {
    let text = json!({ "type": msg_type, "data": data }).to_string();
    ws.send(Message::text(text)).await.expect("send ws message");
}

/// Reads until a message of `msg_type` whose data satisfies `pred` arrives.
pub async fn expect_message(ws: &mut Ws, msg_type: &str, pred: impl Fn(&Value) -> bool) -> Value {
    let wait = async {
        while let Some(frame) = ws.next().await {
            let frame = frame.expect("ws frame");
            let Ok(text) = frame.to_text() else {
                continue;
            };
            let Ok(value) = serde_json::from_str::<Value>(text) else {
                continue;
            };
            if value["type"] == msg_type && pred(&value["data"]) {
                return value["data"].clone();
            }
        }
        panic!("socket closed while waiting for {msg_type}");
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {msg_type}"))
}

/// Opens a socket, performs the join handshake and returns the assigned player id.
pub async fn join(room: &str, name: &str) -> (Ws, String) {
    let base_url = ensure_server();
    let ws_url = format!(
        "{}/ws?room={room}",
        base_url.replacen("http://", "ws://", 1)
    );
    let (mut ws, _) = connect_async(ws_url).await.expect("ws connect");
    send(&mut ws, "join", json!({ "name": name })).await;
    let welcome = expect_message(&mut ws, "welcome", |_| true).await;
    let player_id = welcome["playerId"]
        .as_str()
        .expect("playerId in welcome")
        .to_string();
    (ws, player_id)
}
