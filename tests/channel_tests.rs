//! Integration tests for the kernel channel and port probing
//!
//! A local tokio-tungstenite server plays the kernel gateway's WebSocket
//! side; a raw TCP listener plays the gateway's HTTP API for the port probe
//! and kernel registration.

use std::net::SocketAddr;
use std::time::Duration;

use codebox::channel::{register_kernel, ExecuteRequest, GatewayChannel, KernelChannel, MessageKind};
use codebox::classifier::ResultClassifier;
use codebox::kernel::{HttpPortProbe, PortAllocator, PortProbe};
use codebox::{ChannelError, ExecutionOutcome, SandboxError};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

fn frame(msg_type: &str, parent: &str, content: Value) -> Message {
    Message::Text(
        json!({
            "header": { "msg_id": "server-side", "msg_type": msg_type },
            "parent_header": { "msg_id": parent },
            "metadata": {},
            "content": content,
        })
        .to_string(),
    )
}

/// Accept one WebSocket client, answer its first request, then close
async fn fake_kernel(reply: fn(&str) -> Vec<Message>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let request = loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => break text,
                Some(Ok(_)) => continue,
                _ => return,
            }
        };
        let request: Value = serde_json::from_str(&request).unwrap();
        assert_eq!(request["header"]["msg_type"], "execute_request");
        assert_eq!(request["channel"], "shell");
        assert_eq!(request["content"]["stop_on_error"], true);

        let msg_id = request["header"]["msg_id"].as_str().unwrap().to_string();
        for message in reply(&msg_id) {
            ws.send(message).await.unwrap();
        }
        let _ = ws.close(None).await;
    });

    addr
}

async fn open(addr: SocketAddr) -> GatewayChannel {
    GatewayChannel::open(&format!("ws://{}", addr), "kernel-1", Some(Duration::from_secs(5)))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_request_reply_then_close() {
    let addr = fake_kernel(|msg_id| {
        vec![
            frame("status", msg_id, json!({ "execution_state": "busy" })),
            frame("execute_input", msg_id, json!({ "code": "1+1" })),
            frame("execute_result", msg_id, json!({ "data": { "text/plain": "2" } })),
            frame("status", msg_id, json!({ "execution_state": "idle" })),
        ]
    })
    .await;
    let mut channel = open(addr).await;
    assert_eq!(channel.kernel_id(), "kernel-1");

    let request = ExecuteRequest::new("1+1");
    let mut classifier = ResultClassifier::new(request.msg_id());
    channel.send(&request).await.unwrap();

    let outcome = loop {
        let message = channel.receive().await.unwrap();
        if let Some(outcome) = classifier.observe(message) {
            break outcome;
        }
    };
    assert_eq!(outcome, ExecutionOutcome::text("2"));

    assert!(matches!(channel.receive().await, Err(ChannelError::Closed)));
    channel.close().await.unwrap();
}

#[tokio::test]
async fn test_unknown_message_types_decode_as_other() {
    let addr =
        fake_kernel(|msg_id| vec![frame("execute_reply", msg_id, json!({ "status": "ok" }))]).await;
    let mut channel = open(addr).await;

    channel.send(&ExecuteRequest::new("pass")).await.unwrap();
    let message = channel.receive().await.unwrap();
    assert_eq!(message.kind, MessageKind::Other("execute_reply".into()));
}

#[tokio::test]
async fn test_malformed_frame_is_decode_error() {
    let addr = fake_kernel(|_| vec![Message::Text("{\"no_header\": true}".into())]).await;
    let mut channel = open(addr).await;

    channel.send(&ExecuteRequest::new("pass")).await.unwrap();
    assert!(matches!(channel.receive().await, Err(ChannelError::Decode(_))));
}

#[tokio::test]
async fn test_receive_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let url = format!("ws://{}", addr);
    let mut channel = GatewayChannel::open(&url, "kernel-1", Some(Duration::from_millis(100)))
        .await
        .unwrap();
    assert!(matches!(channel.receive().await, Err(ChannelError::Timeout(_))));
}

#[tokio::test]
async fn test_connect_refused_is_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = GatewayChannel::open(&format!("ws://{}", addr), "kernel-1", None)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ChannelError::Connect { .. }));
}

/// Answer every HTTP connection with a fixed status line and body
async fn http_responder(status: &'static str, body: &'static str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
        }
    });
    port
}

#[tokio::test]
async fn test_http_probe_sees_serving_port() {
    let port = http_responder("200 OK", "ok").await;

    let probe = HttpPortProbe::new(Duration::from_secs(2));
    assert!(probe.is_serving(port).await);
}

#[tokio::test]
async fn test_http_probe_counts_any_status_as_serving() {
    // A kernel gateway answers 404 on its root path
    let port = http_responder("404 Not Found", "").await;

    let probe = HttpPortProbe::new(Duration::from_secs(2));
    assert!(probe.is_serving(port).await);

    let allocator = PortAllocator::new(probe);
    assert_ne!(allocator.allocate(port).await.unwrap(), port);
}

#[tokio::test]
async fn test_http_probe_counts_non_http_listener_as_serving() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let _ = stream.write_all(b"SSH-2.0-OpenSSH_9.6\r\n").await;
        }
    });

    let probe = HttpPortProbe::new(Duration::from_millis(500));
    assert!(probe.is_serving(port).await);
}

#[tokio::test]
async fn test_http_probe_free_port() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let probe = HttpPortProbe::new(Duration::from_secs(2));
    assert!(!probe.is_serving(port).await);
}

#[tokio::test]
async fn test_register_kernel_returns_id() {
    let port = http_responder("201 Created", r#"{"id":"k1","name":"python3"}"#).await;

    let kernel_id = register_kernel(&reqwest::Client::new(), port).await.unwrap();
    assert_eq!(kernel_id, "k1");
}

#[tokio::test]
async fn test_register_kernel_without_id_is_registration_error() {
    let port = http_responder("201 Created", "{}").await;

    let err = register_kernel(&reqwest::Client::new(), port).await.unwrap_err();
    assert!(matches!(err, SandboxError::KernelRegistration(_)));
}

#[tokio::test]
async fn test_register_kernel_server_error_is_http_error() {
    let port = http_responder("500 Internal Server Error", "{}").await;

    let err = register_kernel(&reqwest::Client::new(), port).await.unwrap_err();
    assert!(matches!(err, SandboxError::Http(_)));
}
