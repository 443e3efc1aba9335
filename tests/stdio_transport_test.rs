//! stdio adapter driven through in-memory pipes

mod common;

use common::*;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::timeout;
use toolgate::auth::RequestMetadata;
use toolgate::config::CredentialHeaders;
use toolgate::mcp::run_stdio;
use toolgate::mcp::stdio::{credentials_metadata, ENV_INTERNAL_KEY};

fn internal_metadata() -> RequestMetadata {
    credentials_metadata(&CredentialHeaders::default(), |name| {
        (name == ENV_INTERNAL_KEY).then(|| INTERNAL_SECRET.to_string())
    })
}

fn frame_line(frame: Value) -> String {
    format!("{}\n", frame)
}

#[tokio::test]
async fn test_session_until_eof() {
    let parked = Arc::new(ParkedHandler::default());
    let state = state_with(&gateway_config(), registry_with(parked.clone()));

    let (mut client_in, server_in) = tokio::io::duplex(16 * 1024);
    let (server_out, client_out) = tokio::io::duplex(16 * 1024);
    let session = tokio::spawn(run_stdio(
        state.clone(),
        internal_metadata(),
        BufReader::new(server_in),
        server_out,
    ));
    let mut replies = BufReader::new(client_out).lines();

    // A parked call must not hold up the next request
    let first = frame_line(json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": { "name": "park" } }));
    client_in.write_all(first.as_bytes()).await.unwrap();
    timeout(Duration::from_secs(5), parked.started.notified()).await.unwrap();

    let second = frame_line(json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "tools/call",
        "params": { "name": "echo", "arguments": { "message": "from stdio" } }
    }));
    client_in.write_all(second.as_bytes()).await.unwrap();

    let line = timeout(Duration::from_secs(5), replies.next_line())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let reply: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(reply["id"], 2);
    assert_eq!(reply["result"], json!({ "message": "from stdio" }));

    // EOF while the parked call is still running; the shutdown path cancels it
    drop(client_in);
    state.shutdown().drain(state.broadcaster(), Duration::from_millis(50)).await;

    timeout(Duration::from_secs(5), session).await.unwrap().unwrap().unwrap();
    assert!(eventually(|| parked.cancelled.load(Ordering::SeqCst)).await);
}

#[tokio::test]
async fn test_missing_credentials_fail_per_call() {
    let state = state_with(&gateway_config(), registry_with(Arc::default()));

    let input = concat!(
        r#"{"jsonrpc":"2.0","id":"a","method":"tools/call","params":{"name":"echo","arguments":{"message":"x"}}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":"b","method":"initialize"}"#,
        "\n",
    );
    let (server_out, client_out) = tokio::io::duplex(16 * 1024);
    run_stdio(state, RequestMetadata::new(), BufReader::new(input.as_bytes()), server_out)
        .await
        .unwrap();

    let mut lines = BufReader::new(client_out).lines();
    let mut replies = Vec::new();
    while let Some(line) = lines.next_line().await.unwrap() {
        replies.push(serde_json::from_str::<Value>(&line).unwrap());
    }
    assert_eq!(replies.len(), 2);

    let denied = replies.iter().find(|r| r["id"] == "a").unwrap();
    assert_eq!(denied["error"]["code"], -31994);
    assert_eq!(denied["error"]["data"]["kind"], "Unauthorized");

    let initialized = replies.iter().find(|r| r["id"] == "b").unwrap();
    assert_eq!(initialized["result"]["serverInfo"]["name"], "toolgate");
}
