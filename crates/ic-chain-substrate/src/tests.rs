use super::*;
use axum::{Json, Router, routing::post};
use futures_util::{SinkExt, StreamExt};
use ic_api_types::ContractAddress;
use ic_codec::{CallSelector, decode_counter};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

fn endpoint(url: String) -> Endpoint {
    Endpoint::new(url, Duration::from_secs(3))
}

fn get_call() -> ContractCall {
    ContractCall::new(ContractAddress("5Grw".to_owned()), CallSelector::Get)
}

fn signed_increment() -> SignedCall {
    SignedCall {
        call: ContractCall::new(ContractAddress("5Grw".to_owned()), CallSelector::Increment),
        signer: AccountAddress("0xabc".to_owned()),
        signature: vec![1, 2, 3],
    }
}

fn node_reply(request: &Value) -> Vec<Value> {
    let id = request["id"].clone();
    match request["method"].as_str() {
        Some("rpc_methods") => vec![json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "version": 1, "methods": ["system_health", "contracts_call", "author_submitExtrinsic"] }
        })],
        Some("contracts_call") => {
            assert_eq!(request["params"][0]["inputData"], "0x2f865bd9");
            assert_eq!(request["params"][0]["value"], 0);
            assert_eq!(request["params"][0]["gasLimit"]["refTime"], 1_000_000_000u64);
            assert!(request["params"][0]["storageDepositLimit"].is_null());
            vec![
                json!({ "jsonrpc": "2.0", "method": "chain_newHead", "params": { "subscription": "x" } }),
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": { "gasConsumed": 10, "result": { "Ok": { "flags": 0, "data": "0x07000000" } } }
                }),
            ]
        }
        Some("author_submitExtrinsic") => vec![json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": 1010, "message": "Invalid Transaction" }
        })],
        _ => vec![json!({ "jsonrpc": "2.0", "id": id, "error": { "code": -32601, "message": "Method not found" } })],
    }
}

async fn spawn_ws_node(close_after: Option<usize>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
        let mut served = 0;
        while let Some(Ok(frame)) = ws.next().await {
            let Message::Text(text) = frame else { continue };
            if close_after == Some(served) {
                let _ = ws.close(None).await;
                return;
            }
            let request: Value = serde_json::from_str(&text).unwrap();
            for reply in node_reply(&request) {
                ws.send(Message::Text(reply.to_string())).await.unwrap();
            }
            served += 1;
        }
    });

    addr
}

async fn spawn_http_node(reply: Value) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new().route(
        "/",
        post(move |Json(request): Json<Value>| {
            let reply = reply.clone();
            async move {
                let mut body = match request["method"].as_str() {
                    Some("rpc_methods") => json!({ "result": { "methods": ["system_health"] } }),
                    _ => reply,
                };
                body["jsonrpc"] = json!("2.0");
                body["id"] = request["id"].clone();
                Json(body)
            }
        }),
    );

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

#[test]
fn capabilities_follow_rpc_methods() {
    assert!(rpc::capabilities(&json!({ "methods": ["contracts_call"] })).contracts_enabled);
    assert!(!rpc::capabilities(&json!({ "methods": ["system_health"] })).contracts_enabled);
    assert!(!rpc::capabilities(&json!(null)).contracts_enabled);
}

#[test]
fn exec_outcome_reads_flags_and_errors() {
    let ok = json!({ "result": { "Ok": { "flags": 0, "data": "0x01000000" } } });
    assert_eq!(
        rpc::exec_outcome(&ok),
        Ok(rpc::ExecOutcome::Ok {
            reverted: false,
            data: "0x01000000".to_owned()
        })
    );

    let reverted = json!({ "result": { "Ok": { "flags": { "bits": 1 }, "data": "0x" } } });
    assert!(matches!(
        rpc::exec_outcome(&reverted),
        Ok(rpc::ExecOutcome::Ok { reverted: true, .. })
    ));

    let err = json!({ "result": { "Err": { "Module": { "index": 8, "error": "0x05" } } } });
    assert!(matches!(rpc::exec_outcome(&err), Ok(rpc::ExecOutcome::Err(_))));
    assert!(rpc::exec_outcome(&json!({})).is_err());
}

#[test]
fn response_ids_match_numbers_and_strings() {
    let numeric: rpc::RpcResponse = serde_json::from_value(json!({ "id": 4, "result": 1 })).unwrap();
    let text: rpc::RpcResponse = serde_json::from_value(json!({ "id": "4", "result": 1 })).unwrap();
    let notification: rpc::RpcResponse = serde_json::from_value(json!({ "method": "x" })).unwrap();

    assert!(numeric.id_matches(4));
    assert!(text.id_matches(4));
    assert!(!notification.id_matches(4));
}

#[tokio::test]
async fn unsupported_scheme_is_refused() {
    let result = RpcConnector::new().connect(&endpoint("ftp://node".to_owned())).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn websocket_connection_reads_and_submits() {
    let addr = spawn_ws_node(None).await;
    let connection = RpcConnector::new()
        .connect(&endpoint(format!("ws://{addr}")))
        .await
        .expect("ws connect");

    assert_eq!(connection.state(), ConnectionState::Connecting);
    let capabilities = connection.ready().await.expect("ready");
    assert!(capabilities.contracts_enabled);
    assert_eq!(connection.state(), ConnectionState::Live);

    let data = connection
        .call(&AccountAddress("5Grw".to_owned()), &get_call())
        .await
        .expect("call");
    assert_eq!(decode_counter(&data), Ok(7));

    let err = connection.submit(&signed_increment()).await.unwrap_err();
    assert!(matches!(err, ClientError::TransactionRejected(ref msg) if msg.contains("Invalid Transaction")));
    assert_eq!(connection.state(), ConnectionState::Live);

    connection.close().await;
    assert_eq!(connection.state(), ConnectionState::Closed);
    let err = connection
        .call(&AccountAddress("5Grw".to_owned()), &get_call())
        .await
        .unwrap_err();
    assert!(err.is_fatal_transport());
}

#[tokio::test]
async fn websocket_peer_close_is_fatal() {
    let addr = spawn_ws_node(Some(1)).await;
    let connection = RpcConnector::new()
        .connect(&endpoint(format!("ws://{addr}")))
        .await
        .unwrap();
    connection.ready().await.unwrap();

    let err = connection
        .call(&AccountAddress("5Grw".to_owned()), &get_call())
        .await
        .unwrap_err();
    assert!(err.is_fatal_transport());
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn http_connection_reports_missing_contracts_and_reverts() {
    let reverted = json!({ "result": { "result": { "Ok": { "flags": 1, "data": "0x" } } } });
    let addr = spawn_http_node(reverted).await;
    let connection = RpcConnector::new()
        .connect(&endpoint(format!("http://{addr}/")))
        .await
        .unwrap();

    let capabilities = connection.ready().await.unwrap();
    assert!(!capabilities.contracts_enabled);

    let err = connection
        .call(&AccountAddress("5Grw".to_owned()), &get_call())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Transport(ref t) if !t.fatal && t.message.contains("reverted")));
    assert_eq!(connection.state(), ConnectionState::Live);
}

#[tokio::test]
async fn http_submission_returns_hash() {
    let addr = spawn_http_node(json!({ "result": "0xfeed" })).await;
    let connection = RpcConnector::new()
        .connect(&endpoint(format!("http://{addr}")))
        .await
        .unwrap();

    let ack = connection.submit(&signed_increment()).await.unwrap();
    assert_eq!(ack.tx_hash, "0xfeed");
    assert_eq!(ack.endpoint, format!("http://{addr}"));
}

#[tokio::test]
async fn read_only_messages_are_not_submitted() {
    let addr = spawn_http_node(json!({ "result": "0xfeed" })).await;
    let connection = RpcConnector::new()
        .connect(&endpoint(format!("http://{addr}")))
        .await
        .unwrap();

    let read = SignedCall {
        call: get_call(),
        ..signed_increment()
    };
    let err = connection.submit(&read).await.unwrap_err();
    assert!(matches!(err, ClientError::TransactionRejected(ref msg) if msg.starts_with("get")));
}

#[tokio::test]
async fn stalled_http_node_times_out_without_closing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route(
        "/",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Json(json!({}))
        }),
    );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let connection = RpcConnector::with_timeout(Duration::from_millis(200))
        .unwrap()
        .connect(&endpoint(format!("http://{addr}")))
        .await
        .unwrap();

    let err = connection
        .call(&AccountAddress("5Grw".to_owned()), &get_call())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Transport(ref t) if !t.fatal));
    assert_ne!(connection.state(), ConnectionState::Closed);
}
