//! HTTP JSON-RPC client against a loopback server that answers the way the
//! daemon does: JSON envelopes for results and RPC errors, an empty 401 for
//! bad credentials.

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use chainmon_metrics::MetricRegistry;
use chainmon_rpc::{
    ConnectionDescriptor, CredentialSource, Credentials, HttpRpcClient, RetryPolicy, RpcCall,
    RpcClient, RpcError, RpcGateway,
};

// "Basic " + base64("alice:s3cret")
const EXPECTED_AUTH: &str = "Basic YWxpY2U6czNjcmV0";

async fn fake_daemon(headers: HeaderMap, Json(req): Json<Value>) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == EXPECTED_AUTH);
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let id = req["id"].clone();
    match req["method"].as_str().unwrap_or_default() {
        "uptime" => Json(json!({"result": 3600, "error": null, "id": id})).into_response(),
        "getnetworkhashps" => {
            let window = req["params"][0].as_i64().unwrap_or(120);
            Json(json!({"result": window as f64 * 1.0e18, "error": null, "id": id})).into_response()
        }
        "getblockchaininfo" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "result": null,
                "error": {"code": -28, "message": "Loading block index..."},
                "id": id
            })),
        )
            .into_response(),
        "sleep" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"result": null, "error": null, "id": id})).into_response()
        }
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "result": null,
                "error": {"code": -32601, "message": "Method not found"},
                "id": id
            })),
        )
            .into_response(),
    }
}

async fn spawn_daemon() -> SocketAddr {
    let app = Router::new().route("/", post(fake_daemon));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn descriptor(addr: SocketAddr, credentials: Credentials) -> ConnectionDescriptor {
    ConnectionDescriptor {
        scheme: "http".to_string(),
        host: addr.ip().to_string(),
        port: addr.port(),
        credentials,
        source: CredentialSource::Environment,
    }
}

fn alice() -> Credentials {
    Credentials::UserPass {
        user: "alice".to_string(),
        password: "s3cret".to_string(),
    }
}

#[tokio::test]
async fn call_returns_result() {
    let addr = spawn_daemon().await;
    let client = HttpRpcClient::new(&descriptor(addr, alice()), Duration::from_secs(5));

    let uptime = client.call(&RpcCall::new("uptime")).await.unwrap();
    assert_eq!(uptime, json!(3600));

    let hashps = client
        .call(&RpcCall::new("getnetworkhashps").arg(-1))
        .await
        .unwrap();
    assert_eq!(hashps.as_f64(), Some(-1.0e18));
}

#[tokio::test]
async fn warmup_is_reported_as_in_warmup() {
    let addr = spawn_daemon().await;
    let client = HttpRpcClient::new(&descriptor(addr, alice()), Duration::from_secs(5));

    let err = client.call(&RpcCall::new("getblockchaininfo")).await.unwrap_err();
    assert!(matches!(err, RpcError::InWarmup(_)), "got {err:?}");
}

#[tokio::test]
async fn unknown_method_is_a_fault() {
    let addr = spawn_daemon().await;
    let client = HttpRpcClient::new(&descriptor(addr, alice()), Duration::from_secs(5));

    let err = client.call(&RpcCall::new("getrpcinfo")).await.unwrap_err();
    assert!(matches!(err, RpcError::Fault { code: -32601, .. }), "got {err:?}");
}

#[tokio::test]
async fn bad_credentials_give_malformed_response() {
    let addr = spawn_daemon().await;
    let wrong = Credentials::UserPass {
        user: "alice".to_string(),
        password: "wrong".to_string(),
    };
    let client = HttpRpcClient::new(&descriptor(addr, wrong), Duration::from_secs(5));

    let err = client.call(&RpcCall::new("uptime")).await.unwrap_err();
    assert!(matches!(err, RpcError::MalformedResponse(_)), "got {err:?}");

    let anonymous =
        HttpRpcClient::new(&descriptor(addr, Credentials::None), Duration::from_secs(5));
    let err = anonymous.call(&RpcCall::new("uptime")).await.unwrap_err();
    assert!(matches!(err, RpcError::MalformedResponse(_)), "got {err:?}");
}

#[tokio::test]
async fn slow_daemon_times_out() {
    let addr = spawn_daemon().await;
    let client = HttpRpcClient::new(&descriptor(addr, alice()), Duration::from_millis(200));

    let err = client.call(&RpcCall::new("sleep")).await.unwrap_err();
    assert!(matches!(err, RpcError::Timeout(_)), "got {err:?}");
}

#[tokio::test]
async fn refused_connection_is_a_connection_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpRpcClient::new(&descriptor(addr, alice()), Duration::from_secs(5));
    let err = client.call(&RpcCall::new("uptime")).await.unwrap_err();
    assert!(matches!(err, RpcError::Connection(_)), "got {err:?}");
}

#[tokio::test]
async fn gateway_gives_up_on_a_daemon_stuck_in_warmup() {
    let addr = spawn_daemon().await;
    let registry = MetricRegistry::new();
    let client = HttpRpcClient::new(&descriptor(addr, alice()), Duration::from_secs(5));
    let policy = RetryPolicy::new(Duration::from_millis(500))
        .with_backoff(Duration::from_millis(50), 2, Duration::from_millis(200))
        .with_jitter(Duration::ZERO);
    let gateway = RpcGateway::new(client, policy, &registry).unwrap();

    let err = gateway
        .call(&RpcCall::new("getblockchaininfo"))
        .await
        .unwrap_err();
    match err {
        RpcError::RetryBudgetExhausted { source, attempts, .. } => {
            assert!(attempts >= 2);
            assert!(matches!(*source, RpcError::InWarmup(_)));
        }
        other => panic!("expected RetryBudgetExhausted, got {other:?}"),
    }

    let output = registry.render().unwrap();
    assert!(output.contains("bitcoin_exporter_errors{type=\"in_warmup\"}"));
}
