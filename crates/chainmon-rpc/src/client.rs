//! RPC transport.
//!
//! [`RpcClient`] is the capability the gateway needs: issue one call,
//! return its JSON result or a typed error. [`HttpRpcClient`] implements it
//! as JSON-RPC 1.0 over HTTP/1.1 with Basic auth, opening a fresh
//! connection per call.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::call::RpcCall;
use crate::connection::{ConnectionDescriptor, Credentials};
use crate::error::{RpcError, RpcResult};

/// Issues a single RPC call against the daemon.
pub trait RpcClient: Send + Sync {
    fn call(&self, call: &RpcCall) -> impl Future<Output = RpcResult<Value>> + Send;
}

impl<T: RpcClient> RpcClient for Arc<T> {
    fn call(&self, call: &RpcCall) -> impl Future<Output = RpcResult<Value>> + Send {
        (**self).call(call)
    }
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a [Value],
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    #[serde(default)]
    message: String,
}

/// JSON-RPC over HTTP/1.1.
pub struct HttpRpcClient {
    authority: String,
    authorization: Option<String>,
    timeout: Duration,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    /// Create a client for a resolved descriptor. `timeout` bounds each
    /// request, connection setup included.
    pub fn new(descriptor: &ConnectionDescriptor, timeout: Duration) -> Self {
        let authorization = match &descriptor.credentials {
            Credentials::UserPass { user, password } => {
                Some(format!("Basic {}", STANDARD.encode(format!("{user}:{password}"))))
            }
            Credentials::None => None,
        };
        Self {
            authority: descriptor.authority(),
            authorization,
            timeout,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    async fn send(&self, body: Vec<u8>) -> RpcResult<Value> {
        let stream = tokio::net::TcpStream::connect(&self.authority)
            .await
            .map_err(|e| RpcError::Connection(format!("{}: {e}", self.authority)))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| RpcError::Connection(format!("handshake: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "RPC connection closed with error");
            }
        });

        let mut builder = http::Request::builder()
            .method("POST")
            .uri("/")
            .header("host", &self.authority)
            .header("content-type", "application/json")
            .header("user-agent", "chainmon/0.1");
        if let Some(authorization) = &self.authorization {
            builder = builder.header("authorization", authorization);
        }
        let req = builder
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| RpcError::InvalidRequest(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| RpcError::Connection(format!("request: {e}")))?;
        let status = resp.status();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| RpcError::Connection(format!("response body: {e}")))?
            .to_bytes();

        decode_response(status, &bytes)
    }
}

impl RpcClient for HttpRpcClient {
    async fn call(&self, call: &RpcCall) -> RpcResult<Value> {
        let request = JsonRpcRequest {
            jsonrpc: "1.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: &call.method,
            params: &call.params,
        };
        let body =
            serde_json::to_vec(&request).map_err(|e| RpcError::InvalidRequest(e.to_string()))?;

        match tokio::time::timeout(self.timeout, self.send(body)).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout(self.timeout)),
        }
    }
}

/// Turn an HTTP response into a JSON-RPC result.
///
/// The daemon reports RPC errors with a non-2xx status and a JSON body, so
/// the status only matters when the body is not JSON.
fn decode_response(status: http::StatusCode, body: &[u8]) -> RpcResult<Value> {
    let response: JsonRpcResponse = serde_json::from_slice(body).map_err(|e| {
        RpcError::MalformedResponse(format!("HTTP {status}: {e}"))
    })?;

    match response.error {
        Some(err) => Err(RpcError::from_rpc_error(err.code, err.message)),
        None => Ok(response.result.unwrap_or(Value::Null)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use serde_json::json;

    #[test]
    fn decodes_result() {
        let body = br#"{"result":{"blocks":840000},"error":null,"id":1}"#;
        let value = decode_response(StatusCode::OK, body).unwrap();
        assert_eq!(value, json!({"blocks": 840000}));
    }

    #[test]
    fn null_result_is_null() {
        let body = br#"{"result":null,"error":null,"id":1}"#;
        assert_eq!(decode_response(StatusCode::OK, body).unwrap(), Value::Null);
    }

    #[test]
    fn warmup_error_is_typed() {
        let body = br#"{"result":null,"error":{"code":-28,"message":"Loading block index..."},"id":1}"#;
        let err = decode_response(StatusCode::INTERNAL_SERVER_ERROR, body).unwrap_err();
        assert!(matches!(err, RpcError::InWarmup(ref m) if m == "Loading block index..."));
    }

    #[test]
    fn rpc_error_is_fault() {
        let body = br#"{"result":null,"error":{"code":-32601,"message":"Method not found"},"id":1}"#;
        let err = decode_response(StatusCode::NOT_FOUND, body).unwrap_err();
        assert!(matches!(err, RpcError::Fault { code: -32601, .. }));
    }

    #[test]
    fn html_body_is_malformed() {
        let body = b"<html><body>401 Unauthorized</body></html>";
        let err = decode_response(StatusCode::UNAUTHORIZED, body).unwrap_err();
        match err {
            RpcError::MalformedResponse(detail) => assert!(detail.contains("401")),
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }

    #[test]
    fn empty_body_is_malformed() {
        let err = decode_response(StatusCode::UNAUTHORIZED, b"").unwrap_err();
        assert!(matches!(err, RpcError::MalformedResponse(_)));
    }

    #[test]
    fn request_envelope_shape() {
        let params = vec![json!(6)];
        let request = JsonRpcRequest {
            jsonrpc: "1.0",
            id: 7,
            method: "estimatesmartfee",
            params: &params,
        };
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(
            encoded,
            json!({"jsonrpc": "1.0", "id": 7, "method": "estimatesmartfee", "params": [6]})
        );
    }
}
