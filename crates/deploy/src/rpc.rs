//! JSON-RPC transport for talking to an Ethereum node.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use crate::DeployError;

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A raw JSON-RPC error object returned by the node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Outcome of a single JSON-RPC request at the transport level.
///
/// Node-reported errors are kept apart from transport failures so that callers can
/// classify them (e.g. nonce conflicts on submission).
#[derive(Debug)]
pub enum RpcResponse {
    Result(Value),
    Error(RpcErrorObject),
}

/// Interface for sending JSON-RPC requests to a single endpoint.
///
/// The HTTP implementation is used in production; tests plug in an in-process chain.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Send one request and return the node's result or error object.
    ///
    /// Returns `DeployError::Connection` when the endpoint cannot be reached.
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<RpcResponse, DeployError>;

    /// Human-readable endpoint description used in logs and errors.
    fn endpoint(&self) -> String;
}

/// JSON-RPC over HTTP(S) backed by `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Create a transport bound to `url` with the default request timeout.
    pub fn new(url: Url) -> Result<Self, DeployError> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: Url, timeout: Duration) -> Result<Self, DeployError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeployError::Connection {
                url: url.to_string(),
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            url,
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<RpcResponse, DeployError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let connection_error = |reason: String| DeployError::Connection {
            url: self.url.to_string(),
            reason,
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": id
            }))
            .send()
            .await
            .map_err(|e| connection_error(format!("failed to send {method} request: {e}")))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| connection_error(format!("failed to parse {method} response: {e}")))?;

        parse_envelope(method, body)
    }

    fn endpoint(&self) -> String {
        self.url.to_string()
    }
}

/// Split a JSON-RPC response envelope into its result or error object.
pub fn parse_envelope(method: &str, mut body: Value) -> Result<RpcResponse, DeployError> {
    if let Some(error) = body.get_mut("error").map(Value::take) {
        let error: RpcErrorObject =
            serde_json::from_value(error).map_err(|e| DeployError::Rpc {
                method: method.to_string(),
                message: format!("malformed error object: {e}"),
            })?;
        return Ok(RpcResponse::Error(error));
    }

    match body.get_mut("result").map(Value::take) {
        Some(result) => Ok(RpcResponse::Result(result)),
        None => Err(DeployError::Rpc {
            method: method.to_string(),
            message: "no result in response".to_string(),
        }),
    }
}

/// Make a JSON-RPC call and deserialize the result.
///
/// Node errors are turned into `DeployError::Rpc`; use [`RpcTransport::request`]
/// directly when the error object needs a finer classification.
pub async fn json_rpc_call<T: DeserializeOwned>(
    transport: &dyn RpcTransport,
    method: &str,
    params: Vec<Value>,
) -> Result<T, DeployError> {
    match transport.request(method, params).await? {
        RpcResponse::Result(value) => {
            serde_json::from_value(value).map_err(|e| DeployError::Rpc {
                method: method.to_string(),
                message: format!("failed to deserialize result: {e}"),
            })
        }
        RpcResponse::Error(error) => Err(DeployError::Rpc {
            method: method.to_string(),
            message: error.message,
        }),
    }
}

/// Deserialize a u64 from a hex quantity string (with 0x prefix).
pub fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    parse_hex_u64(&s).map_err(serde::de::Error::custom)
}

/// Deserialize an optional hex quantity.
pub fn deserialize_opt_u64_from_hex<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(deserializer)?;
    s.map(|s| parse_hex_u64(&s).map_err(serde::de::Error::custom))
        .transpose()
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_hex_u64(s: &str) -> Result<u64, std::num::ParseIntError> {
    let digits = s.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
}
