use crate::transport::{
    TransportError,
    WalletTransport,
};
use reqwest::{
    StatusCode,
    Url,
};
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;
use std::sync::atomic::{
    AtomicU64,
    Ordering,
};

/// JSON-RPC 2.0 over HTTP, for wallets that expose their request interface on a
/// local endpoint (a signer proxy, or a dev node with unlocked accounts).
#[derive(Debug)]
pub struct HttpWallet {
    url: Url,
    http: reqwest::Client,
    next_id: AtomicU64,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl HttpWallet {
    pub fn new(url: Url) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder().build().map_err(|err| {
            TransportError::Transport(format!("failed to build HTTP client: {err}"))
        })?;
        Ok(Self::with_client(url, http))
    }

    pub fn with_client(url: Url, http: reqwest::Client) -> Self {
        Self {
            url,
            http,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl WalletTransport for HttpWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        let res = self
            .http
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|err| TransportError::Transport(format!("{method}: {err}")))?;
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|err| TransportError::Transport(format!("{method}: {err}")))?;
        if !status.is_success() && status != StatusCode::BAD_REQUEST {
            let body = String::from_utf8_lossy(&bytes);
            return Err(TransportError::Transport(format!(
                "wallet responded with {status} to {method}: {body}"
            )));
        }
        let response: RpcResponse = serde_json::from_slice(&bytes)
            .map_err(|err| TransportError::Decode(format!("{method}: {err}")))?;
        if let Some(error) = response.error {
            return Err(TransportError::rpc(error.code, error.message));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}
