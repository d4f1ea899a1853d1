use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use ic_api_types::AccountAddress;
use ic_chain_client::{
    ChainConnection, ClientError, ClientResult, ConnectionState, Connector, Endpoint, NodeCapabilities,
    SubmissionAck, TransportError,
};
use ic_codec::{ContractCall, SignedCall, from_hex, to_prefixed_hex};
use serde_json::{Value, json};
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

mod rpc;

use rpc::{ExecOutcome, RpcFailure, RpcResponse};

pub const CONTRACTS_CALL: &str = "contracts_call";
const RPC_METHODS: &str = "rpc_methods";
const SUBMIT_EXTRINSIC: &str = "author_submitExtrinsic";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Per-request bound for the HTTP transport when none is configured.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Opens JSON-RPC connections to substrate nodes over WebSocket or HTTP.
#[derive(Clone)]
pub struct RpcConnector {
    http: reqwest::Client,
}

impl Default for RpcConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcConnector {
    pub fn new() -> Self {
        // Builder failure means the TLS backend is unusable; the plain client
        // would hit the same error on first use.
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { http }
    }

    /// Bounds every HTTP JSON-RPC request by `timeout`. WebSocket requests
    /// are bounded by the caller.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError::fatal("http", format!("http client: {err}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Connector for RpcConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn ChainConnection>, TransportError> {
        let url = endpoint.url.trim();
        let transport = if url.starts_with("ws://") || url.starts_with("wss://") {
            let (stream, _) = connect_async(url)
                .await
                .map_err(|err| TransportError::recoverable(url, format!("websocket connect: {err}")))?;
            Transport::Ws(Mutex::new(stream))
        } else if url.starts_with("http://") || url.starts_with("https://") {
            Transport::Http(self.http.clone())
        } else {
            return Err(TransportError::recoverable(url, "unsupported endpoint scheme"));
        };

        debug!("opened transport to {}", url);
        Ok(Box::new(RpcConnection {
            endpoint: url.trim_end_matches('/').to_owned(),
            transport,
            next_id: AtomicU64::new(1),
            state: StdMutex::new(ConnectionState::Connecting),
        }))
    }
}

enum Transport {
    Ws(Mutex<WsStream>),
    Http(reqwest::Client),
}

pub struct RpcConnection {
    endpoint: String,
    transport: Transport,
    next_id: AtomicU64,
    state: StdMutex<ConnectionState>,
}

impl RpcConnection {
    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    fn fatal(&self, message: impl Into<String>) -> RpcFailure {
        self.set_state(ConnectionState::Closed);
        RpcFailure::Transport(TransportError::fatal(&self.endpoint, message))
    }

    fn recoverable(&self, message: impl Into<String>) -> RpcFailure {
        RpcFailure::Transport(TransportError::recoverable(&self.endpoint, message))
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcFailure> {
        if self.state() == ConnectionState::Closed {
            return Err(RpcFailure::Transport(TransportError::fatal(
                &self.endpoint,
                "connection closed",
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = match &self.transport {
            Transport::Ws(stream) => self.request_ws(stream, id, body).await?,
            Transport::Http(http) => self.request_http(http, body).await?,
        };

        response.into_result()
    }

    async fn request_ws(&self, stream: &Mutex<WsStream>, id: u64, body: Value) -> Result<RpcResponse, RpcFailure> {
        let mut stream = stream.lock().await;
        stream
            .send(Message::Text(body.to_string()))
            .await
            .map_err(|err| self.fatal(format!("websocket send: {err}")))?;

        loop {
            let frame = match stream.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(err)) => return Err(self.fatal(format!("websocket read: {err}"))),
                None => return Err(self.fatal("websocket stream ended")),
            };

            let text = match frame {
                Message::Text(text) if !text.is_empty() => text,
                Message::Binary(bytes) if !bytes.is_empty() => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => continue,
                },
                Message::Close(_) => return Err(self.fatal("websocket closed by peer")),
                _ => continue,
            };

            let response: RpcResponse = match serde_json::from_str(&text) {
                Ok(response) => response,
                Err(err) => {
                    warn!("ignoring malformed frame from {}: {}", self.endpoint, err);
                    continue;
                }
            };

            // Subscription notifications carry no id.
            if response.id_matches(id) {
                return Ok(response);
            }
        }
    }

    async fn request_http(&self, http: &reqwest::Client, body: Value) -> Result<RpcResponse, RpcFailure> {
        let response = http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| self.recoverable(format!("http transport: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.recoverable(format!("HTTP {status}: {text}")));
        }

        response
            .json::<RpcResponse>()
            .await
            .map_err(|err| self.recoverable(format!("malformed response: {err}")))
    }
}

#[async_trait]
impl ChainConnection for RpcConnection {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn ready(&self) -> Result<NodeCapabilities, TransportError> {
        let result = self.request(RPC_METHODS, json!([])).await.map_err(|failure| match failure {
            RpcFailure::Transport(err) => err,
            RpcFailure::Rpc { code, message } => {
                TransportError::recoverable(&self.endpoint, format!("{RPC_METHODS} failed ({code}): {message}"))
            }
        })?;

        let capabilities = rpc::capabilities(&result);
        self.set_state(ConnectionState::Live);
        Ok(capabilities)
    }

    async fn call(&self, origin: &AccountAddress, call: &ContractCall) -> ClientResult<Vec<u8>> {
        let value = u64::try_from(call.value)
            .map_err(|_| TransportError::recoverable(&self.endpoint, "call value exceeds u64"))?;
        let storage_deposit_limit = call
            .storage_deposit_limit
            .map(u64::try_from)
            .transpose()
            .map_err(|_| TransportError::recoverable(&self.endpoint, "storage deposit limit exceeds u64"))?;

        let params = json!([{
            "origin": origin.0,
            "dest": call.dest.0,
            "value": value,
            "gasLimit": call.gas_limit,
            "storageDepositLimit": storage_deposit_limit,
            "inputData": to_prefixed_hex(&call.input),
        }]);

        let result = self.request(CONTRACTS_CALL, params).await.map_err(|failure| match failure {
            RpcFailure::Transport(err) => ClientError::Transport(err),
            RpcFailure::Rpc { code, message } => ClientError::Transport(TransportError::recoverable(
                &self.endpoint,
                format!("{CONTRACTS_CALL} failed ({code}): {message}"),
            )),
        })?;

        match rpc::exec_outcome(&result).map_err(|msg| TransportError::recoverable(&self.endpoint, msg))? {
            ExecOutcome::Ok { reverted: true, .. } => {
                Err(TransportError::recoverable(&self.endpoint, "contract reverted").into())
            }
            ExecOutcome::Ok { data, .. } => Ok(from_hex(&data)?),
            ExecOutcome::Err(reason) => Err(TransportError::recoverable(
                &self.endpoint,
                format!("contract execution failed: {reason}"),
            )
            .into()),
        }
    }

    async fn submit(&self, signed: &SignedCall) -> ClientResult<SubmissionAck> {
        let selector = signed.call.selector()?;
        if !selector.is_mutating() {
            return Err(ClientError::TransactionRejected(format!(
                "{} does not modify state; use a read-only call",
                selector.name()
            )));
        }

        let params = json!([to_prefixed_hex(&signed.envelope()?)]);
        let result = self.request(SUBMIT_EXTRINSIC, params).await.map_err(|failure| match failure {
            RpcFailure::Transport(err) => ClientError::Transport(err),
            RpcFailure::Rpc { code, message } => ClientError::TransactionRejected(format!("({code}) {message}")),
        })?;

        let tx_hash = result
            .as_str()
            .map(ToOwned::to_owned)
            .ok_or_else(|| TransportError::recoverable(&self.endpoint, "submission returned no hash"))?;

        Ok(SubmissionAck {
            tx_hash,
            endpoint: self.endpoint.clone(),
        })
    }

    async fn close(&self) {
        if let Transport::Ws(stream) = &self.transport {
            let mut stream = stream.lock().await;
            if let Err(err) = stream.close(None).await {
                debug!("websocket close on {}: {}", self.endpoint, err);
            }
        }
        self.set_state(ConnectionState::Closed);
    }
}

#[cfg(test)]
mod tests;
