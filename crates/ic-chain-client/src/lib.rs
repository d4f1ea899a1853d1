use async_trait::async_trait;
use ic_api_types::AccountAddress;
use ic_codec::{ContractCall, SignedCall};
use std::time::Duration;

mod error;
mod resolver;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ClientError, TransportError};
pub use resolver::{EndpointResolver, ResolvedConnection};

pub type ClientResult<T> = Result<T, ClientError>;

/// One candidate RPC endpoint with its per-attempt timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub timeout: Duration,
}

impl Endpoint {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    /// Builds an ordered endpoint list sharing one per-attempt timeout.
    pub fn list<I, S>(urls: I, timeout: Duration) -> Vec<Endpoint>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        urls.into_iter().map(|url| Endpoint::new(url, timeout)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Live,
    Closed,
}

/// What the node reported during the readiness handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeCapabilities {
    pub contracts_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionAck {
    pub tx_hash: String,
    pub endpoint: String,
}

/// A live handle to exactly one node.
#[async_trait]
pub trait ChainConnection: Send + Sync {
    fn endpoint(&self) -> &str;

    fn state(&self) -> ConnectionState;

    /// Waits for the node to answer its readiness probe.
    async fn ready(&self) -> Result<NodeCapabilities, TransportError>;

    /// Read-only dry run of `call`; returns the raw data buffer.
    async fn call(&self, origin: &AccountAddress, call: &ContractCall) -> ClientResult<Vec<u8>>;

    /// Submits a signed call and resolves on acknowledgement, not finality.
    async fn submit(&self, signed: &SignedCall) -> ClientResult<SubmissionAck>;

    async fn close(&self);
}

/// Opens transport-level connections; readiness is awaited separately.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn ChainConnection>, TransportError>;
}
