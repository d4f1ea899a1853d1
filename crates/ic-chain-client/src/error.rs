use ic_codec::DecodeError;
use thiserror::Error;

/// Failure on the wire to one endpoint.
///
/// `fatal` is set when the underlying connection can no longer be used and
/// must be re-resolved; other transport errors only fail the current call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport error on {endpoint}: {message}")]
pub struct TransportError {
    pub endpoint: String,
    pub message: String,
    pub fatal: bool,
}

impl TransportError {
    pub fn recoverable(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            message: message.into(),
            fatal: false,
        }
    }

    pub fn fatal(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            message: message.into(),
            fatal: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("no endpoint available ({attempted} attempted)")]
    NoEndpointAvailable { attempted: usize },
    #[error("no signing provider installed")]
    NoSignerInstalled,
    #[error("authorization denied by provider {provider}")]
    AuthorizationDenied { provider: String },
    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("transaction rejected: {0}")]
    TransactionRejected(String),
}

impl ClientError {
    /// True when the connection that produced this error is unusable.
    pub fn is_fatal_transport(&self) -> bool {
        matches!(self, ClientError::Transport(TransportError { fatal: true, .. }))
    }
}
