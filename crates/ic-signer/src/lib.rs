use async_trait::async_trait;
use ic_api_types::AccountAddress;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

mod gateway;
mod keyring;

pub use gateway::{Account, SignerGateway, WalletSession};
pub use keyring::KeyringProvider;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("request denied: {0}")]
    Denied(String),
    #[error("provider failure: {0}")]
    Failed(String),
}

/// Identity string presented to a provider when requesting access.
///
/// Every call to [`AppIdentity::fresh`] yields a distinct value so a
/// provider cannot answer from a cached authorization of an earlier session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity(pub String);

impl AppIdentity {
    pub fn fresh(app_name: &str) -> Self {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Self(format!("{app_name}-{epoch_ms}-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An installed wallet that can hand out accounts and signers.
#[async_trait]
pub trait SignerProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Requests account access for `identity`. May prompt the user.
    async fn enable(&self, identity: &AppIdentity) -> Result<Vec<AccountAddress>, ProviderError>;

    /// Signing capability for an account previously exposed by `enable`.
    async fn signer_for(&self, address: &AccountAddress) -> Result<Arc<dyn SigningCapability>, ProviderError>;
}

/// Delegated authority to sign on behalf of one account.
#[async_trait]
pub trait SigningCapability: Send + Sync {
    fn address(&self) -> &AccountAddress;

    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, ProviderError>;
}
