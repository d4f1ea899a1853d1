use anyhow::Result;
use async_trait::async_trait;
use ic_api_types::{AccountAddress, SignPurpose};
use ic_crypto::{Ed25519Signer, Signer};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{AppIdentity, ProviderError, SignerProvider, SigningCapability};

/// In-process wallet holding ed25519 keys.
///
/// Stands in for a browser extension when the client runs server-side.
/// Accounts are only exposed once an identity has been enabled.
pub struct KeyringProvider {
    name: String,
    keys: RwLock<Vec<Arc<KeyringAccount>>>,
    identities: RwLock<Vec<String>>,
    deny_all: bool,
}

struct KeyringAccount {
    address: AccountAddress,
    signer: Ed25519Signer,
}

impl KeyringProvider {
    pub fn new(name: &str, signer: Ed25519Signer) -> Self {
        Self {
            name: name.to_owned(),
            keys: RwLock::new(vec![Arc::new(KeyringAccount {
                address: signer.address(),
                signer,
            })]),
            identities: RwLock::new(Vec::new()),
            deny_all: false,
        }
    }

    pub fn from_seed_hex(name: &str, seed: &str) -> Result<Self> {
        Ok(Self::new(name, Ed25519Signer::from_seed_hex(seed)?))
    }

    /// A keyring whose user declines every access request.
    pub fn denying(mut self) -> Self {
        self.deny_all = true;
        self
    }

    pub async fn add_account(&self, signer: Ed25519Signer) -> AccountAddress {
        let address = signer.address();
        self.keys.write().await.push(Arc::new(KeyringAccount {
            address: address.clone(),
            signer,
        }));
        address
    }

    /// Drops every key, as if the user removed the accounts out-of-band.
    pub async fn revoke(&self) {
        self.keys.write().await.clear();
    }

    pub async fn addresses(&self) -> Vec<AccountAddress> {
        self.keys.read().await.iter().map(|k| k.address.clone()).collect()
    }

    pub async fn authorized_identities(&self) -> Vec<String> {
        self.identities.read().await.clone()
    }

    pub async fn public_key(&self, address: &AccountAddress) -> Option<[u8; 32]> {
        self.keys
            .read()
            .await
            .iter()
            .find(|k| &k.address == address)
            .map(|k| k.signer.public_key_bytes())
    }
}

#[async_trait]
impl SignerProvider for KeyringProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enable(&self, identity: &AppIdentity) -> Result<Vec<AccountAddress>, ProviderError> {
        if self.deny_all {
            return Err(ProviderError::Denied("user declined".to_owned()));
        }
        if identity.as_str().trim().is_empty() {
            return Err(ProviderError::Denied("app identity is required".to_owned()));
        }

        self.identities.write().await.push(identity.0.clone());
        Ok(self.addresses().await)
    }

    async fn signer_for(&self, address: &AccountAddress) -> Result<Arc<dyn SigningCapability>, ProviderError> {
        if self.identities.read().await.is_empty() {
            return Err(ProviderError::Denied("provider not enabled".to_owned()));
        }

        let keys = self.keys.read().await;
        let Some(account) = keys.iter().find(|k| &k.address == address) else {
            return Err(ProviderError::Denied(format!("unknown account {address}")));
        };
        let capability: Arc<dyn SigningCapability> = account.clone();
        Ok(capability)
    }
}

#[async_trait]
impl SigningCapability for KeyringAccount {
    fn address(&self) -> &AccountAddress {
        &self.address
    }

    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, ProviderError> {
        self.signer
            .sign(payload, SignPurpose::Transaction)
            .map_err(|err| ProviderError::Failed(err.to_string()))
    }
}
