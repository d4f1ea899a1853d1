use ic_api_types::AccountAddress;
use ic_chain_client::{ClientError, ClientResult};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{AppIdentity, ProviderError, SignerProvider, SigningCapability};

/// An authorized account. Holds only a weak reference to its provider; the
/// gateway owns the provider and the signing material stays behind it.
#[derive(Clone)]
pub struct Account {
    pub address: AccountAddress,
    provider_name: String,
    provider: Weak<dyn SignerProvider>,
}

impl Account {
    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .field("provider", &self.provider_name)
            .finish()
    }
}

/// Result of a successful wallet connection.
#[derive(Debug, Clone)]
pub struct WalletSession {
    pub account: Account,
    pub identity: AppIdentity,
}

#[derive(Default)]
pub struct SignerGateway {
    providers: RwLock<Vec<Arc<dyn SignerProvider>>>,
}

impl SignerGateway {
    pub fn new(providers: Vec<Arc<dyn SignerProvider>>) -> Self {
        Self {
            providers: RwLock::new(providers),
        }
    }

    pub async fn install(&self, provider: Arc<dyn SignerProvider>) {
        self.providers.write().await.push(provider);
    }

    /// Removes a provider; accounts it issued stop yielding signers.
    pub async fn uninstall(&self, name: &str) {
        self.providers.write().await.retain(|p| p.name() != name);
    }

    pub async fn discover(&self) -> ClientResult<Vec<Arc<dyn SignerProvider>>> {
        let providers = self.providers.read().await.clone();
        if providers.is_empty() {
            return Err(ClientError::NoSignerInstalled);
        }
        Ok(providers)
    }

    pub async fn authorize(
        &self,
        provider: &Arc<dyn SignerProvider>,
        identity: &AppIdentity,
    ) -> ClientResult<Vec<Account>> {
        let denied = || ClientError::AuthorizationDenied {
            provider: provider.name().to_owned(),
        };

        let addresses = match provider.enable(identity).await {
            Ok(addresses) => addresses,
            Err(err) => {
                warn!("provider {} refused {}: {}", provider.name(), identity.as_str(), err);
                return Err(denied());
            }
        };

        if addresses.is_empty() {
            return Err(denied());
        }

        Ok(addresses
            .into_iter()
            .map(|address| Account {
                address,
                provider_name: provider.name().to_owned(),
                provider: Arc::downgrade(provider),
            })
            .collect())
    }

    /// Derives a fresh capability for `account`. Never cached: the provider
    /// may have revoked or rotated the credential since the last call.
    pub async fn for_account(&self, account: &Account) -> ClientResult<Arc<dyn SigningCapability>> {
        let Some(provider) = account.provider.upgrade() else {
            return Err(ClientError::SignerUnavailable(format!(
                "provider {} is no longer installed",
                account.provider_name
            )));
        };

        provider
            .signer_for(&account.address)
            .await
            .map_err(|err| match err {
                ProviderError::Denied(reason) | ProviderError::Failed(reason) => {
                    ClientError::SignerUnavailable(format!("{}: {reason}", account.address))
                }
            })
    }

    /// Picks the first provider, authorizes it under a fresh identity and
    /// returns its first account.
    pub async fn connect_first(&self, app_name: &str) -> ClientResult<WalletSession> {
        let providers = self.discover().await?;
        let provider = &providers[0];
        let identity = AppIdentity::fresh(app_name);

        let mut accounts = self.authorize(provider, &identity).await?;
        let account = accounts.remove(0);
        info!("wallet connected via {}: {}", provider.name(), account.address);

        Ok(WalletSession { account, identity })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyringProvider;
    use ic_api_types::SignPurpose;

    const SEED: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

    fn keyring(name: &str) -> Arc<KeyringProvider> {
        Arc::new(KeyringProvider::from_seed_hex(name, SEED).unwrap())
    }

    #[tokio::test]
    async fn discover_without_providers_fails() {
        let gateway = SignerGateway::default();
        assert_eq!(gateway.discover().await.err(), Some(ClientError::NoSignerInstalled));
        assert_eq!(
            gateway.connect_first("ink-counter").await.err().map(|e| e.to_string()),
            Some(ClientError::NoSignerInstalled.to_string())
        );
    }

    #[tokio::test]
    async fn fresh_identities_are_distinct() {
        let a = AppIdentity::fresh("ink-counter");
        let b = AppIdentity::fresh("ink-counter");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("ink-counter-"));
    }

    #[tokio::test]
    async fn connect_first_uses_first_provider_and_account() {
        let first = keyring("polkadot-js");
        let second = Arc::new(KeyringProvider::new("talisman", ic_crypto::Ed25519Signer::new_random()));
        let gateway = SignerGateway::new(vec![first.clone(), second]);

        let session = gateway.connect_first("ink-counter").await.unwrap();
        assert_eq!(session.account.provider_name(), "polkadot-js");
        assert_eq!(session.account.address, first.addresses().await[0]);
        assert_eq!(first.authorized_identities().await, vec![session.identity.0.clone()]);
    }

    #[tokio::test]
    async fn denied_authorization_is_reported() {
        let provider: Arc<dyn SignerProvider> = Arc::new(KeyringProvider::from_seed_hex("wallet", SEED).unwrap().denying());
        let gateway = SignerGateway::new(vec![provider.clone()]);

        let err = gateway
            .authorize(&provider, &AppIdentity::fresh("ink-counter"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ClientError::AuthorizationDenied {
                provider: "wallet".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn empty_account_list_is_denied() {
        let provider = keyring("wallet");
        provider.revoke().await;
        let gateway = SignerGateway::new(vec![provider]);

        let err = gateway.connect_first("ink-counter").await.unwrap_err();
        assert!(matches!(err, ClientError::AuthorizationDenied { .. }));
    }

    #[tokio::test]
    async fn capability_signs_verifiable_payloads() {
        let provider = keyring("wallet");
        let gateway = SignerGateway::new(vec![provider.clone()]);
        let session = gateway.connect_first("ink-counter").await.unwrap();

        let capability = gateway.for_account(&session.account).await.unwrap();
        assert_eq!(capability.address(), &session.account.address);

        let signature = capability.sign(b"call-bytes").await.unwrap();
        let public_key = provider.public_key(&session.account.address).await.unwrap();
        assert!(ic_crypto::verify(&public_key, b"call-bytes", SignPurpose::Transaction, &signature).is_ok());
    }

    #[tokio::test]
    async fn revoked_or_uninstalled_provider_yields_no_signer() {
        let provider = keyring("wallet");
        let gateway = SignerGateway::new(vec![provider.clone()]);
        let session = gateway.connect_first("ink-counter").await.unwrap();

        provider.revoke().await;
        assert!(matches!(
            gateway.for_account(&session.account).await.err(),
            Some(ClientError::SignerUnavailable(_))
        ));

        let other = keyring("other");
        let gateway = SignerGateway::new(vec![other.clone()]);
        let session = gateway.connect_first("ink-counter").await.unwrap();
        drop(other);
        gateway.uninstall("other").await;
        assert!(matches!(
            gateway.for_account(&session.account).await.err(),
            Some(ClientError::SignerUnavailable(_))
        ));
    }
}
