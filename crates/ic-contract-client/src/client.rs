use ic_api_types::{AccountAddress, ConnectionMode, ContractAddress, CounterSnapshot};
use ic_chain_client::{
    ChainConnection, ClientError, ClientResult, Connector, EndpointResolver, SubmissionAck, TransportError,
};
use ic_codec::{CallSelector, ContractCall, SignedCall, decode_counter};
use ic_signer::{Account, SignerGateway, WalletSession};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::simulation::{SimulatedState, SimulationFallback};

/// Destination recorded on simulated calls when no contract is configured.
const SIMULATED_CONTRACT: &str = "simulated";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Uninitialized,
    Connecting,
    Ready(ConnectionMode),
    Submitting(ConnectionMode),
}

/// Result of an acknowledged `increment`/`decrement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome {
    pub mode: ConnectionMode,
    pub selector: CallSelector,
    /// `None` in simulated mode, where the change is already settled.
    pub ack: Option<SubmissionAck>,
    /// How long to wait before the refresh query is expected to observe it.
    pub settle_after: Duration,
}

struct LiveBinding {
    connection: Box<dyn ChainConnection>,
    contract: ContractAddress,
}

/// Façade over endpoint resolution, signing and the simulation fallback.
///
/// The mode is chosen once in [`initialize`](Self::initialize): `Live` when
/// an endpoint with contract support answered and a contract address is
/// configured, `Simulated` otherwise. Operations take `&mut self`, so one
/// client serves one caller at a time; share it behind a lock for more.
pub struct ContractClient {
    config: ClientConfig,
    resolver: EndpointResolver,
    signers: Arc<SignerGateway>,
    simulation: SimulationFallback,
    state: ClientState,
    live: Option<LiveBinding>,
    account: Option<Account>,
    snapshot: Option<CounterSnapshot>,
}

impl ContractClient {
    pub fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        signers: Arc<SignerGateway>,
        simulated: SimulatedState,
    ) -> Self {
        Self {
            config,
            resolver: EndpointResolver::new(connector),
            signers,
            simulation: SimulationFallback::new(simulated),
            state: ClientState::Uninitialized,
            live: None,
            account: None,
            snapshot: None,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn mode(&self) -> Option<ConnectionMode> {
        match self.state {
            ClientState::Ready(mode) | ClientState::Submitting(mode) => Some(mode),
            ClientState::Uninitialized | ClientState::Connecting => None,
        }
    }

    /// Last value observed by [`query`](Self::query).
    pub fn snapshot(&self) -> Option<CounterSnapshot> {
        self.snapshot
    }

    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    pub fn live_endpoint(&self) -> Option<&str> {
        self.live.as_ref().map(|binding| binding.connection.endpoint())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connects to the first reachable endpoint or falls back to simulation.
    /// Never fails: connectivity problems only downgrade the mode.
    pub async fn initialize(&mut self) -> ConnectionMode {
        self.shutdown().await;
        self.state = ClientState::Connecting;

        let mode = match self.connect_live().await {
            Some(binding) => {
                info!(
                    "contract client live on {} (contract {})",
                    binding.connection.endpoint(),
                    binding.contract
                );
                self.live = Some(binding);
                ConnectionMode::Live
            }
            None => {
                info!("contract client running in simulated mode");
                ConnectionMode::Simulated
            }
        };

        self.state = ClientState::Ready(mode);
        mode
    }

    async fn connect_live(&self) -> Option<LiveBinding> {
        let Some(contract) = self.config.contract.clone() else {
            debug!("no contract address configured");
            return None;
        };

        let resolved = match timeout(self.config.init_timeout, self.resolver.resolve(&self.config.endpoints)).await {
            Ok(Ok(resolved)) => resolved,
            Ok(Err(err)) => {
                warn!("endpoint resolution failed: {}", err);
                return None;
            }
            Err(_) => {
                warn!(
                    "endpoint resolution exceeded {}ms",
                    self.config.init_timeout.as_millis()
                );
                return None;
            }
        };

        if !resolved.capabilities.contracts_enabled {
            warn!("{} does not expose contract calls", resolved.endpoint.url);
            resolved.connection.close().await;
            return None;
        }

        Some(LiveBinding {
            connection: resolved.connection,
            contract,
        })
    }

    /// Closes the live connection, if any. The next operation re-initializes.
    pub async fn shutdown(&mut self) {
        if let Some(binding) = self.live.take() {
            binding.connection.close().await;
        }
        self.state = ClientState::Uninitialized;
    }

    async fn ensure_ready(&mut self) -> ConnectionMode {
        match self.state {
            ClientState::Ready(mode) | ClientState::Submitting(mode) => mode,
            ClientState::Uninitialized | ClientState::Connecting => self.initialize().await,
        }
    }

    pub async fn connect_wallet(&mut self) -> ClientResult<WalletSession> {
        let session = self.signers.connect_first(&self.config.app_name).await?;
        self.account = Some(session.account.clone());
        Ok(session)
    }

    pub fn set_account(&mut self, account: Option<Account>) {
        self.account = account;
    }

    pub fn disconnect_wallet(&mut self) {
        self.account = None;
    }

    pub async fn query(&mut self) -> ClientResult<CounterSnapshot> {
        let mode = self.ensure_ready().await;
        let value = match mode {
            ConnectionMode::Simulated => self.simulation.read(),
            ConnectionMode::Live => self.read_live().await?,
        };

        let snapshot = CounterSnapshot {
            value,
            source: mode.source(),
        };
        self.snapshot = Some(snapshot);
        Ok(snapshot)
    }

    pub async fn increment(&mut self) -> ClientResult<TxOutcome> {
        self.transact(CallSelector::Increment).await
    }

    pub async fn decrement(&mut self) -> ClientResult<TxOutcome> {
        self.transact(CallSelector::Decrement).await
    }

    /// Waits out the settlement delay of `outcome`, then re-queries.
    ///
    /// The delay is a heuristic: a live node may still report the old value.
    pub async fn refresh_after_settlement(&mut self, outcome: &TxOutcome) -> ClientResult<CounterSnapshot> {
        if !outcome.settle_after.is_zero() {
            sleep(outcome.settle_after).await;
        }
        self.query().await
    }

    async fn read_live(&mut self) -> ClientResult<i32> {
        let limit = self.config.call_timeout;
        let result = {
            let binding = self.binding()?;
            let origin = self
                .account
                .as_ref()
                .map(|account| account.address.clone())
                .unwrap_or_else(|| AccountAddress(binding.contract.0.clone()));
            let call = ContractCall::new(binding.contract.clone(), CallSelector::Get);
            match timeout(limit, binding.connection.call(&origin, &call)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::recoverable(
                    binding.connection.endpoint(),
                    format!("no response within {}ms", limit.as_millis()),
                )
                .into()),
            }
        };

        match result {
            Ok(data) => Ok(decode_counter(&data)?),
            Err(err) => {
                self.on_live_error(&err).await;
                Err(err)
            }
        }
    }

    async fn transact(&mut self, selector: CallSelector) -> ClientResult<TxOutcome> {
        let account = self
            .account
            .clone()
            .ok_or_else(|| ClientError::SignerUnavailable("no authorized account".to_owned()))?;

        let mode = self.ensure_ready().await;
        self.state = ClientState::Submitting(mode);
        let outcome = self.sign_and_submit(mode, selector, &account).await;

        // A fatal transport error has already reset the state.
        if self.state == ClientState::Submitting(mode) {
            self.state = ClientState::Ready(mode);
        }
        outcome
    }

    async fn sign_and_submit(
        &mut self,
        mode: ConnectionMode,
        selector: CallSelector,
        account: &Account,
    ) -> ClientResult<TxOutcome> {
        let capability = self.signers.for_account(account).await?;

        let dest = match mode {
            ConnectionMode::Live => self.binding()?.contract.clone(),
            ConnectionMode::Simulated => self
                .config
                .contract
                .clone()
                .unwrap_or_else(|| ContractAddress(SIMULATED_CONTRACT.to_owned())),
        };
        let call = ContractCall::new(dest, selector);
        let signature = capability
            .sign(&call.signing_payload())
            .await
            .map_err(|err| ClientError::TransactionRejected(err.to_string()))?;
        let signed = SignedCall {
            call,
            signer: capability.address().clone(),
            signature,
        };

        match mode {
            ConnectionMode::Simulated => {
                let value = self.simulation.apply(selector)?;
                debug!("simulated {} -> {}", selector.name(), value);
                Ok(TxOutcome {
                    mode,
                    selector,
                    ack: None,
                    settle_after: Duration::ZERO,
                })
            }
            ConnectionMode::Live => {
                let limit = self.config.call_timeout;
                let result = {
                    let binding = self.binding()?;
                    // The node may already hold the transaction; this is not a rejection.
                    match timeout(limit, binding.connection.submit(&signed)).await {
                        Ok(result) => result,
                        Err(_) => Err(TransportError::recoverable(
                            binding.connection.endpoint(),
                            format!(
                                "submission not acknowledged within {}ms; the transaction may still be pending",
                                limit.as_millis()
                            ),
                        )
                        .into()),
                    }
                };
                match result {
                    Ok(ack) => {
                        info!("{} acknowledged: {}", selector.name(), ack.tx_hash);
                        Ok(TxOutcome {
                            mode,
                            selector,
                            ack: Some(ack),
                            settle_after: self.config.settle_delay,
                        })
                    }
                    Err(err) => {
                        self.on_live_error(&err).await;
                        Err(err)
                    }
                }
            }
        }
    }

    fn binding(&self) -> ClientResult<&LiveBinding> {
        self.live
            .as_ref()
            .ok_or_else(|| TransportError::fatal("-", "no live connection").into())
    }

    // Per-call errors leave the connection alone; a dead connection is
    // dropped so the next operation resolves endpoints again.
    async fn on_live_error(&mut self, err: &ClientError) {
        if err.is_fatal_transport() {
            warn!("live connection lost: {}", err);
            self.shutdown().await;
        } else {
            debug!("live call failed: {}", err);
        }
    }
}
