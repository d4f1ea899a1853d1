//! In-memory connector and node used by tests across the workspace.
//!
//! Each endpoint URL is scripted with a [`ScriptedEndpoint`] behavior. All
//! connections opened by one [`ScriptedConnector`] share a single fake
//! contract, so submissions made through any of them are visible to reads.

use async_trait::async_trait;
use ic_api_types::AccountAddress;
use ic_codec::{CallSelector, ContractCall, SignedCall, encode_counter};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    ChainConnection, ClientError, ClientResult, ConnectionState, Connector, Endpoint, NodeCapabilities,
    SubmissionAck, TransportError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedEndpoint {
    /// Connects and reports contract support.
    Ready,
    /// Connects, but the node has no contracts RPC.
    ReadyWithoutContracts,
    /// Connection refused.
    Refuse,
    /// Connect never completes.
    Hang,
    /// Connects, readiness never completes.
    HangOnReady,
    /// Connects, readiness probe errors.
    FailOnReady,
}

#[derive(Default)]
struct Shared {
    behaviors: HashMap<String, ScriptedEndpoint>,
    attempts: Vec<String>,
    closed: Vec<String>,
    value: i32,
    calls: Vec<(AccountAddress, Vec<u8>)>,
    submissions: Vec<SignedCall>,
    call_faults: VecDeque<ClientError>,
    submit_faults: VecDeque<ClientError>,
    raw_reply: Option<Vec<u8>>,
    stalled_calls: usize,
    stalled_submits: usize,
}

#[derive(Clone, Default)]
pub struct ScriptedConnector {
    shared: Arc<Mutex<Shared>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, url: &str, behavior: ScriptedEndpoint) -> Self {
        self.set_behavior(url, behavior);
        self
    }

    pub fn set_behavior(&self, url: &str, behavior: ScriptedEndpoint) {
        self.lock().behaviors.insert(url.to_owned(), behavior);
    }

    pub fn attempts(&self) -> Vec<String> {
        self.lock().attempts.clone()
    }

    pub fn closed(&self) -> Vec<String> {
        self.lock().closed.clone()
    }

    pub fn set_value(&self, value: i32) {
        self.lock().value = value;
    }

    pub fn value(&self) -> i32 {
        self.lock().value
    }

    /// Input buffers of every read-only call, in order.
    pub fn calls(&self) -> Vec<Vec<u8>> {
        self.lock().calls.iter().map(|(_, input)| input.clone()).collect()
    }

    pub fn call_origins(&self) -> Vec<AccountAddress> {
        self.lock().calls.iter().map(|(origin, _)| origin.clone()).collect()
    }

    pub fn submissions(&self) -> Vec<SignedCall> {
        self.lock().submissions.clone()
    }

    pub fn fail_next_call(&self, err: ClientError) {
        self.lock().call_faults.push_back(err);
    }

    pub fn fail_next_submit(&self, err: ClientError) {
        self.lock().submit_faults.push_back(err);
    }

    /// The next read is accepted but never answered.
    pub fn stall_next_call(&self) {
        self.lock().stalled_calls += 1;
    }

    /// The next submission is accepted but never acknowledged.
    pub fn stall_next_submit(&self) {
        self.lock().stalled_submits += 1;
    }

    /// Makes every subsequent read return `bytes` verbatim.
    pub fn reply_with(&self, bytes: Vec<u8>) {
        self.lock().raw_reply = Some(bytes);
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn ChainConnection>, TransportError> {
        let behavior = {
            let mut shared = self.lock();
            shared.attempts.push(endpoint.url.clone());
            shared.behaviors.get(&endpoint.url).copied()
        };

        match behavior {
            None => Err(TransportError::recoverable(&endpoint.url, "unknown host")),
            Some(ScriptedEndpoint::Refuse) => Err(TransportError::recoverable(&endpoint.url, "connection refused")),
            Some(ScriptedEndpoint::Hang) => std::future::pending().await,
            Some(behavior) => Ok(Box::new(ScriptedConnection {
                endpoint: endpoint.url.clone(),
                behavior,
                state: Mutex::new(ConnectionState::Connecting),
                shared: self.shared.clone(),
            })),
        }
    }
}

pub struct ScriptedConnection {
    endpoint: String,
    behavior: ScriptedEndpoint,
    state: Mutex<ConnectionState>,
    shared: Arc<Mutex<Shared>>,
}

impl ScriptedConnection {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    fn ensure_open(&self) -> ClientResult<()> {
        if self.state() == ConnectionState::Closed {
            return Err(TransportError::fatal(&self.endpoint, "connection closed").into());
        }
        Ok(())
    }

    fn take_fault(&self, fault: Option<ClientError>) -> ClientResult<()> {
        match fault {
            Some(err) => {
                if err.is_fatal_transport() {
                    self.set_state(ConnectionState::Closed);
                }
                Err(err)
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChainConnection for ScriptedConnection {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn ready(&self) -> Result<NodeCapabilities, TransportError> {
        match self.behavior {
            ScriptedEndpoint::HangOnReady => std::future::pending().await,
            ScriptedEndpoint::FailOnReady => Err(TransportError::recoverable(&self.endpoint, "probe failed")),
            ScriptedEndpoint::ReadyWithoutContracts => {
                self.set_state(ConnectionState::Live);
                Ok(NodeCapabilities {
                    contracts_enabled: false,
                })
            }
            _ => {
                self.set_state(ConnectionState::Live);
                Ok(NodeCapabilities {
                    contracts_enabled: true,
                })
            }
        }
    }

    async fn call(&self, origin: &AccountAddress, call: &ContractCall) -> ClientResult<Vec<u8>> {
        self.ensure_open()?;
        let stalled = take_one(&mut self.lock().stalled_calls);
        if stalled {
            std::future::pending::<()>().await;
        }
        let fault = self.lock().call_faults.pop_front();
        self.take_fault(fault)?;

        let mut shared = self.lock();
        shared.calls.push((origin.clone(), call.input.clone()));
        if let Some(raw) = &shared.raw_reply {
            return Ok(raw.clone());
        }

        match call.selector()? {
            CallSelector::Get => Ok(encode_counter(shared.value).to_vec()),
            _ => Ok(Vec::new()),
        }
    }

    async fn submit(&self, signed: &SignedCall) -> ClientResult<SubmissionAck> {
        self.ensure_open()?;
        let stalled = take_one(&mut self.lock().stalled_submits);
        if stalled {
            std::future::pending::<()>().await;
        }
        let fault = self.lock().submit_faults.pop_front();
        self.take_fault(fault)?;

        let mut shared = self.lock();
        match signed.call.selector()? {
            CallSelector::Increment => shared.value += 1,
            CallSelector::Decrement => shared.value -= 1,
            other => {
                return Err(ClientError::TransactionRejected(format!(
                    "{} is not a callable message",
                    other.name()
                )));
            }
        }
        shared.submissions.push(signed.clone());

        Ok(SubmissionAck {
            tx_hash: format!("0x{:064x}", shared.submissions.len()),
            endpoint: self.endpoint.clone(),
        })
    }

    async fn close(&self) {
        self.set_state(ConnectionState::Closed);
        self.lock().closed.push(self.endpoint.clone());
    }
}

fn take_one(counter: &mut usize) -> bool {
    if *counter == 0 {
        return false;
    }
    *counter -= 1;
    true
}
