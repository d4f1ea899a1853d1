//! Offline stand-in for the counter contract.
//!
//! Clients built from clones of one [`SimulatedState`] share a counter; that
//! is how several demo clients in one process observe each other's writes.
//! A client that wants its own counter gets its own `SimulatedState::new()`.

use ic_chain_client::{ClientError, ClientResult};
use ic_codec::CallSelector;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

/// Handle to a simulated counter value. Only [`SimulationFallback`] reads or
/// writes it.
#[derive(Debug, Clone, Default)]
pub struct SimulatedState {
    value: Arc<AtomicI32>,
}

impl SimulatedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(value: i32) -> Self {
        Self {
            value: Arc::new(AtomicI32::new(value)),
        }
    }

    fn shares_with(&self, other: &SimulatedState) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

#[derive(Debug, Clone)]
pub struct SimulationFallback {
    state: SimulatedState,
}

impl SimulationFallback {
    pub fn new(state: SimulatedState) -> Self {
        Self { state }
    }

    pub fn read(&self) -> i32 {
        self.state.value.load(Ordering::SeqCst)
    }

    pub fn increment(&self) -> ClientResult<i32> {
        self.step(i32::checked_add, "increment")
    }

    pub fn decrement(&self) -> ClientResult<i32> {
        self.step(i32::checked_sub, "decrement")
    }

    /// Executes a message by selector, as the contract would.
    pub fn apply(&self, selector: CallSelector) -> ClientResult<i32> {
        match selector {
            CallSelector::Get => Ok(self.read()),
            CallSelector::Increment => self.increment(),
            CallSelector::Decrement => self.decrement(),
            CallSelector::Default => Err(ClientError::TransactionRejected(
                "constructor is not callable on a deployed contract".to_owned(),
            )),
        }
    }

    pub fn shares_state_with(&self, other: &SimulationFallback) -> bool {
        self.state.shares_with(&other.state)
    }

    // Overflow traps in the contract; mirror that instead of wrapping.
    fn step(&self, op: fn(i32, i32) -> Option<i32>, name: &str) -> ClientResult<i32> {
        let previous = self
            .state
            .value
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| op(v, 1))
            .map_err(|v| ClientError::TransactionRejected(format!("{name} would overflow counter at {v}")))?;
        op(previous, 1).ok_or_else(|| ClientError::TransactionRejected(format!("{name} overflow")))
    }
}
